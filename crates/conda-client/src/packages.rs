//! Package operations for one environment.
//!
//! A [`PackageManager`] is bound to an environment name when it is created
//! (see [`EnvironmentManager::package_manager`](crate::EnvironmentManager::package_manager)).
//! Without a name every operation succeeds immediately with an empty result.

use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::environment::operation_error;
use crate::error::{OperationError, RequestError};
use crate::events::{PackageChange, PackageChangeKind};
use crate::merge::merge_packages;
use crate::package::{
    mark_updatable, PackageFilter, RawAvailablePackage, RawInstalledPackage, UnifiedPackage,
};
use crate::request::{RequestOptions, ServerConnection};

#[derive(Debug, Deserialize)]
struct InstalledList {
    #[serde(default)]
    packages: Vec<RawInstalledPackage>,
}

#[derive(Debug, Deserialize)]
struct AvailableList {
    #[serde(default)]
    packages: Vec<RawAvailablePackage>,
}

#[derive(Debug, Deserialize)]
struct UpdateEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UpdateList {
    #[serde(default)]
    updates: Vec<UpdateEntry>,
}

/// Package operations on a single environment.
pub struct PackageManager {
    connection: ServerConnection,
    environment: Option<String>,
    /// Result of the last refresh.
    packages: RwLock<Vec<UnifiedPackage>>,
    changed_tx: broadcast::Sender<PackageChange>,
    cancel: CancellationToken,
}

impl PackageManager {
    pub fn new(
        connection: ServerConnection,
        environment: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        let (changed_tx, _) = broadcast::channel(64);
        Self {
            connection,
            environment,
            packages: RwLock::new(Vec::new()),
            changed_tx,
            cancel,
        }
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Receive a [`PackageChange`] for every confirmed mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<PackageChange> {
        self.changed_tx.subscribe()
    }

    /// Package list as of the last [`refresh`](Self::refresh).
    pub async fn cached_packages(&self) -> Vec<UnifiedPackage> {
        self.packages.read().await.clone()
    }

    /// Fetch and merge the environment's packages.
    ///
    /// The channels' package list is only requested when `filter` needs it;
    /// otherwise the result holds the installed packages alone. With
    /// [`PackageFilter::Updatable`] the records are also flagged from
    /// [`check_updates`](Self::check_updates). The returned list is not
    /// filtered; use [`PackageFilter::matches`] for display.
    pub async fn refresh(
        &self,
        filter: PackageFilter,
    ) -> Result<Vec<UnifiedPackage>, OperationError> {
        let Some(env) = self.environment.as_deref() else {
            return Ok(Vec::new());
        };

        let installed = self.fetch_installed(env);
        let available = self.fetch_available(filter.includes_available());
        let (installed, available) = tokio::try_join!(installed, available).map_err(|e| {
            operation_error(
                format!("An error occurred while retrieving packages of \"{}\".", env),
                e,
            )
        })?;

        let mut merged = merge_packages(&installed, &available);
        debug!(
            "[conda-client] {}: {} installed, {} available, {} merged",
            env,
            installed.len(),
            available.len(),
            merged.len()
        );

        if filter == PackageFilter::Updatable {
            let updates = self.check_updates().await?;
            mark_updatable(&mut merged, &updates);
        }

        *self.packages.write().await = merged.clone();
        Ok(merged)
    }

    /// Install packages from the channels.
    pub async fn install(&self, packages: &[String]) -> Result<(), OperationError> {
        let Some(env) = self.environment.as_deref() else {
            return Ok(());
        };
        self.mutate(
            env,
            RequestOptions::post(json!({ "packages": packages })),
            format!("An error occurred while installing packages in \"{}\".", env),
        )
        .await?;

        info!("[conda-client] Installed {:?} in {}", packages, env);
        self.emit(PackageChange::new(PackageChangeKind::Install, env, packages));
        Ok(())
    }

    /// Install a local package in development (editable) mode.
    pub async fn develop(&self, path: &str) -> Result<(), OperationError> {
        let Some(env) = self.environment.as_deref() else {
            return Ok(());
        };
        self.mutate(
            env,
            RequestOptions::post(json!({ "packages": [path] })).with_query("develop", "1"),
            format!(
                "An error occurred while installing \"{}\" in development mode.",
                path
            ),
        )
        .await?;

        info!("[conda-client] Installed {} in development mode in {}", path, env);
        self.emit(PackageChange::new(
            PackageChangeKind::Develop,
            env,
            &[path.to_string()],
        ));
        Ok(())
    }

    /// Update packages to their latest compatible build.
    pub async fn update(&self, packages: &[String]) -> Result<(), OperationError> {
        let Some(env) = self.environment.as_deref() else {
            return Ok(());
        };
        self.mutate(
            env,
            RequestOptions::patch(json!({ "packages": packages })),
            format!("An error occurred while updating packages in \"{}\".", env),
        )
        .await?;

        info!("[conda-client] Updated {:?} in {}", packages, env);
        self.emit(PackageChange::new(PackageChangeKind::Update, env, packages));
        Ok(())
    }

    /// Remove packages.
    pub async fn remove(&self, packages: &[String]) -> Result<(), OperationError> {
        let Some(env) = self.environment.as_deref() else {
            return Ok(());
        };
        self.mutate(
            env,
            RequestOptions::delete().with_json(json!({ "packages": packages })),
            format!("An error occurred while removing packages from \"{}\".", env),
        )
        .await?;

        info!("[conda-client] Removed {:?} from {}", packages, env);
        self.emit(PackageChange::new(PackageChangeKind::Remove, env, packages));
        Ok(())
    }

    /// Names of installed packages with a newer build available.
    pub async fn check_updates(&self) -> Result<Vec<String>, OperationError> {
        let Some(env) = self.environment.as_deref() else {
            return Ok(Vec::new());
        };
        let list: UpdateList = self
            .connection
            .request_json(
                &["conda", "environments", env],
                RequestOptions::get().with_query("status", "has_update"),
                &self.cancel,
            )
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while checking for updates in \"{}\".", env),
                    e,
                )
            })?;
        Ok(list.updates.into_iter().map(|u| u.name).collect())
    }

    /// Drop the cached package list and abandon in-flight polls.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        self.packages.write().await.clear();
    }

    async fn fetch_installed(&self, env: &str) -> Result<Vec<RawInstalledPackage>, RequestError> {
        let list: InstalledList = self
            .connection
            .request_json(
                &["conda", "environments", env],
                RequestOptions::get(),
                &self.cancel,
            )
            .await?;
        Ok(list.packages)
    }

    async fn fetch_available(&self, wanted: bool) -> Result<Vec<RawAvailablePackage>, RequestError> {
        if !wanted {
            return Ok(Vec::new());
        }
        let list: AvailableList = self
            .connection
            .request_json(&["conda", "packages"], RequestOptions::get(), &self.cancel)
            .await?;
        Ok(list.packages)
    }

    async fn mutate(
        &self,
        env: &str,
        options: RequestOptions,
        failure: String,
    ) -> Result<(), OperationError> {
        self.connection
            .request_with_cancel(&["conda", "environments", env, "packages"], options, &self.cancel)
            .await
            .map(|_| ())
            .map_err(|e| operation_error(failure, e))
    }

    fn emit(&self, change: PackageChange) {
        let _ = self.changed_tx.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound() -> PackageManager {
        // Port 1 is never served; an unbound manager must not touch it.
        PackageManager::new(
            ServerConnection::new("http://127.0.0.1:1/").unwrap(),
            None,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_unbound_manager_is_a_no_op() {
        let manager = unbound();
        let mut changes = manager.subscribe();

        assert!(manager.refresh(PackageFilter::All).await.unwrap().is_empty());
        manager.install(&["numpy".into()]).await.unwrap();
        manager.update(&["numpy".into()]).await.unwrap();
        manager.remove(&["numpy".into()]).await.unwrap();
        manager.develop("/src/project").await.unwrap();
        assert!(manager.check_updates().await.unwrap().is_empty());

        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_update_list_deserialization() {
        let json = r#"{"updates": [{"name": "numpy", "version": "2.0.0"}, {"name": "pip"}]}"#;
        let list: UpdateList = serde_json::from_str(json).unwrap();
        let names: Vec<String> = list.updates.into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["numpy", "pip"]);
    }
}
