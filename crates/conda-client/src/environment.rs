//! Environment listing and lifecycle.
//!
//! [`EnvironmentManager`] wraps the `conda/environments` and `conda/channels`
//! endpoints. Every mutation is announced on a broadcast channel once the
//! service has answered with success; failures are logged and reported as a
//! single [`OperationError`] naming the action and the environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{error, info};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{OperationError, RequestError};
use crate::events::{EnvironmentChange, EnvironmentChangeKind};
use crate::packages::PackageManager;
use crate::request::{RequestOptions, ServerConnection};

const ENVIRONMENTS: [&str; 2] = ["conda", "environments"];
const CHANNELS: [&str; 2] = ["conda", "channels"];

/// A conda environment known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    /// Installation prefix.
    #[serde(rename = "dir")]
    pub directory: PathBuf,
    #[serde(default)]
    pub is_default: bool,
}

/// Channel name → URIs.
pub type Channels = BTreeMap<String, Vec<String>>;

#[derive(Debug, Deserialize)]
struct EnvironmentList {
    environments: Vec<Environment>,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    channels: Channels,
}

/// Initial packages for a new environment of the given type.
///
/// `python3`, `python2` and `r` are shorthands; anything else is read as a
/// space-separated list of package specs.
pub fn packages_for_type(env_type: Option<&str>) -> Vec<String> {
    let Some(env_type) = env_type else {
        return Vec::new();
    };
    let packages: &[&str] = match env_type {
        "python3" => &["python=3", "ipykernel"],
        "python2" => &["python=2", "ipykernel"],
        "r" => &["r-base", "r-essentials"],
        other => {
            return other
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    };
    packages.iter().map(|s| s.to_string()).collect()
}

/// Log a request failure and replace it with a coarse operation error.
pub(crate) fn operation_error(message: String, err: RequestError) -> OperationError {
    error!("[conda-client] {} ({})", message, err);
    OperationError::new(message)
}

/// Manager for the environments hosted by the conda service.
pub struct EnvironmentManager {
    connection: ServerConnection,
    /// Last fetched environment list.
    environments: RwLock<Vec<Environment>>,
    changed_tx: broadcast::Sender<EnvironmentChange>,
    /// Cancels in-flight polls of this manager and its package managers.
    cancel: CancellationToken,
}

impl EnvironmentManager {
    pub fn new(connection: ServerConnection) -> Self {
        let (changed_tx, _) = broadcast::channel(64);
        Self {
            connection,
            environments: RwLock::new(Vec::new()),
            changed_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, OperationError> {
        let connection = ServerConnection::from_config(config).map_err(|e| {
            operation_error(
                format!("Invalid conda service URL \"{}\".", config.base_url),
                e,
            )
        })?;
        Ok(Self::new(connection))
    }

    pub fn connection(&self) -> &ServerConnection {
        &self.connection
    }

    /// Receive an [`EnvironmentChange`] for every confirmed mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<EnvironmentChange> {
        self.changed_tx.subscribe()
    }

    /// Package manager bound to `environment` (or unbound for `None`).
    pub fn package_manager(&self, environment: Option<&str>) -> PackageManager {
        PackageManager::new(
            self.connection.clone(),
            environment.map(str::to_string),
            self.cancel.child_token(),
        )
    }

    /// Fetch the environment list, replacing the cached snapshot.
    pub async fn environments(&self) -> Result<Vec<Environment>, OperationError> {
        self.refresh().await
    }

    /// Fetch the environment list, replacing the cached snapshot.
    pub async fn refresh(&self) -> Result<Vec<Environment>, OperationError> {
        let list: EnvironmentList = self
            .connection
            .request_json(&ENVIRONMENTS, RequestOptions::get(), &self.cancel)
            .await
            .map_err(|e| {
                operation_error("An error occurred while listing environments.".into(), e)
            })?;

        *self.environments.write().await = list.environments.clone();
        Ok(list.environments)
    }

    /// Environment list as of the last [`refresh`](Self::refresh).
    pub async fn cached_environments(&self) -> Vec<Environment> {
        self.environments.read().await.clone()
    }

    /// Channels configured for conda.
    ///
    /// `environment` only labels the error message; the service reports the
    /// global channel configuration.
    pub async fn channels(&self, environment: &str) -> Result<Channels, OperationError> {
        let list: ChannelList = self
            .connection
            .request_json(&CHANNELS, RequestOptions::get(), &self.cancel)
            .await
            .map_err(|e| {
                operation_error(
                    format!(
                        "An error occurred while retrieving available channels for \"{}\".",
                        environment
                    ),
                    e,
                )
            })?;
        Ok(list.channels)
    }

    /// Clone `target` into a new environment called `name`.
    pub async fn clone_environment(&self, target: &str, name: &str) -> Result<(), OperationError> {
        let body = json!({ "name": name, "twin": target });
        self.send(&ENVIRONMENTS, RequestOptions::post(body))
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while cloning environment \"{}\".", target),
                    e,
                )
            })?;

        info!("[conda-client] Cloned {} into {}", target, name);
        self.emit(EnvironmentChange::new(
            EnvironmentChangeKind::Clone,
            name,
            Some(target),
        ));
        Ok(())
    }

    /// Create an environment, seeding it with [`packages_for_type`].
    pub async fn create(&self, name: &str, env_type: Option<&str>) -> Result<(), OperationError> {
        let packages = packages_for_type(env_type);
        let body = json!({ "name": name, "packages": packages });
        self.send(&ENVIRONMENTS, RequestOptions::post(body))
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while creating environment \"{}\".", name),
                    e,
                )
            })?;

        info!("[conda-client] Created {} with {:?}", name, packages);
        self.emit(EnvironmentChange::new(
            EnvironmentChangeKind::Create,
            name,
            None,
        ));
        Ok(())
    }

    /// Create an environment from an exported specification file.
    pub async fn import(
        &self,
        name: &str,
        file_content: &str,
        file_name: &str,
    ) -> Result<(), OperationError> {
        let body = json!({ "name": name, "file": file_content, "filename": file_name });
        self.send(&ENVIRONMENTS, RequestOptions::post(body))
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while importing \"{}\".", name),
                    e,
                )
            })?;

        self.emit(EnvironmentChange::new(
            EnvironmentChangeKind::Import,
            name,
            Some(file_name),
        ));
        Ok(())
    }

    /// Update an existing environment from a specification file.
    pub async fn update(
        &self,
        name: &str,
        file_content: &str,
        file_name: &str,
    ) -> Result<(), OperationError> {
        let body = json!({ "file": file_content, "filename": file_name });
        self.send(&[ENVIRONMENTS[0], ENVIRONMENTS[1], name], RequestOptions::patch(body))
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while updating \"{}\".", name),
                    e,
                )
            })?;

        self.emit(EnvironmentChange::new(
            EnvironmentChangeKind::Update,
            name,
            Some(file_name),
        ));
        Ok(())
    }

    /// Remove an environment.
    pub async fn remove(&self, name: &str) -> Result<(), OperationError> {
        self.send(&[ENVIRONMENTS[0], ENVIRONMENTS[1], name], RequestOptions::delete())
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while removing \"{}\".", name),
                    e,
                )
            })?;

        info!("[conda-client] Removed {}", name);
        self.emit(EnvironmentChange::new(
            EnvironmentChangeKind::Remove,
            name,
            None,
        ));
        Ok(())
    }

    /// Export an environment specification.
    ///
    /// Returns the raw response so callers can stream it to a file. With
    /// `from_history` only explicitly requested packages are listed.
    pub async fn export(&self, name: &str, from_history: bool) -> Result<Response, OperationError> {
        let mut options = RequestOptions::get().with_query("download", "1");
        if from_history {
            options = options.with_query("history", "1");
        }
        self.send(&[ENVIRONMENTS[0], ENVIRONMENTS[1], name], options)
            .await
            .map_err(|e| {
                operation_error(
                    format!("An error occurred while exporting \"{}\".", name),
                    e,
                )
            })
    }

    /// Drop the cached snapshot and abandon in-flight polls.
    ///
    /// Package managers created by this manager are cancelled as well.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        self.environments.write().await.clear();
    }

    async fn send(
        &self,
        segments: &[&str],
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.connection
            .request_with_cancel(segments, options, &self.cancel)
            .await
    }

    fn emit(&self, change: EnvironmentChange) {
        // No subscribers is fine
        let _ = self.changed_tx.send(change);
    }
}
