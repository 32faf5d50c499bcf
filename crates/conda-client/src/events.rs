//! Change notifications.
//!
//! Managers publish these on `tokio::sync::broadcast` channels after the
//! service has confirmed an operation. A lagging or absent receiver never
//! blocks the sender.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of environment mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentChangeKind {
    Clone,
    Create,
    Import,
    Update,
    Remove,
}

/// A confirmed environment mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentChange {
    pub kind: EnvironmentChangeKind,
    /// Environment created, updated or removed.
    pub name: String,
    /// Cloned environment, or the file an environment was imported/updated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub at: DateTime<Utc>,
}

impl EnvironmentChange {
    pub fn new(kind: EnvironmentChangeKind, name: &str, source: Option<&str>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            source: source.map(str::to_string),
            at: Utc::now(),
        }
    }
}

/// Kind of package mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageChangeKind {
    Install,
    Develop,
    Update,
    Remove,
}

/// A confirmed package mutation in one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageChange {
    pub kind: PackageChangeKind,
    pub environment: String,
    pub packages: Vec<String>,
    pub at: DateTime<Utc>,
}

impl PackageChange {
    pub fn new(kind: PackageChangeKind, environment: &str, packages: &[String]) -> Self {
        Self {
            kind,
            environment: environment.to_string(),
            packages: packages.to_vec(),
            at: Utc::now(),
        }
    }
}
