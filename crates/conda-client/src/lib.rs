//! Client for the notebook conda environment service.
//!
//! The notebook front-end talks to a small REST service that wraps conda.
//! This crate provides the typed client side of that conversation:
//!
//! - [`ServerConnection`] builds requests against the service's base URL and
//!   follows `202 Accepted` responses until the long-running operation ends
//! - [`EnvironmentManager`] lists, creates, clones, imports, updates, exports
//!   and removes environments
//! - [`PackageManager`] lists and mutates the packages of one environment
//! - [`merge_packages`] reconciles installed and available package lists
//!   into a single annotated list
//!
//! Mutations are announced on `tokio::sync::broadcast` channels once the
//! service has confirmed them.
//!
//! ```ignore
//! use conda_client::{load_config, EnvironmentManager, PackageFilter};
//!
//! let manager = EnvironmentManager::from_config(&load_config())?;
//! let envs = manager.environments().await?;
//! let packages = manager
//!     .package_manager(Some(&envs[0].name))
//!     .refresh(PackageFilter::All)
//!     .await?;
//! ```

pub mod channel;
pub mod config;
pub mod environment;
pub mod error;
pub mod events;
pub mod merge;
pub mod package;
pub mod packages;
pub mod request;

// Re-export key types
pub use channel::simplify_channel;
pub use config::{load_config, ClientConfig};
pub use environment::{packages_for_type, Channels, Environment, EnvironmentManager};
pub use error::{OperationError, RequestError};
pub use events::{EnvironmentChange, EnvironmentChangeKind, PackageChange, PackageChangeKind};
pub use merge::merge_packages;
pub use package::{
    mark_updatable, PackageFilter, PackageStatus, RawAvailablePackage, RawInstalledPackage,
    UnifiedPackage,
};
pub use packages::PackageManager;
pub use request::{RequestOptions, ServerConnection};
