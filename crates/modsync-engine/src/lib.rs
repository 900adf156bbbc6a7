#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings (used by the scenario tests)
#[cfg(test)]
use async_trait as _;
#[cfg(test)]
use mockall as _;

pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
mod manager;
pub mod ops;
pub mod pipelines;
pub mod scheduler;
pub mod session;
pub mod subscriptions;
pub mod temp_mods;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use context::{Engine, Services};
pub use error::EngineError;
pub use executor::Executor;
pub use logging::{HostLogLayer, LogBuffer, LogLine};
pub use manager::{EntryMap, LogCallback, ModManager};
pub use session::{CollectionKind, ManagementCallback, SessionStore};

// Re-export the core vocabulary hosts need alongside the manager.
pub use modsync_core::{
    AuthenticatedUser, ChangeType, CreateModFileParams, GameId, LogLevel, ModCollectionEntry,
    ModError, ModId, ModManagementEvent, ModManagementEventType, ModProgressInfo, ModResult,
    ModState, SessionOptions, SubscriptionChanges, UserId,
};
