#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod domain;
pub mod error;
pub mod paths;
pub mod persistence;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types for convenience
pub use config::{Environment, LogLevel, SessionOptions, validate_options};
pub use domain::{
    AuthenticatedUser, ChangeType, CreateModFileParams, FileMetadata, GameId, ModCollection,
    ModCollectionEntry, ModEventLog, ModId, ModInfo, ModManagementEvent, ModManagementEventType,
    ModProgressInfo, ModProgressState, ModState, PagedResponse, RetryPolicy, SubscriptionChanges,
    UserId, UserSubscriptionList, calculate_updates, merge_changes,
};
pub use error::{ModError, ModResult};
pub use paths::ModPaths;
pub use persistence::{StateDocument, UserDataDocument};
pub use ports::{
    ApiCall, ApiRequest, ArchivePort, CachePolicy, FileSystemPort, ProgressSink, TransportPort,
};
