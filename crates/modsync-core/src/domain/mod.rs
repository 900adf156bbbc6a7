//! Domain types for mod lifecycle management.
//!
//! Pure data and state-machine rules with no I/O.

mod collection;
mod entry;
mod events;
mod ids;
mod mod_info;
mod progress;
mod state;
mod subscriptions;
mod upload;
mod user;

pub use collection::ModCollection;
pub use entry::{ModCollectionEntry, RetryPolicy, RetryState};
pub use events::{ModEventLog, ModManagementEvent, ModManagementEventType};
pub use ids::{GameId, ModId, UserId};
pub use mod_info::{DownloadInfo, FileMetadata, ModInfo, PagedResponse, SubmittedModfile};
pub use progress::{ModProgressInfo, ModProgressState, PhaseCounter};
pub use state::ModState;
pub use subscriptions::{
    ChangeType, SubscriptionChanges, UserSubscriptionList, calculate_updates, merge_changes,
};
pub use upload::CreateModFileParams;
pub use user::AuthenticatedUser;
