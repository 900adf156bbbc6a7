//! Mod management lifecycle events.

use serde::{Deserialize, Serialize};

use super::ids::ModId;
use crate::error::ModError;

/// Lifecycle event kinds delivered to the host's management callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModManagementEventType {
    BeginInstall,
    Installed,
    BeginUninstall,
    Uninstalled,
    BeginUpdate,
    Updated,
    BeginUpload,
    Uploaded,
}

impl ModManagementEventType {
    /// Whether this event opens an operation.
    pub const fn is_begin(self) -> bool {
        matches!(
            self,
            Self::BeginInstall | Self::BeginUninstall | Self::BeginUpdate | Self::BeginUpload
        )
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModManagementEvent {
    pub id: ModId,
    pub event: ModManagementEventType,
    /// `None` on success and for begin events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ModError>,
}

/// Ordered buffer of events awaiting delivery.
#[derive(Debug, Default)]
pub struct ModEventLog {
    events: Vec<ModManagementEvent>,
}

impl ModEventLog {
    pub fn add_entry(&mut self, event: ModManagementEvent) {
        self.events.push(event);
    }

    /// Record a begin event.
    pub fn begin(&mut self, id: ModId, event: ModManagementEventType) {
        self.add_entry(ModManagementEvent {
            id,
            event,
            status: None,
        });
    }

    /// Record a completion event with its outcome.
    pub fn finish(&mut self, id: ModId, event: ModManagementEventType, status: Option<ModError>) {
        self.add_entry(ModManagementEvent { id, event, status });
    }

    /// Take every buffered event in order.
    pub fn clear_log(&mut self) -> Vec<ModManagementEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_drains_in_order() {
        let mut log = ModEventLog::default();
        log.begin(ModId::new(1), ModManagementEventType::BeginInstall);
        log.finish(ModId::new(1), ModManagementEventType::Installed, None);

        let events = log.clear_log();
        assert_eq!(events.len(), 2);
        assert!(events[0].event.is_begin());
        assert_eq!(events[1].event, ModManagementEventType::Installed);
        assert!(log.is_empty());
    }
}
