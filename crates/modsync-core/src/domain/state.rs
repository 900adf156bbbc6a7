//! Mod install state machine.

use serde::{Deserialize, Serialize};

/// Install state of a collection entry.
///
/// Absence from the collection means "not installed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModState {
    /// Known locally, content not yet installed.
    InstallationPending,
    /// Transfer in flight.
    Downloading,
    /// Archive is being unpacked.
    Extracting,
    /// Content is on disk and current.
    Installed,
    /// Installed, but the catalog has a newer modfile.
    UpdatePending,
    /// Content should be removed and the entry dropped.
    UninstallPending,
}

impl ModState {
    /// Whether the scheduler has install or update work for this state.
    #[must_use]
    pub const fn needs_transfer(self) -> bool {
        matches!(self, Self::InstallationPending | Self::UpdatePending)
    }

    /// Whether a pipeline currently owns the entry.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Downloading | Self::Extracting)
    }

    /// Whether the entry has unfinished work of any kind.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::InstallationPending | Self::UpdatePending | Self::UninstallPending
        )
    }

    /// Whether `self -> next` is an edge of the state graph.
    ///
    /// Staying in the same state is always allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ModState::{
            Downloading, Extracting, InstallationPending, Installed, UninstallPending,
            UpdatePending,
        };

        if self as u8 == next as u8 {
            return true;
        }
        match self {
            InstallationPending | UpdatePending => {
                matches!(next, Downloading | UninstallPending)
            }
            // Forward progress, or rollback to the pending state the
            // transfer started from.
            Downloading => matches!(
                next,
                Extracting | InstallationPending | UpdatePending | UninstallPending
            ),
            Extracting => matches!(
                next,
                Installed | InstallationPending | UpdatePending | UninstallPending
            ),
            Installed => matches!(next, UpdatePending | UninstallPending | InstallationPending),
            UninstallPending => matches!(next, Installed | InstallationPending),
        }
    }
}

impl std::fmt::Display for ModState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InstallationPending => "installation_pending",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Installed => "installed",
            Self::UpdatePending => "update_pending",
            Self::UninstallPending => "uninstall_pending",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ModState::*;
    use super::*;

    const ALL: [ModState; 6] = [
        InstallationPending,
        Downloading,
        Extracting,
        Installed,
        UpdatePending,
        UninstallPending,
    ];

    #[test]
    fn test_no_skipping_transfer_phases() {
        assert!(!InstallationPending.can_transition_to(Installed));
        assert!(!InstallationPending.can_transition_to(Extracting));
        assert!(!UpdatePending.can_transition_to(Installed));
        assert!(!Downloading.can_transition_to(Installed));
    }

    #[test]
    fn test_forward_path() {
        assert!(InstallationPending.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Installed));
        assert!(Installed.can_transition_to(UpdatePending));
        assert!(UpdatePending.can_transition_to(Downloading));
    }

    #[test]
    fn test_every_state_can_reach_uninstall_or_is_uninstall() {
        for state in ALL {
            assert!(state.can_transition_to(UninstallPending), "{state}");
        }
    }

    #[test]
    fn test_uninstall_pending_repairs() {
        assert!(UninstallPending.can_transition_to(Installed));
        assert!(UninstallPending.can_transition_to(InstallationPending));
        assert!(!UninstallPending.can_transition_to(Downloading));
        assert!(!UninstallPending.can_transition_to(UpdatePending));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&UpdatePending).unwrap();
        assert_eq!(json, "\"update_pending\"");
    }
}
