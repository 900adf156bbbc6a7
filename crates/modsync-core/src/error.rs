//! Mod management error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.
//!
//! Every failure the engine can produce flows through [`ModError`]: validation
//! and precondition failures, transient infrastructure failures, remote
//! outcomes, and cancellation. Entries store the last one they hit, and the
//! never-retry reason is persisted alongside the collection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for mod management operations.
///
/// Designed to be stored on collection entries and persisted, so it is
/// `Clone + PartialEq` and carries no non-serializable payloads.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ModError {
    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------
    /// The mod id is the reserved sentinel or otherwise unusable.
    #[error("Invalid mod id: {id}")]
    InvalidModId {
        /// The rejected id.
        id: i64,
    },

    /// A caller-supplied parameter failed validation.
    #[error("Invalid parameters: {message}")]
    InvalidParameters {
        /// What was wrong with the parameters.
        message: String,
    },

    // ---------------------------------------------------------------------
    // Preconditions
    // ---------------------------------------------------------------------
    /// The session has not been initialized (or has been shut down).
    #[error("Session is not initialized")]
    NotInitialized,

    /// The session is already initializing or initialized.
    #[error("Session is already initialized")]
    AlreadyInitialized,

    /// Mod management is disabled.
    #[error("Mod management is disabled")]
    ModManagementDisabled,

    /// Mod management was already enabled.
    #[error("Mod management is already enabled")]
    ModManagementAlreadyEnabled,

    /// The remote catalog rate-limited this session.
    #[error("Rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until requests may resume.
        retry_after_secs: u64,
    },

    /// No authenticated user, or the access token was rejected.
    #[error("User is not authenticated")]
    NotAuthenticated,

    /// The user is already subscribed to the mod.
    #[error("Already subscribed to mod {id}")]
    AlreadySubscribed {
        /// The mod id.
        id: i64,
    },

    /// The current user is still subscribed to the mod.
    #[error("Mod {id} is still subscribed by the current user")]
    StillSubscribed {
        /// The mod id.
        id: i64,
    },

    /// A temporary mod set operation was requested with no open set.
    #[error("Temporary mod set is not initialized")]
    TempModSetNotInitialized,

    /// Another transfer currently owns the progress slot.
    #[error("Mod {id} is already being processed")]
    ModBeingProcessed {
        /// The mod currently holding the progress slot.
        id: i64,
    },

    // ---------------------------------------------------------------------
    // Infrastructure
    // ---------------------------------------------------------------------
    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., `NotFound`, `PermissionDenied`).
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Network/HTTP error talking to the catalog.
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Quota or free disk space does not allow the operation.
    #[error("Insufficient space: {required} bytes required, {available} available")]
    InsufficientSpace {
        /// Bytes the operation needs.
        required: u64,
        /// Bytes the quota or disk allows.
        available: u64,
    },

    /// A transferred file does not have the size the catalog advertised.
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size reported by the catalog.
        expected: u64,
        /// Size found on disk.
        actual: u64,
    },

    // ---------------------------------------------------------------------
    // Remote outcomes
    // ---------------------------------------------------------------------
    /// Entity not found on the remote catalog.
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found.
        message: String,
    },

    /// The catalog answered with something we could not interpret.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Why the response was rejected.
        message: String,
    },

    /// The catalog reports the requested change is already in effect.
    #[error("Already performed: {message}")]
    AlreadyPerformed {
        /// Server message.
        message: String,
    },

    // ---------------------------------------------------------------------
    // Cancellation
    // ---------------------------------------------------------------------
    /// The operation was cancelled (management disabled, progress released,
    /// or shutdown).
    #[error("Operation cancelled")]
    Cancelled,
}

impl ModError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// This captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create an invalid parameters error.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create an already performed error.
    pub fn already_performed(message: impl Into<String>) -> Self {
        Self::AlreadyPerformed {
            message: message.into(),
        }
    }

    /// Create an insufficient space error.
    #[must_use]
    pub const fn insufficient_space(required: u64, available: u64) -> Self {
        Self::InsufficientSpace {
            required,
            available,
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the operation lost a race for a shared resource.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::ModBeingProcessed { .. })
    }

    /// Check if this I/O error means the target did not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { kind, .. } => kind == "NotFound",
            Self::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this error is recoverable (entry is retried with backoff).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Io { .. }
                | Self::RateLimited { .. }
                | Self::InsufficientSpace { .. }
                | Self::SizeMismatch { .. }
        )
    }

    /// Check if this error should stop the entry from being retried for the
    /// rest of the session.
    #[must_use]
    pub const fn prevents_retry(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidResponse { .. })
    }

    /// Check if the stored access token should be discarded.
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidModId { id } => format!("'{id}' is not a valid mod id."),
            Self::InvalidParameters { message } => format!("Invalid request: {message}"),
            Self::NotInitialized => "Mod support has not been initialized yet.".to_string(),
            Self::AlreadyInitialized => "Mod support is already initialized.".to_string(),
            Self::ModManagementDisabled => "Mod management is turned off.".to_string(),
            Self::ModManagementAlreadyEnabled => "Mod management is already on.".to_string(),
            Self::RateLimited { retry_after_secs } => {
                format!("Too many requests. Try again in {retry_after_secs} seconds.")
            }
            Self::NotAuthenticated => "Please sign in to manage subscriptions.".to_string(),
            Self::AlreadySubscribed { id } => format!("You are already subscribed to mod {id}."),
            Self::StillSubscribed { id } => {
                format!("Unsubscribe from mod {id} before removing it.")
            }
            Self::TempModSetNotInitialized => "No temporary mod set is open.".to_string(),
            Self::ModBeingProcessed { id } => {
                format!("Mod {id} is being installed right now. Wait for it to finish.")
            }
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Network {
                message,
                status_code: Some(code),
            } => format!("Network error (HTTP {code}): {message}"),
            Self::Network { message, .. } => format!("Network error: {message}"),
            Self::InsufficientSpace {
                required,
                available,
            } => format!(
                "Not enough storage: {required} bytes needed but only {available} bytes allowed."
            ),
            Self::SizeMismatch { .. } => {
                "The downloaded file is incomplete or corrupted.".to_string()
            }
            Self::NotFound { message } => format!("Not found: {message}"),
            Self::InvalidResponse { .. } => "The mod service sent an unexpected reply.".to_string(),
            Self::AlreadyPerformed { message } => message.clone(),
            Self::Cancelled => "The operation was cancelled.".to_string(),
        }
    }
}

/// Convenience result type for mod management operations.
pub type ModResult<T> = Result<T, ModError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ModError::from_io_error(&io_err);

        match &err {
            ModError::Io { kind, message } => {
                assert_eq!(kind, "NotFound");
                assert!(message.contains("file not found"));
            }
            _ => panic!("Expected Io variant"),
        }
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_serialization() {
        let err = ModError::network_with_status("timeout", 408);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("408"));
        assert!(json.contains("timeout"));

        let parsed: ModError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_io_error_serialization_keeps_kind() {
        let err = ModError::io("PermissionDenied", "read-only mount");
        let json: serde_json::Value = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "io");
        assert_eq!(json["kind"], "PermissionDenied");

        let parsed: ModError = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_retry_classification() {
        assert!(ModError::network("timeout").is_recoverable());
        assert!(ModError::io("Other", "disk hiccup").is_recoverable());
        assert!(!ModError::Cancelled.is_recoverable());

        // Space and size problems clear up on their own; they use the backoff.
        assert!(ModError::insufficient_space(10, 5).is_recoverable());
        assert!(!ModError::insufficient_space(10, 5).prevents_retry());
        assert!(
            ModError::SizeMismatch {
                expected: 4,
                actual: 3
            }
            .is_recoverable()
        );
        assert!(ModError::not_found("mod 3").prevents_retry());
        assert!(!ModError::network("reset").prevents_retry());
        assert!(!ModError::Cancelled.prevents_retry());
    }

    #[test]
    fn test_user_messages() {
        let err = ModError::insufficient_space(2048, 1024);
        assert!(err.user_message().contains("2048"));
        assert!(ModError::ModBeingProcessed { id: 5 }.user_message().contains('5'));
    }
}
