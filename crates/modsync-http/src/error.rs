//! Internal error types for catalog calls.
//!
//! These errors are internal to `modsync-http` and are mapped to
//! [`ModError`] at the port boundary.

use serde::Deserialize;
use thiserror::Error;

use modsync_core::ModError;

// Catalog error refs
const ERROR_REF_ALREADY_SUBSCRIBED: u32 = 15004;
const ERROR_REF_ALREADY_UNSUBSCRIBED: u32 = 15005;
const ERROR_REF_RATE_LIMITED: u32 = 11008;

/// Cool-down used when a throttled response carries no `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub type HttpResult<T> = Result<T, HttpError>;

/// Error object of a failed catalog response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_ref: Option<u32>,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

impl ApiErrorBody {
    /// Parse `{"error": {...}}`, tolerating bodies that are not JSON.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    /// The catalog answered with a failure status.
    #[error("Catalog request failed with status {status}: {url}")]
    Status {
        status: u16,
        url: String,
        body: Option<ApiErrorBody>,
        retry_after_secs: Option<u64>,
    },

    /// A call that needs a user was made without a token.
    #[error("Request requires an authenticated user")]
    MissingToken,

    /// Downloaded size differs from the catalog's.
    #[error("Downloaded {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The progress sink asked to stop.
    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Network(err) => !err.is_builder() && !err.is_decode(),
            _ => false,
        }
    }
}

impl From<HttpError> for ModError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status {
                status,
                url,
                body,
                retry_after_secs,
            } => {
                let body = body.unwrap_or_default();
                match (status, body.error_ref) {
                    (_, Some(ERROR_REF_ALREADY_SUBSCRIBED | ERROR_REF_ALREADY_UNSUBSCRIBED)) => {
                        Self::already_performed(body.message)
                    }
                    (429, _) | (_, Some(ERROR_REF_RATE_LIMITED)) => Self::RateLimited {
                        retry_after_secs: retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                    },
                    (401 | 403, _) => Self::NotAuthenticated,
                    (404, _) => Self::not_found(format!("{url}: {}", body.message)),
                    (422, _) => Self::invalid_parameters(body.message),
                    _ => Self::network_with_status(
                        format!("catalog returned {status} for {url}"),
                        status,
                    ),
                }
            }
            HttpError::MissingToken => Self::NotAuthenticated,
            HttpError::SizeMismatch { expected, actual } => Self::SizeMismatch { expected, actual },
            HttpError::Cancelled => Self::Cancelled,
            HttpError::Network(err) if err.is_decode() => Self::invalid_response(err.to_string()),
            HttpError::Network(err) => match err.status() {
                Some(status) => Self::network_with_status(err.to_string(), status.as_u16()),
                None => Self::network(err.to_string()),
            },
            HttpError::InvalidUrl(err) => Self::invalid_parameters(format!("invalid url: {err}")),
            HttpError::Io(err) => Self::from_io_error(&err),
        }
    }
}
