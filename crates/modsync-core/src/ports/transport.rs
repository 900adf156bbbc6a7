//! Transport port definition.
//!
//! The engine speaks to the remote catalog in terms of [`ApiRequest`]s and
//! raw response bytes; decoding of entity payloads happens in the engine so
//! adapters only map requests to the wire and failures to [`ModError`].
//!
//! [`ModError`]: crate::error::ModError

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::progress::ProgressSink;
use crate::domain::{CreateModFileParams, GameId, ModId};
use crate::error::ModResult;

/// Whether a cached response may satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// A cached response is acceptable.
    Allow,
    /// Always hit the network.
    Disallow,
}

impl CachePolicy {
    /// `Disallow` when a cache-invalidity flag is set.
    pub const fn unless_invalidated(invalid: bool) -> Self {
        if invalid { Self::Disallow } else { Self::Allow }
    }
}

/// Catalog operations the engine issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// Fetch a mod profile.
    GetMod { mod_id: ModId },
    /// Subscribe the user to a mod.
    SubscribeToMod { mod_id: ModId },
    /// Remove the user's subscription.
    UnsubscribeFromMod { mod_id: ModId },
    /// One page of the user's subscriptions for the game.
    ListUserSubscriptions { offset: u64, limit: u64 },
    /// Upload a new modfile.
    SubmitModfile {
        mod_id: ModId,
        params: CreateModFileParams,
    },
}

impl ApiRequest {
    /// Whether the request changes server state.
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::GetMod { .. } | Self::ListUserSubscriptions { .. })
    }

    /// Whether the request needs a user access token.
    pub const fn requires_auth(&self) -> bool {
        !matches!(self, Self::GetMod { .. })
    }
}

/// A request bound to the session's game and user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub game_id: GameId,
    pub access_token: Option<String>,
    pub request: ApiRequest,
}

impl ApiCall {
    pub const fn new(game_id: GameId, request: ApiRequest) -> Self {
        Self {
            game_id,
            access_token: None,
            request,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }
}

/// Access to the remote catalog and its CDN.
///
/// Failures are reported as:
/// - `NotAuthenticated` for rejected credentials
/// - `RateLimited` when the catalog throttles the session
/// - `NotFound` for unknown entities
/// - `AlreadyPerformed` when the requested change is already in effect
/// - `Network` for everything transient
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Perform a catalog request and return the response body.
    async fn perform_request(&self, call: &ApiCall, cache: CachePolicy) -> ModResult<Vec<u8>>;

    /// Stream `url` into `dest`, reporting bytes into `progress`.
    ///
    /// Implementations stop with `Cancelled` once `progress` reports
    /// cancellation, and with `SizeMismatch` if `expected_size` is given and
    /// not met.
    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
        expected_size: Option<u64>,
    ) -> ModResult<()>;

    /// Upload `file` as part of `call` and return the response body.
    async fn upload_file(
        &self,
        call: &ApiCall,
        file: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<Vec<u8>>;
}
