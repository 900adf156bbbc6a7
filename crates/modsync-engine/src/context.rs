//! Engine context shared by pipelines, subscription flows and the scheduler.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use modsync_core::{
    ApiCall, ApiRequest, ArchivePort, CachePolicy, FileSystemPort, ModError, ModPaths, ModResult,
    TransportPort,
};

use crate::ops::OperationGuard;
use crate::session::SessionStore;

/// Adapters the engine talks to.
#[derive(Clone)]
pub struct Services {
    pub transport: Arc<dyn TransportPort>,
    pub fs: Arc<dyn FileSystemPort>,
    pub archive: Arc<dyn ArchivePort>,
}

impl Services {
    pub fn new(
        transport: Arc<dyn TransportPort>,
        fs: Arc<dyn FileSystemPort>,
        archive: Arc<dyn ArchivePort>,
    ) -> Self {
        Self {
            transport,
            fs,
            archive,
        }
    }
}

/// Session state plus the adapters that act on it.
pub struct Engine {
    pub store: SessionStore,
    pub services: Services,
}

impl Engine {
    pub fn new(services: Services) -> Self {
        Self {
            store: SessionStore::new(),
            services,
        }
    }

    pub fn fs(&self) -> &dyn FileSystemPort {
        self.services.fs.as_ref()
    }

    pub fn transport(&self) -> &dyn TransportPort {
        self.services.transport.as_ref()
    }

    pub fn archive(&self) -> &dyn ArchivePort {
        self.services.archive.as_ref()
    }

    /// Session paths, or `NotInitialized` before initialization.
    pub fn paths(&self) -> ModResult<ModPaths> {
        self.store.read().paths().cloned()
    }

    /// Bind `request` to the session's game and user.
    pub fn api_call(&self, request: ApiRequest) -> ModResult<ApiCall> {
        let state = self.store.read();
        let token = state.access_token();
        if request.requires_auth() && token.is_none() {
            return Err(ModError::NotAuthenticated);
        }
        Ok(ApiCall::new(state.options.game_id, request).with_token(token))
    }

    /// Perform `request` under `guard` and return the raw body.
    ///
    /// Rate limits and rejected tokens update the session before the error is
    /// returned.
    pub async fn request_raw(
        &self,
        guard: &OperationGuard<'_>,
        request: ApiRequest,
        cache: CachePolicy,
    ) -> ModResult<Vec<u8>> {
        let call = self.api_call(request)?;
        let result = guard
            .step(self.transport().perform_request(&call, cache))
            .await;
        if let Err(err) = &result {
            self.store.note_api_error(err);
        }
        result
    }

    /// Perform `request` and decode the JSON body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        guard: &OperationGuard<'_>,
        request: ApiRequest,
        cache: CachePolicy,
    ) -> ModResult<T> {
        let body = self.request_raw(guard, request, cache).await?;
        decode(&body)
    }
}

/// Decode a catalog response body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> ModResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ModError::invalid_response(format!("malformed catalog response: {e}")))
}
