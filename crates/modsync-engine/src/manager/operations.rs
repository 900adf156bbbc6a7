//! Subscription, uninstall, upload and user operations.

use std::sync::Arc;

use modsync_core::{
    AuthenticatedUser, CreateModFileParams, ModError, ModId, ModResult, SubscriptionChanges,
};

use super::ModManager;
use crate::context::Engine;
use crate::ops::Precheck;
use crate::ops::storage::{save_all_logged, save_state, save_user_data};
use crate::pipelines::uninstall_mod;
use crate::session::CollectionKind;
use crate::subscriptions::{
    fetch_external_updates, preview_external_updates, subscribe, unsubscribe,
};

impl ModManager {
    /// Subscribe the current user to `id`. Mod management installs it once
    /// enabled.
    pub fn subscribe_to_mod_async(
        &self,
        id: ModId,
        callback: impl FnOnce(ModResult<()>) + Send + 'static,
    ) {
        self.submit(
            callback,
            |state| {
                Precheck::new(state)
                    .initialized()?
                    .not_rate_limited()?
                    .authenticated()?
                    .valid_mod(id)?
                    .not_subscribed(id)
                    .map(|_| ())
            },
            move |engine| async move { subscribe(&engine, id).await },
        );
    }

    /// Unsubscribe the current user from `id`, cancelling its transfer.
    ///
    /// Succeeds even if the server could not be reached; the server call is
    /// retried on the next reconciliation.
    pub fn unsubscribe_from_mod_async(
        &self,
        id: ModId,
        callback: impl FnOnce(ModResult<()>) + Send + 'static,
    ) {
        self.submit(
            callback,
            |state| {
                Precheck::new(state)
                    .initialized()?
                    .not_rate_limited()?
                    .authenticated()?
                    .valid_mod(id)
                    .map(|_| ())
            },
            move |engine| async move { unsubscribe(&engine, id).await },
        );
    }

    /// Apply subscription changes made outside this session.
    pub fn fetch_external_updates_async(
        &self,
        callback: impl FnOnce(ModResult<SubscriptionChanges>) + Send + 'static,
    ) {
        self.submit(
            callback,
            |state| {
                Precheck::new(state)
                    .initialized()?
                    .not_rate_limited()?
                    .authenticated()
                    .map(|_| ())
            },
            |engine| async move { fetch_external_updates(&engine).await },
        );
    }

    /// Report what [`Self::fetch_external_updates_async`] would change,
    /// including available updates, without changing anything.
    pub fn preview_external_updates_async(
        &self,
        callback: impl FnOnce(ModResult<SubscriptionChanges>) + Send + 'static,
    ) {
        self.submit(
            callback,
            |state| {
                Precheck::new(state)
                    .initialized()?
                    .not_rate_limited()?
                    .authenticated()
                    .map(|_| ())
            },
            |engine| async move { preview_external_updates(&engine).await },
        );
    }

    /// Uninstall `id` even if other local users still use it.
    ///
    /// Fails with `StillSubscribed` while the current user is subscribed.
    pub fn force_uninstall_mod_async(
        &self,
        id: ModId,
        callback: impl FnOnce(ModResult<()>) + Send + 'static,
    ) {
        self.submit(
            callback,
            |state| {
                Precheck::new(state)
                    .initialized()?
                    .authenticated()?
                    .management_enabled()?
                    .valid_mod(id)?
                    .not_subscribed_by_user(id)?;
                if state.system.contains(id) {
                    Ok(())
                } else {
                    Err(ModError::not_found(format!("mod {id} is not installed")))
                }
            },
            move |engine| async move { force_uninstall(&engine, id).await },
        );
    }

    /// Queue a new modfile for `id`, built from `params.root_directory`.
    ///
    /// The upload runs from the management loop; its outcome arrives as an
    /// `Uploaded` event.
    pub fn submit_new_mod_file_for_mod(
        &self,
        id: ModId,
        params: CreateModFileParams,
    ) -> ModResult<()> {
        self.engine.store.query(|state| {
            Precheck::new(state)
                .initialized()?
                .authenticated()?
                .management_enabled()?
                .valid_mod(id)?;
            params.validate()
        })?;
        self.push_mutation(move |engine| async move {
            tracing::info!(
                target: "modsync::upload",
                mod_id = %id,
                source = %params.root_directory.display(),
                "Modfile queued for upload"
            );
            engine.store.write().pending_uploads.insert(id, params);
        })
    }

    /// Make `id` the next transfer. A transfer of another mod in progress is
    /// cancelled and resumes later without losing a retry.
    pub fn prioritize_transfer_for_mod(&self, id: ModId) -> ModResult<()> {
        self.engine.store.query(|state| {
            Precheck::new(state)
                .initialized()?
                .management_enabled()?
                .valid_mod(id)
                .map(|_| ())
        })?;
        self.push_mutation(move |engine| async move {
            engine.store.write().priority = Some(id);
            let slot = engine.store.progress();
            if slot.current_mod().is_some_and(|current| current != id) {
                slot.cancel(None);
            }
            tracing::debug!(target: "modsync::engine", mod_id = %id, "Transfer prioritized");
        })
    }

    /// Limit the space installed mods may use. `None` removes the limit.
    pub fn set_mod_storage_quota(&self, bytes: Option<u64>) -> ModResult<()> {
        self.set_quota(CollectionKind::System, bytes)
    }

    /// Limit the space temporary mod set installs may use.
    pub fn set_temp_mod_storage_quota(&self, bytes: Option<u64>) -> ModResult<()> {
        self.set_quota(CollectionKind::Temp, bytes)
    }

    fn set_quota(&self, kind: CollectionKind, bytes: Option<u64>) -> ModResult<()> {
        if bytes == Some(0) {
            return Err(ModError::invalid_parameters("quota must be positive"));
        }
        self.engine
            .store
            .query(|state| Precheck::new(state).initialized().map(|_| ()))?;
        self.push_mutation(move |engine| async move {
            let mut state = engine.store.write();
            let quota = match kind {
                CollectionKind::System => &mut state.options.mod_storage_quota,
                CollectionKind::Temp => &mut state.options.temp_mod_storage_quota,
            };
            *quota = bytes;
            // Entries waiting out a lack of space get a fresh start.
            for entry in state.collection_mut(kind).iter_mut() {
                if matches!(entry.last_error(), Some(ModError::InsufficientSpace { .. })) {
                    entry.clear_last_error();
                }
            }
            tracing::info!(target: "modsync::engine", ?kind, quota = ?bytes, "Storage quota changed");
        })
    }

    /// Sign `user` in. Replacing a different user drops their local
    /// subscriptions first.
    pub fn set_authenticated_user(&self, user: AuthenticatedUser) -> ModResult<()> {
        self.engine
            .store
            .query(|state| Precheck::new(state).initialized().map(|_| ()))?;
        self.push_mutation(move |engine| async move {
            let previous = {
                let mut state = engine.store.write();
                let previous = state.user_id().filter(|&old| old != user.user_id);
                tracing::info!(
                    target: "modsync::engine",
                    user_id = %user.user_id,
                    username = %user.username,
                    "User signed in"
                );
                state.user = Some(user);
                state.cache.subscriptions_invalid = true;
                if previous.is_some() {
                    state.subscriptions.clear();
                    state.deferred_unsubscriptions.clear();
                    state.priority = None;
                }
                previous
            };
            if let Some(previous) = previous {
                release_user_subscriptions(&engine, previous);
            }
            if let Err(err) = save_user_data(&engine).await {
                tracing::warn!(target: "modsync::storage", error = %err, "Failed to save user data");
            }
        })
    }

    /// Sign the current user out, dropping their subscriptions locally.
    ///
    /// Mods no other local user subscribes to are uninstalled by mod
    /// management.
    pub fn clear_user_data(&self, callback: impl FnOnce(ModResult<()>) + Send + 'static) {
        self.submit(
            callback,
            |state| Precheck::new(state).initialized().map(|_| ()),
            |engine| async move {
                let user = {
                    let mut state = engine.store.write();
                    let user = state.user_id();
                    state.user = None;
                    state.subscriptions.clear();
                    state.deferred_unsubscriptions.clear();
                    state.priority = None;
                    user
                };
                if let Some(user) = user {
                    release_user_subscriptions(&engine, user);
                    tracing::info!(target: "modsync::engine", user_id = %user, "User data cleared");
                }
                save_all_logged(&engine).await;
                Ok(())
            },
        );
    }
}

async fn force_uninstall(engine: &Arc<Engine>, id: ModId) -> ModResult<()> {
    engine.store.progress().cancel(Some(id));
    uninstall_mod(engine, CollectionKind::System, id, true).await?;
    save_state(engine).await
}

/// Drop `user`'s local subscriptions, cancelling a transfer that no one
/// needs any more.
fn release_user_subscriptions(engine: &Engine, user: modsync_core::UserId) {
    let released: Vec<ModId> = {
        let mut state = engine.store.write();
        state
            .system
            .iter_mut()
            .filter_map(|entry| entry.remove_local_subscription(user).then(|| entry.id()))
            .collect()
    };
    if let Some(current) = engine.store.progress().current_mod() {
        if released.contains(&current) {
            engine.store.progress().cancel(Some(current));
        }
    }
}
