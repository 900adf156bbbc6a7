//! Subscription flows: subscribe, unsubscribe and reconciliation with the
//! server's subscription list.

mod reconcile;

use modsync_core::{ApiRequest, CachePolicy, ModError, ModId, ModInfo, ModResult};

use crate::context::Engine;
use crate::ops::OperationGuard;
use crate::ops::storage::save_all_logged;
use crate::session::CollectionKind;

pub use reconcile::{PAGE_SIZE, fetch_external_updates, preview_external_updates};

/// Subscribe the current user to `id` and queue its installation.
///
/// A server reply saying the subscription already exists is treated as
/// success.
pub async fn subscribe(engine: &Engine, id: ModId) -> ModResult<()> {
    let guard = OperationGuard::foreground(&engine.store);
    engine.store.write().deferred_unsubscriptions.shift_remove(&id);

    let profile = match engine
        .request::<ModInfo>(&guard, ApiRequest::SubscribeToMod { mod_id: id }, CachePolicy::Disallow)
        .await
    {
        Ok(profile) => profile,
        Err(ModError::AlreadyPerformed { .. }) => {
            tracing::debug!(
                target: "modsync::subscriptions",
                mod_id = %id,
                "Server already had the subscription"
            );
            engine
                .request::<ModInfo>(&guard, ApiRequest::GetMod { mod_id: id }, CachePolicy::Allow)
                .await?
        }
        Err(err) => return Err(err),
    };

    {
        let mut state = engine.store.write();
        let user = state.user_id().ok_or(ModError::NotAuthenticated)?;
        let path = state.install_path(CollectionKind::System, id)?;
        state.cache.subscriptions_invalid = true;
        let newly_subscribed = state.subscriptions.add(id);
        let entry = state.system.add_or_update_mod(profile, path);
        if newly_subscribed {
            entry.add_local_subscription(user);
        }
        entry.clear_never_retry();
    }
    tracing::info!(target: "modsync::subscriptions", mod_id = %id, "Subscribed");
    save_all_logged(engine).await;
    Ok(())
}

/// Unsubscribe the current user from `id`.
///
/// The local change is applied first and any transfer of `id` cancelled. If
/// the server call then fails (other than by cancellation) the unsubscription
/// is deferred and retried on the next reconciliation; the operation still
/// succeeds.
pub async fn unsubscribe(engine: &Engine, id: ModId) -> ModResult<()> {
    let guard = OperationGuard::foreground(&engine.store);
    engine.store.progress().cancel(Some(id));
    {
        let mut state = engine.store.write();
        let user = state.user_id();
        state.subscriptions.remove(id);
        state.cache.subscriptions_invalid = true;
        if state.priority == Some(id) {
            state.priority = None;
        }
        if let (Some(user), Some(entry)) = (user, state.system.get_mut(id)) {
            entry.remove_local_subscription(user);
        }
    }

    match engine
        .request_raw(&guard, ApiRequest::UnsubscribeFromMod { mod_id: id }, CachePolicy::Disallow)
        .await
    {
        Ok(_) => {}
        Err(ModError::AlreadyPerformed { .. } | ModError::NotFound { .. }) => {
            tracing::debug!(
                target: "modsync::subscriptions",
                mod_id = %id,
                "Server had no subscription to remove"
            );
        }
        Err(ModError::Cancelled) => return Err(ModError::Cancelled),
        Err(err) => {
            tracing::warn!(
                target: "modsync::subscriptions",
                mod_id = %id,
                error = %err,
                "Unsubscribe failed, deferring"
            );
            engine.store.write().deferred_unsubscriptions.insert(id);
        }
    }
    tracing::info!(target: "modsync::subscriptions", mod_id = %id, "Unsubscribed");
    save_all_logged(engine).await;
    Ok(())
}

/// Retry deferred unsubscriptions. Ids the server accepted (or had already
/// forgotten) leave the deferred set.
pub async fn flush_deferred_unsubscriptions(engine: &Engine) -> ModResult<()> {
    let guard = OperationGuard::foreground(&engine.store);
    let pending: Vec<ModId> = engine
        .store
        .read()
        .deferred_unsubscriptions
        .iter()
        .copied()
        .collect();
    for id in pending {
        let result = engine
            .request_raw(&guard, ApiRequest::UnsubscribeFromMod { mod_id: id }, CachePolicy::Disallow)
            .await;
        match result {
            Ok(_) | Err(ModError::AlreadyPerformed { .. } | ModError::NotFound { .. }) => {
                engine.store.write().deferred_unsubscriptions.shift_remove(&id);
                tracing::debug!(
                    target: "modsync::subscriptions",
                    mod_id = %id,
                    "Deferred unsubscribe delivered"
                );
            }
            Err(
                err @ (ModError::Cancelled
                | ModError::NotAuthenticated
                | ModError::RateLimited { .. }),
            ) => return Err(err),
            Err(err) => {
                tracing::debug!(
                    target: "modsync::subscriptions",
                    mod_id = %id,
                    error = %err,
                    "Deferred unsubscribe still failing"
                );
            }
        }
    }
    Ok(())
}
