//! Reconciliation of local subscriptions with the server's list.

use modsync_core::{
    ApiRequest, CachePolicy, ChangeType, ModInfo, ModResult, PagedResponse, SubscriptionChanges,
    UserSubscriptionList, calculate_updates, merge_changes,
};

use super::flush_deferred_unsubscriptions;
use crate::context::Engine;
use crate::ops::OperationGuard;
use crate::ops::storage::save_all_logged;
use crate::session::CollectionKind;

/// Page size used when listing the user's subscriptions.
pub const PAGE_SIZE: u64 = 100;

/// Every profile in the user's server-side subscription list.
///
/// Mods with a deferred unsubscription are left out, so a failed unsubscribe
/// is never undone by the list it failed to change.
async fn fetch_server_subscriptions(
    engine: &Engine,
    guard: &OperationGuard<'_>,
) -> ModResult<Vec<ModInfo>> {
    let cache = CachePolicy::unless_invalidated(engine.store.read().cache.subscriptions_invalid);
    let mut profiles = Vec::new();
    let mut offset = 0;
    loop {
        let page: PagedResponse<ModInfo> = engine
            .request(
                guard,
                ApiRequest::ListUserSubscriptions {
                    offset,
                    limit: PAGE_SIZE,
                },
                cache,
            )
            .await?;
        let next = page.next_offset();
        profiles.extend(page.data);
        match next {
            Some(n) => offset = n,
            None => break,
        }
    }

    let mut state = engine.store.write();
    state.cache.subscriptions_invalid = false;
    profiles.retain(|p| !state.deferred_unsubscriptions.contains(&p.id));
    tracing::debug!(
        target: "modsync::reconcile",
        count = profiles.len(),
        "Fetched server subscriptions"
    );
    Ok(profiles)
}

/// Apply the server's subscription list to the local session.
///
/// Deferred unsubscriptions are retried first. Returns the subscription
/// changes applied; running it again with no server-side change returns an
/// empty map.
pub async fn fetch_external_updates(engine: &Engine) -> ModResult<SubscriptionChanges> {
    if let Err(err) = flush_deferred_unsubscriptions(engine).await {
        if err.is_cancelled() {
            return Err(err);
        }
        tracing::warn!(
            target: "modsync::reconcile",
            error = %err,
            "Could not flush deferred unsubscriptions"
        );
    }

    let guard = OperationGuard::foreground(&engine.store);
    let profiles = fetch_server_subscriptions(engine, &guard).await?;
    let server: UserSubscriptionList = profiles.iter().map(|p| p.id).collect();

    let changes = {
        let mut state = engine.store.write();
        let user = state.user_id();
        for profile in profiles {
            let path = state.install_path(CollectionKind::System, profile.id)?;
            state.system.add_or_update_mod(profile, path);
        }

        let changes = state.subscriptions.calculate_changes(&server);
        for (&id, change) in &changes {
            match change {
                ChangeType::Added => {
                    state.subscriptions.add(id);
                    if let (Some(user), Some(entry)) = (user, state.system.get_mut(id)) {
                        entry.add_local_subscription(user);
                    }
                }
                ChangeType::Removed => {
                    state.subscriptions.remove(id);
                    if let (Some(user), Some(entry)) = (user, state.system.get_mut(id)) {
                        entry.remove_local_subscription(user);
                    }
                }
                ChangeType::Updated => {}
            }
        }
        changes
    };

    for (id, change) in &changes {
        if *change == ChangeType::Removed {
            engine.store.progress().cancel(Some(*id));
        }
    }
    tracing::info!(
        target: "modsync::reconcile",
        added = changes.values().filter(|c| **c == ChangeType::Added).count(),
        removed = changes.values().filter(|c| **c == ChangeType::Removed).count(),
        "Reconciled subscriptions"
    );
    save_all_logged(engine).await;
    Ok(changes)
}

/// What [`fetch_external_updates`] would change, without changing it.
///
/// Includes `Updated` for subscribed mods whose live modfile differs from the
/// installed one.
pub async fn preview_external_updates(engine: &Engine) -> ModResult<SubscriptionChanges> {
    let guard = OperationGuard::foreground(&engine.store);
    let profiles = fetch_server_subscriptions(engine, &guard).await?;
    let server: UserSubscriptionList = profiles.iter().map(|p| p.id).collect();

    let state = engine.store.read();
    let changes = state.subscriptions.calculate_changes(&server);
    let updates = calculate_updates(&state.system, &profiles);
    Ok(merge_changes(changes, updates))
}
