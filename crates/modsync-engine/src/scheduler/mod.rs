//! The mod management loop.
//!
//! One loop runs per enable of mod management. Each iteration picks at most
//! one action (see [`select`]), runs it to completion, records the outcome on
//! the entry and in the event log, then waits one idle interval. Every
//! `reconcile_every` waits, busy or not, it reconciles the user's
//! subscriptions in the background.

mod select;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use modsync_core::ModResult;

use crate::context::Engine;
use crate::ops::storage::save_state;
use crate::pipelines::{install_or_update_mod, uninstall_mod, upload_modfile};
use crate::session::CollectionKind;
use crate::subscriptions::fetch_external_updates;
use crate::temp_mods;

pub use select::{NextAction, select_next_action};

/// Run the loop until `token` is cancelled.
pub async fn run_management_loop(engine: Arc<Engine>, token: CancellationToken) {
    tracing::info!(target: "modsync::scheduler", "Mod management loop started");
    let mut wait_slots: u32 = 0;
    loop {
        if token.is_cancelled() {
            break;
        }
        process_next(&engine).await;

        let (idle, reconcile_every) = {
            let state = engine.store.read();
            (
                state.options.idle_interval(),
                state.options.reconcile_every.max(1),
            )
        };
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(idle) => {}
        }

        wait_slots = wait_slots.wrapping_add(1);
        if wait_slots % reconcile_every == 0 {
            background_reconcile(&engine).await;
        }
    }
    tracing::info!(target: "modsync::scheduler", "Mod management loop stopped");
}

/// Select and run one action. Returns `false` when there was nothing to do.
pub async fn process_next(engine: &Engine) -> bool {
    let now = Instant::now();
    let action = {
        let state = engine.store.read();
        if state.is_rate_limited(now) {
            None
        } else {
            select_next_action(&state, now)
        }
    };
    let Some(action) = action else {
        return false;
    };
    let id = action.mod_id();
    tracing::debug!(target: "modsync::scheduler", ?action, "Processing");

    if let Some((begin, _)) = action.events() {
        engine.store.write().record_event(id, begin, None);
    }
    let result = run_action(engine, action).await;

    {
        let mut state = engine.store.write();
        if let Err(err) = &result {
            tracing::warn!(
                target: "modsync::scheduler",
                mod_id = %id,
                error = %err,
                "Mod operation failed"
            );
            if let Some(entry) = action
                .collection()
                .and_then(|kind| state.collection_mut(kind).get_mut(id))
            {
                entry.set_last_error(err.clone(), Instant::now());
            }
        }
        if state.priority == Some(id) {
            state.priority = None;
        }
        match action.events() {
            Some((_, finish)) => state.record_event(id, finish, result.clone().err()),
            None => {
                if let Err(err) = &result {
                    if !err.is_recoverable() && !err.is_cancelled() {
                        state.record_event(
                            id,
                            modsync_core::ModManagementEventType::Installed,
                            Some(err.clone()),
                        );
                    }
                }
            }
        }
    }

    if action.collection() == Some(CollectionKind::System) {
        if let Err(err) = save_state(engine).await {
            tracing::warn!(target: "modsync::scheduler", error = %err, "Failed to save state");
        }
    }
    true
}

async fn run_action(engine: &Engine, action: NextAction) -> ModResult<()> {
    match action {
        NextAction::Uninstall { kind, id } => uninstall_mod(engine, kind, id, false).await,
        NextAction::Install { kind, id, .. } => install_or_update_mod(engine, kind, id).await,
        NextAction::ResolveTempProfile { id } => temp_mods::resolve_profile(engine, id).await,
        NextAction::Upload { id } => upload_modfile(engine, id).await.map(|_| ()),
    }
}

async fn background_reconcile(engine: &Engine) {
    let ready = {
        let state = engine.store.read();
        state.access_token().is_some() && !state.is_rate_limited(Instant::now())
    };
    if !ready {
        return;
    }
    match fetch_external_updates(engine).await {
        Ok(changes) if !changes.is_empty() => {
            tracing::debug!(
                target: "modsync::scheduler",
                changes = changes.len(),
                "Background reconciliation applied changes"
            );
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(
                target: "modsync::scheduler",
                error = %err,
                "Background reconciliation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{USER, managed_engine};
    use modsync_core::testing::FakeCall;
    use modsync_core::{ApiRequest, ModError, ModId, ModManagementEventType, ModState};

    fn subscribe_local(engine: &Engine, fakes: &modsync_core::testing::FakeServices, id: i64) {
        let info = fakes.catalog.add_mod(id, b"payload".to_vec());
        let mut state = engine.store.write();
        let path = state.install_path(CollectionKind::System, info.id).unwrap();
        state
            .system
            .add_or_update_mod(info.clone(), path)
            .add_local_subscription(USER);
        state.subscriptions.add(info.id);
    }

    #[tokio::test]
    async fn test_process_next_installs_and_logs_events() {
        let (engine, fakes) = managed_engine();
        subscribe_local(&engine, &fakes, 7);

        assert!(process_next(&engine).await);
        assert!(!process_next(&engine).await);

        let events = engine.store.write().events.clear_log();
        let kinds: Vec<_> = events.iter().map(|e| e.event).collect();
        assert_eq!(
            kinds,
            vec![
                ModManagementEventType::BeginInstall,
                ModManagementEventType::Installed
            ]
        );
        assert_eq!(events[1].status, None);
        assert!(fakes.fs.get_file(std::path::Path::new("/game/metadata/state.json")).is_some());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_on_entry() {
        let (engine, fakes) = managed_engine();
        subscribe_local(&engine, &fakes, 7);
        fakes
            .catalog
            .fail_next(FakeCall::Download, ModError::network("reset"));

        assert!(process_next(&engine).await);

        let state = engine.store.read();
        let entry = state.system.get(ModId::new(7)).unwrap();
        assert_eq!(entry.state(), ModState::InstallationPending);
        assert_eq!(entry.retry().attempts_used(), 1);
        assert!(matches!(entry.last_error(), Some(ModError::Network { .. })));
    }

    #[tokio::test]
    async fn test_rate_limit_pauses_selection() {
        let (engine, fakes) = managed_engine();
        subscribe_local(&engine, &fakes, 7);
        engine.store.note_api_error(&ModError::RateLimited {
            retry_after_secs: 60,
        });
        assert!(!process_next(&engine).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_cancelled() {
        let (engine, fakes) = managed_engine();
        subscribe_local(&engine, &fakes, 7);
        let engine = Arc::new(engine);
        let token = engine.store.management_token();

        let handle = tokio::spawn(run_management_loop(Arc::clone(&engine), token.clone()));
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(
            engine.store.read().system.get(ModId::new(7)).unwrap().state(),
            ModState::Installed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_runs_while_busy() {
        let (engine, fakes) = managed_engine();
        for id in [7, 8, 9] {
            subscribe_local(&engine, &fakes, id);
        }
        {
            let mut state = engine.store.write();
            state.options.idle_interval_ms = 1000;
            state.options.reconcile_every = 2;
        }
        let engine = Arc::new(engine);
        let token = engine.store.management_token();

        let handle = tokio::spawn(run_management_loop(Arc::clone(&engine), token.clone()));
        // Two waits pass while the third install is still queued.
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        token.cancel();
        handle.await.unwrap();

        let listed = fakes
            .catalog
            .requests()
            .iter()
            .filter(|r| matches!(r, ApiRequest::ListUserSubscriptions { .. }))
            .count();
        assert_eq!(listed, 1);
    }
}
