//! Modfile upload pipeline: compress the source folder, submit the archive.

use modsync_core::domain::SubmittedModfile;
use modsync_core::{ApiRequest, CreateModFileParams, ModError, ModId, ModProgressState, ModResult};

use crate::context::{Engine, decode};
use crate::ops::OperationGuard;
use crate::session::TransferLease;

/// Upload the queued modfile for `id`.
///
/// A cancelled upload goes back to the front of the queue. Any other outcome
/// consumes the queued request; failed uploads are reported, not retried.
pub async fn upload_modfile(engine: &Engine, id: ModId) -> ModResult<SubmittedModfile> {
    let guard = OperationGuard::managed(&engine.store)?;
    let session = engine.store.read().session_token.clone();
    let lease = engine
        .store
        .progress()
        .start(id, guard.token())
        .ok_or_else(|| ModError::ModBeingProcessed {
            id: engine.store.progress().current_mod().unwrap_or(id).get(),
        })?;
    let guard = guard.with_lease(&lease);
    let params = engine
        .store
        .write()
        .pending_uploads
        .shift_remove(&id)
        .ok_or(ModError::Cancelled)?;

    let result = submit(engine, &guard, &lease, id, params.clone()).await;
    // A shutdown drops queued uploads with the rest of the session.
    if matches!(result, Err(ModError::Cancelled)) && !session.is_cancelled() {
        requeue(engine, id, params);
    }
    result
}

/// Put a cancelled upload back at the head of the queue, unless the host
/// queued a newer one for the same mod meanwhile.
fn requeue(engine: &Engine, id: ModId, params: CreateModFileParams) {
    let mut state = engine.store.write();
    if !state.pending_uploads.contains_key(&id) {
        state.pending_uploads.shift_insert(0, id, params);
        tracing::debug!(target: "modsync::upload", mod_id = %id, "Upload cancelled, requeued");
    }
}

async fn submit(
    engine: &Engine,
    guard: &OperationGuard<'_>,
    lease: &TransferLease,
    id: ModId,
    params: CreateModFileParams,
) -> ModResult<SubmittedModfile> {
    let paths = engine.paths()?;
    let archive = paths.upload_archive_path(id);

    lease.begin_phase(ModProgressState::Compressing);
    guard.step(engine.fs().create_folder(&paths.uploads_dir())).await?;
    tracing::debug!(
        target: "modsync::upload",
        mod_id = %id,
        source = %params.root_directory.display(),
        "Compressing modfile"
    );
    let compressed = guard
        .step(engine.archive().compress(&params.root_directory, &archive, lease.sink()))
        .await;
    let result = match compressed {
        Ok(()) => {
            lease.begin_phase(ModProgressState::Uploading);
            match engine.api_call(ApiRequest::SubmitModfile { mod_id: id, params }) {
                Ok(call) => {
                    guard
                        .step(engine.transport().upload_file(&call, &archive, lease.sink()))
                        .await
                }
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    };
    if let Err(err) = engine.fs().delete_file(&archive).await {
        if !err.is_not_found() {
            tracing::debug!(
                target: "modsync::upload",
                mod_id = %id,
                error = %err,
                "Failed to delete upload archive"
            );
        }
    }
    let body = result.inspect_err(|err| engine.store.note_api_error(err))?;
    let submitted: SubmittedModfile = decode(&body)?;

    engine.store.write().cache.invalid_mods.insert(id);
    tracing::info!(
        target: "modsync::upload",
        mod_id = %id,
        modfile_id = submitted.id,
        "Modfile uploaded"
    );
    Ok(submitted)
}
