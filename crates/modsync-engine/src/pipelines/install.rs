//! Install and update pipeline.
//!
//! ```text
//! claim slot → fetch profile → quota/space checks → Downloading
//!     → download (or reuse staged file) → Extracting → extract
//!     → Installed → delete staged file → commit
//! ```
//!
//! Everything before `commit` runs inside an [`EntryTransaction`], so any
//! failure or cancellation puts the entry back exactly as it was.

use std::path::Path;

use modsync_core::{
    ApiRequest, CachePolicy, FileMetadata, ModError, ModId, ModInfo, ModProgressState, ModResult,
    ModState,
};

use crate::context::Engine;
use crate::ops::OperationGuard;
use crate::session::{CollectionKind, TransferLease};
use crate::transaction::EntryTransaction;

/// Install or update `id` in `kind`'s collection.
///
/// Fails with `ModBeingProcessed` if another transfer owns the progress slot.
pub async fn install_or_update_mod(engine: &Engine, kind: CollectionKind, id: ModId) -> ModResult<()> {
    let guard = OperationGuard::managed(&engine.store)?;
    let lease = claim_slot(engine, id, &guard)?;
    let guard = guard.with_lease(&lease);
    let tx = EntryTransaction::begin(&engine.store, kind, id)?;

    let profile = fetch_profile(engine, &guard, id).await?;
    let modfile = profile
        .modfile
        .clone()
        .ok_or_else(|| ModError::not_found(format!("mod {id} has no live modfile")))?;

    check_quota(engine, kind, id, &modfile)?;
    let paths = engine.paths()?;
    let staged = paths.download_path(id, &modfile.filename);
    let reuse = is_staged(engine, &staged, modfile.filesize).await;
    check_space(engine, &guard, &paths.downloads_dir(), &modfile, reuse).await?;

    tx.with_entry(|e| {
        e.update_profile(profile);
        e.set_state(ModState::Downloading)
    })?;
    lease.begin_phase(ModProgressState::Downloading);
    if reuse {
        tracing::debug!(
            target: "modsync::install",
            mod_id = %id,
            path = %staged.display(),
            "Reusing staged download"
        );
        let sink = lease.sink();
        sink.set_total(modfile.filesize);
        sink.add_progress(modfile.filesize);
    } else {
        download(engine, &guard, &lease, &modfile, &staged).await?;
    }

    tx.with_entry(|e| e.set_state(ModState::Extracting))?;
    lease.begin_phase(ModProgressState::Extracting);
    let install_path = tx.with_entry(|e| e.path_on_disk().to_path_buf())?;
    let size = extract(engine, &guard, &lease, &staged, &install_path).await?;

    tx.with_entry(|e| {
        e.update_size_on_disk(Some(size));
        e.set_state(ModState::Installed);
        e.clear_last_error();
    })?;
    if let Err(err) = engine.fs().delete_file(&staged).await {
        tracing::warn!(
            target: "modsync::install",
            mod_id = %id,
            error = %err,
            "Failed to delete staged download"
        );
    }
    tx.commit();
    tracing::info!(
        target: "modsync::install",
        mod_id = %id,
        size_on_disk = size,
        "Mod installed"
    );
    Ok(())
}

fn claim_slot(engine: &Engine, id: ModId, guard: &OperationGuard<'_>) -> ModResult<TransferLease> {
    engine.store.progress().start(id, guard.token()).ok_or_else(|| {
        let busy = engine.store.progress().current_mod().unwrap_or(id);
        tracing::debug!(
            target: "modsync::install",
            mod_id = %id,
            busy_with = %busy,
            "Progress slot occupied"
        );
        ModError::ModBeingProcessed { id: busy.get() }
    })
}

async fn fetch_profile(engine: &Engine, guard: &OperationGuard<'_>, id: ModId) -> ModResult<ModInfo> {
    let invalid = engine.store.read().cache.invalid_mods.contains(&id);
    let profile = engine
        .request::<ModInfo>(
            guard,
            ApiRequest::GetMod { mod_id: id },
            CachePolicy::unless_invalidated(invalid),
        )
        .await?;
    engine.store.write().cache.invalid_mods.remove(&id);
    Ok(profile)
}

/// Reject the install if it would push `kind`'s storage over its quota.
fn check_quota(engine: &Engine, kind: CollectionKind, id: ModId, modfile: &FileMetadata) -> ModResult<()> {
    let state = engine.store.read();
    let Some(quota) = state.quota(kind) else {
        return Ok(());
    };
    let used: u64 = state
        .collection(kind)
        .iter()
        .filter(|e| e.id() != id)
        .filter_map(|e| e.size_on_disk())
        .sum();
    let required = used.saturating_add(modfile.filesize_uncompressed);
    if required > quota {
        tracing::warn!(
            target: "modsync::install",
            mod_id = %id,
            used,
            required,
            quota,
            "Storage quota exceeded"
        );
        return Err(ModError::insufficient_space(required, quota));
    }
    Ok(())
}

async fn is_staged(engine: &Engine, staged: &Path, filesize: u64) -> bool {
    engine.fs().file_exists(staged).await
        && engine
            .fs()
            .file_size(staged)
            .await
            .is_ok_and(|size| size == filesize)
}

async fn check_space(
    engine: &Engine,
    guard: &OperationGuard<'_>,
    dir: &Path,
    modfile: &FileMetadata,
    reuse: bool,
) -> ModResult<()> {
    let download = if reuse { 0 } else { modfile.filesize };
    let required = download.saturating_add(modfile.filesize_uncompressed);
    if !guard
        .step(engine.fs().check_space_available(dir, required))
        .await?
    {
        return Err(ModError::insufficient_space(required, 0));
    }
    Ok(())
}

async fn download(
    engine: &Engine,
    guard: &OperationGuard<'_>,
    lease: &TransferLease,
    modfile: &FileMetadata,
    staged: &Path,
) -> ModResult<()> {
    tracing::debug!(
        target: "modsync::install",
        mod_id = %modfile.mod_id,
        url = %modfile.download.binary_url,
        bytes = modfile.filesize,
        "Downloading modfile"
    );
    let result = guard
        .step(engine.transport().download_file(
            &modfile.download.binary_url,
            staged,
            lease.sink(),
            Some(modfile.filesize),
        ))
        .await;
    if let Err(err) = &result {
        engine.store.note_api_error(err);
        if !err.is_cancelled() {
            // A partial file would be mistaken for a staged download.
            if let Err(cleanup) = engine.fs().delete_file(staged).await {
                if !cleanup.is_not_found() {
                    tracing::warn!(
                        target: "modsync::install",
                        path = %staged.display(),
                        error = %cleanup,
                        "Failed to delete partial download"
                    );
                }
            }
        }
    }
    result
}

async fn extract(
    engine: &Engine,
    guard: &OperationGuard<'_>,
    lease: &TransferLease,
    staged: &Path,
    install_path: &Path,
) -> ModResult<u64> {
    if engine.fs().directory_exists(install_path).await {
        match guard.step(engine.fs().delete_folder(install_path)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
    }
    let result = guard
        .step(engine.archive().extract(staged, install_path, lease.sink()))
        .await;
    if result.is_err() {
        if let Err(err) = engine.fs().delete_folder(install_path).await {
            if !err.is_not_found() {
                tracing::warn!(
                    target: "modsync::install",
                    path = %install_path.display(),
                    error = %err,
                    "Failed to clean up partial extraction"
                );
            }
        }
    }
    result
}
