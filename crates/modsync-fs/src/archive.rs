//! `ArchivePort` over zip files.
//!
//! The `zip` crate is synchronous, so both directions run on tokio's
//! blocking pool and poll the progress sink for cancellation between
//! chunks.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use modsync_core::{ArchivePort, ModError, ModResult, ProgressSink};

const CHUNK_SIZE: usize = 64 * 1024;

/// Packs and unpacks deflate zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    pub const fn new() -> Self {
        Self
    }
}

fn zip_error(err: ZipError) -> ModError {
    match err {
        ZipError::Io(err) => ModError::from_io_error(&err),
        other => ModError::invalid_response(format!("corrupt archive: {other}")),
    }
}

fn io_error(err: &io::Error) -> ModError {
    ModError::from_io_error(err)
}

/// Run `work` on the blocking pool.
async fn blocking<T, F>(work: F) -> ModResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ModResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ModError::io("Other", format!("archive worker failed: {err}")))?
}

/// Copy `reader` into `writer`, reporting each chunk and stopping once the
/// sink is cancelled.
fn copy_with_progress(
    reader: &mut impl Read,
    writer: &mut impl Write,
    progress: &dyn ProgressSink,
) -> ModResult<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        if progress.is_cancelled() {
            return Err(ModError::Cancelled);
        }
        let n = reader.read(&mut buf).map_err(|err| io_error(&err))?;
        if n == 0 {
            return Ok(copied);
        }
        writer.write_all(&buf[..n]).map_err(|err| io_error(&err))?;
        copied += n as u64;
        progress.add_progress(n as u64);
    }
}

#[async_trait]
impl ArchivePort for ZipArchiver {
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<u64> {
        let (archive, dest) = (archive.to_path_buf(), dest.to_path_buf());
        let extracted = blocking(move || extract_blocking(&archive, &dest, &*progress)).await?;
        tracing::debug!(target: "modsync::archive", bytes = extracted, "Archive extracted");
        Ok(extracted)
    }

    async fn compress(
        &self,
        source_dir: &Path,
        dest_archive: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<()> {
        let (source, dest) = (source_dir.to_path_buf(), dest_archive.to_path_buf());
        let entries = blocking(move || compress_blocking(&source, &dest, &*progress)).await?;
        tracing::debug!(target: "modsync::archive", entries, "Archive written");
        Ok(())
    }
}

fn extract_blocking(archive: &Path, dest: &Path, progress: &dyn ProgressSink) -> ModResult<u64> {
    let file = File::open(archive).map_err(|err| io_error(&err))?;
    let mut zip = ZipArchive::new(file).map_err(zip_error)?;

    let mut total = 0u64;
    for i in 0..zip.len() {
        total = total.saturating_add(zip.by_index(i).map_err(zip_error)?.size());
    }
    progress.set_total(total);

    fs::create_dir_all(dest).map_err(|err| io_error(&err))?;
    let mut extracted = 0u64;
    for i in 0..zip.len() {
        if progress.is_cancelled() {
            return Err(ModError::Cancelled);
        }
        let mut entry = zip.by_index(i).map_err(zip_error)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ModError::invalid_response(format!(
                "archive entry '{}' escapes the destination",
                entry.name()
            )));
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|err| io_error(&err))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| io_error(&err))?;
        }
        let mut out = File::create(&target).map_err(|err| io_error(&err))?;
        extracted += copy_with_progress(&mut entry, &mut out, progress)?;
    }
    Ok(extracted)
}

/// Every file and directory under `root`, sorted so folders precede their
/// contents.
fn walk(root: &Path) -> io::Result<Vec<(PathBuf, bool)>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let child = entry?.path();
            let is_dir = child.is_dir();
            if is_dir {
                pending.push(child.clone());
            }
            found.push((child, is_dir));
        }
    }
    found.sort();
    Ok(found)
}

/// Entry name for `path`: relative to `root`, with `/` separators.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|part| part.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

fn compress_blocking(source: &Path, dest: &Path, progress: &dyn ProgressSink) -> ModResult<usize> {
    let entries = walk(source).map_err(|err| io_error(&err))?;
    let total = entries
        .iter()
        .filter(|(_, is_dir)| !is_dir)
        .filter_map(|(path, _)| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();
    progress.set_total(total);

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error(&err))?;
    }
    let mut zip = ZipWriter::new(File::create(dest).map_err(|err| io_error(&err))?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, is_dir) in &entries {
        let Some(name) = entry_name(source, path) else {
            return Err(ModError::invalid_parameters(format!(
                "{} has a name that cannot be stored",
                path.display()
            )));
        };
        if *is_dir {
            zip.add_directory(name, options).map_err(zip_error)?;
            continue;
        }
        let mut input = File::open(path).map_err(|err| io_error(&err))?;
        let size = input.metadata().map_err(|err| io_error(&err))?.len();
        zip.start_file(name, options.large_file(size >= u64::from(u32::MAX)))
            .map_err(zip_error)?;
        copy_with_progress(&mut input, &mut zip, progress)?;
    }
    zip.finish().map_err(zip_error)?;
    Ok(entries.len())
}
