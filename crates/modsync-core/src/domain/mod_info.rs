//! Server-provided mod metadata.
//!
//! These mirror the catalog's JSON payloads closely enough to be decoded
//! directly with `serde_json`; unknown fields are ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ModId;

/// Where a modfile can be fetched from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Direct URL of the archive.
    pub binary_url: String,
    /// Unix timestamp after which the URL is no longer valid (0 if unknown).
    #[serde(default)]
    pub date_expires: i64,
}

/// Metadata of a single modfile release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Modfile id. A different id than the installed one means an update.
    pub id: i64,
    /// Mod this file belongs to.
    pub mod_id: ModId,
    /// Archive filename on the server.
    pub filename: String,
    /// Compressed archive size in bytes.
    pub filesize: u64,
    /// Size of the extracted payload in bytes.
    #[serde(default)]
    pub filesize_uncompressed: u64,
    /// Release version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Download location.
    pub download: DownloadInfo,
}

/// Snapshot of a mod's profile as returned by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfo {
    /// Mod id.
    pub id: ModId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Unix timestamp of the last profile change.
    #[serde(default)]
    pub date_updated: i64,
    /// The current live modfile, if the mod has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modfile: Option<FileMetadata>,
}

impl ModInfo {
    /// Create a profile with no modfile.
    pub fn new(id: ModId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            date_updated: 0,
            modfile: None,
        }
    }

    /// Attach a modfile.
    #[must_use]
    pub fn with_modfile(mut self, modfile: FileMetadata) -> Self {
        self.modfile = Some(modfile);
        self
    }

    /// Id of the live modfile, if any.
    pub fn modfile_id(&self) -> Option<i64> {
        self.modfile.as_ref().map(|f| f.id)
    }

    /// Last profile change as a timestamp.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.date_updated, 0).single()
    }
}

impl FileMetadata {
    /// Create modfile metadata with equal compressed and extracted sizes.
    pub fn new(id: i64, mod_id: ModId, filename: impl Into<String>, filesize: u64) -> Self {
        Self {
            id,
            mod_id,
            filename: filename.into(),
            filesize,
            filesize_uncompressed: filesize,
            version: None,
            download: DownloadInfo::default(),
        }
    }

    /// Set the extracted payload size.
    #[must_use]
    pub const fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.filesize_uncompressed = size;
        self
    }

    /// Set the download URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.download.binary_url = url.into();
        self
    }
}

/// A page of results from a catalog listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    /// Items in this page.
    pub data: Vec<T>,
    /// Number of items in this page.
    pub result_count: u64,
    /// Offset of the first item.
    pub result_offset: u64,
    /// Requested page size.
    pub result_limit: u64,
    /// Total number of items across all pages.
    pub result_total: u64,
}

impl<T> PagedResponse<T> {
    /// Offset of the next page, or `None` if this was the last one.
    pub fn next_offset(&self) -> Option<u64> {
        let next = self.result_offset + self.result_count;
        (self.result_count > 0 && next < self.result_total).then_some(next)
    }
}

/// Response of a modfile submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedModfile {
    /// Id of the new modfile.
    pub id: i64,
    /// Mod it belongs to.
    pub mod_id: ModId,
}
