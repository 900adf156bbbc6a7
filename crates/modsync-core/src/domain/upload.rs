//! Parameters for submitting a new modfile.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ModError, ModResult};

/// A new release of an existing mod, compressed from a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateModFileParams {
    /// Directory whose contents become the archive.
    pub root_directory: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    /// Make the new file the live release.
    #[serde(default = "default_true")]
    pub set_as_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_blob: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl CreateModFileParams {
    pub fn new(root_directory: impl Into<PathBuf>) -> Self {
        Self {
            root_directory: root_directory.into(),
            version: None,
            changelog: None,
            set_as_active: true,
            metadata_blob: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_changelog(mut self, changelog: impl Into<String>) -> Self {
        self.changelog = Some(changelog.into());
        self
    }

    #[must_use]
    pub const fn with_set_as_active(mut self, active: bool) -> Self {
        self.set_as_active = active;
        self
    }

    /// Reject parameters the catalog would refuse.
    pub fn validate(&self) -> ModResult<()> {
        if self.root_directory.as_os_str().is_empty() {
            return Err(ModError::invalid_parameters("root directory is empty"));
        }
        if self
            .version
            .as_ref()
            .is_some_and(|v| v.trim().is_empty() || v.len() > 50)
        {
            return Err(ModError::invalid_parameters(
                "version must be 1-50 characters",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(CreateModFileParams::new("/src").validate().is_ok());
        assert!(CreateModFileParams::new("").validate().is_err());
        assert!(
            CreateModFileParams::new("/src")
                .with_version("  ")
                .validate()
                .is_err()
        );
    }
}
