//! Wrapper metadata document.
//!
//! A small JSON record persisted next to the user table. It names the two
//! files a wrapper owns (the volume image and the user table) by paths
//! relative to the wrapper directory, so the whole directory can be moved
//! without rewriting anything.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Format marker identifying a wrapper metadata document.
const FORMAT_MARKER: &str = "encvault-wrapper";

/// Current metadata document version.
const VERSION: u32 = 1;

/// The persisted description of a wrapper directory's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperMetadata {
    format: String,
    version: u32,
    volume_image: PathBuf,
    user_table: PathBuf,
}

impl WrapperMetadata {
    /// Creates metadata pointing at the given wrapper-relative paths.
    pub fn new(volume_image: impl Into<PathBuf>, user_table: impl Into<PathBuf>) -> Self {
        Self {
            format: FORMAT_MARKER.to_owned(),
            version: VERSION,
            volume_image: volume_image.into(),
            user_table: user_table.into(),
        }
    }

    /// Reads and validates the metadata document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedMetadata`] when the file cannot be
    /// read, is not valid JSON, carries the wrong format marker, or has an
    /// unsupported version.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            VaultError::MalformedMetadata(format!("cannot read {}: {err}", path.display()))
        })?;
        let metadata: Self = serde_json::from_str(&contents)
            .map_err(|err| VaultError::MalformedMetadata(err.to_string()))?;

        if metadata.format != FORMAT_MARKER {
            return Err(VaultError::MalformedMetadata(format!(
                "unrecognized format marker {:?}",
                metadata.format
            )));
        }
        if metadata.version != VERSION {
            return Err(VaultError::MalformedMetadata(format!(
                "unsupported wrapper version {}",
                metadata.version
            )));
        }
        Ok(metadata)
    }

    /// Writes the metadata document to `path`.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let contents = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        fs::write(path, contents)
    }

    /// Path of the volume image, relative to the wrapper directory.
    pub fn volume_image(&self) -> &Path {
        &self.volume_image
    }

    /// Path of the user table, relative to the wrapper directory.
    pub fn user_table(&self) -> &Path {
        &self.user_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapper.json");

        let metadata = WrapperMetadata::new("volume.dmg", "users.json");
        metadata.save(&path).unwrap();

        let loaded = WrapperMetadata::load(&path).unwrap();
        assert_eq!(loaded.volume_image(), Path::new("volume.dmg"));
        assert_eq!(loaded.user_table(), Path::new("users.json"));
    }

    #[test]
    fn test_load_rejects_wrong_format_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapper.json");
        fs::write(
            &path,
            br#"{"format": "something-else", "version": 1, "volume_image": "v", "user_table": "u"}"#,
        )
        .unwrap();

        let result = WrapperMetadata::load(&path);
        assert!(matches!(result, Err(VaultError::MalformedMetadata(_))));
    }

    #[test]
    fn test_load_rejects_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapper.json");
        fs::write(
            &path,
            br#"{"format": "encvault-wrapper", "version": 99, "volume_image": "v", "user_table": "u"}"#,
        )
        .unwrap();

        let result = WrapperMetadata::load(&path);
        assert!(matches!(result, Err(VaultError::MalformedMetadata(_))));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapper.json");
        fs::write(&path, b"{{{{").unwrap();

        let result = WrapperMetadata::load(&path);
        assert!(matches!(result, Err(VaultError::MalformedMetadata(_))));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = WrapperMetadata::load(&dir.path().join("wrapper.json"));
        assert!(matches!(result, Err(VaultError::MalformedMetadata(_))));
    }
}
