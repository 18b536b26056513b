//! File-backed implementation of the DocumentStore trait.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::document::KeyAccessDocument;
use crate::error::{Result, StoreError};
use crate::traits::DocumentStore;

/// A key-access document on disk, typically `.sops.yaml`.
///
/// Saves write a temporary file next to the target and rename it over the
/// target, so readers see either the old or the new document. The target's
/// permissions carry over to the new file; a new document is created
/// world-readable (0644 on unix), like a plain write would.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open the document at `path`. Nothing is read until [`DocumentStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Permissions for the saved file. `None` keeps the temporary file's
    /// owner-only default.
    fn target_permissions(&self) -> Result<Option<std::fs::Permissions>> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => Ok(Some(metadata.permissions())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(new_file_permissions()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl DocumentStore for FileStore {
    fn load(&self) -> Result<KeyAccessDocument> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let document = KeyAccessDocument::parse(&text)?;
        tracing::debug!(
            path = %self.path.display(),
            keys = document.keys().len(),
            rules = document.rules().len(),
            "Loaded key-access document"
        );
        Ok(document)
    }

    fn save(&self, document: &KeyAccessDocument) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        if let Some(permissions) = self.target_permissions()? {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| self.io_error(e))?;
        }
        tmp.write_all(document.to_yaml().as_bytes())
            .map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        tracing::info!(path = %self.path.display(), "Saved key-access document");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<std::fs::Permissions> {
    None
}
