//! JSON-file gallery of named face embeddings.
//!
//! The whole file is read on every lookup and rewritten on every append.
//! There is no locking: concurrent writers race.

use crate::types::GalleryEntry;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gallery file {} is not a valid entry list: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Handle to a gallery file on disk. The file itself is created lazily.
#[derive(Debug, Clone)]
pub struct Gallery {
    path: PathBuf,
}

impl Gallery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Gallery stored as `file_name` inside `dir`.
    pub fn in_dir(dir: &Path, file_name: &str) -> Self {
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read every entry in file order.
    ///
    /// A missing or zero-length file is an empty gallery.
    pub fn load(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| self.io_err(source))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| GalleryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Append one entry, rewriting the whole file.
    ///
    /// Creates the parent directory and the file on first use.
    pub fn append(&self, entry: GalleryEntry) -> Result<(), GalleryError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| self.io_err(source))?;
        }

        let mut entries = self.load()?;
        entries.push(entry);

        let file = fs::File::create(&self.path).map_err(|source| self.io_err(source))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &entries).map_err(|source| GalleryError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        writer.flush().map_err(|source| self.io_err(source))?;

        tracing::info!(
            path = %self.path.display(),
            entries = entries.len(),
            "gallery updated"
        );
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> GalleryError {
        GalleryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
