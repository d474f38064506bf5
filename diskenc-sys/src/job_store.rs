// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot store for the pending job record
//!
//! The slot is one file under a privileged directory; its presence is the
//! "a conversion is staged" flag read by the boot-time helper. Writers and
//! readers take an exclusive `flock` on a sibling lock file, so the
//! at-most-one invariant holds across threads and processes.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use diskenc_types::PendingJobRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a job is already pending in {path}")]
    HasPendingJob { path: PathBuf },

    #[error("failed to serialize job record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("job record {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock {path}: {errno}")]
    Lock { path: PathBuf, errno: nix::Error },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
    file_name: String,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.lock", self.file_name))
    }

    /// Block until this process holds the store lock; released on drop
    fn lock(&self) -> Result<Flock<File>, StoreError> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(io_error(&path))?;

        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| StoreError::Lock { path, errno })
    }

    /// Persist `record` unless a record already exists
    ///
    /// The record is serialized before anything touches disk, then written
    /// to a temporary file, flushed and linked into place without
    /// overwriting.
    pub fn write_if_absent(&self, record: &PendingJobRecord) -> Result<(), StoreError> {
        let bytes = record.to_json().map_err(StoreError::Serialize)?;

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let _lock = self.lock()?;

        let path = self.record_path();
        if path.exists() {
            return Err(StoreError::HasPendingJob { path });
        }

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_error(&self.dir))?;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(io_error(tmp.path()))?;
        tmp.write_all(&bytes).map_err(io_error(&path))?;
        tmp.as_file().sync_all().map_err(io_error(&path))?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::HasPendingJob { path });
            }
            Err(e) => return Err(io_error(&path)(e.error)),
        }

        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        info!("Staged pending job for {} in {}", record.device, path.display());
        Ok(())
    }

    /// All pending records; the slot holds zero or one
    pub fn read_all(&self) -> Result<Vec<PendingJobRecord>, StoreError> {
        Ok(self.pending()?.into_iter().collect())
    }

    pub fn pending(&self) -> Result<Option<PendingJobRecord>, StoreError> {
        if !self.dir.is_dir() {
            return Ok(None);
        }
        let _lock = self.lock()?;

        let path = self.record_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };

        PendingJobRecord::from_json(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    pub fn has_pending(&self) -> Result<bool, StoreError> {
        if !self.dir.is_dir() {
            return Ok(false);
        }
        let _lock = self.lock()?;
        Ok(self.record_path().exists())
    }

    /// Remove the record; an empty slot is not an error
    pub fn clear_all(&self) -> Result<(), StoreError> {
        if !self.dir.is_dir() {
            return Ok(());
        }
        let _lock = self.lock()?;

        let path = self.record_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Cleared pending job record {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}
