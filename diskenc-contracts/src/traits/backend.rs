// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use diskenc_types::{ChangePassphraseDescriptor, DEFAULT_KEY_SIZE, EncryptDescriptor, PendingJobRecord};

use super::ProgressReporter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend ran and reported a non-zero status
    #[error("{operation} failed with status {status}: {message}")]
    Failed {
        operation: &'static str,
        status: i32,
        message: String,
    },

    /// The backend could not be invoked at all
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl BackendError {
    pub fn failed(operation: &'static str, status: i32, message: impl Into<String>) -> Self {
        Self::Failed {
            operation,
            status,
            message: message.into(),
        }
    }
}

/// Block-encryption subsystem driven by the job engine
///
/// Every method performs one step of a job and either succeeds or reports a
/// failure; the engine decides what a failure means for the job. Calls are
/// never retried and a step never undoes an earlier step.
#[async_trait]
pub trait CryptBackend: Send + Sync {
    /// Key sizes (bits) a request may select
    fn supported_key_sizes(&self) -> &[u32] {
        &[DEFAULT_KEY_SIZE]
    }

    /// Cipher names advertised to clients
    fn supported_ciphers(&self) -> Vec<String>;

    /// Create the local detached header for a device and return its path
    async fn init_header_file(&self, op: &EncryptDescriptor) -> Result<PathBuf, BackendError>;

    /// Bind a previously created header to its device
    async fn init_header_device(
        &self,
        device: &str,
        passphrase: &str,
        header: &Path,
        progress: ProgressReporter,
    ) -> Result<(), BackendError>;

    async fn decrypt_device(
        &self,
        device: &str,
        passphrase: &str,
        progress: ProgressReporter,
    ) -> Result<(), BackendError>;

    async fn change_passphrase(&self, op: &ChangePassphraseDescriptor) -> Result<(), BackendError>;

    /// Continue an interrupted conversion of `record.device` into `record.volume`
    async fn resume_reencrypt(
        &self,
        record: &PendingJobRecord,
        progress: ProgressReporter,
    ) -> Result<(), BackendError>;
}
