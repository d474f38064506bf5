// SPDX-License-Identifier: GPL-3.0-only

//! Scripted crypt backend for engine tests

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diskenc_contracts::{BackendError, CryptBackend, ProgressReporter};
use diskenc_types::{ChangePassphraseDescriptor, EncryptDescriptor, PendingJobRecord};
use tokio::sync::Notify;

/// Records every call as `"<method> <device>"` and fails the methods or
/// resume devices it was told to
#[derive(Default)]
pub(crate) struct FakeBackend {
    calls: Mutex<Vec<String>>,
    failing: HashSet<&'static str>,
    failing_resume: HashSet<String>,
    resume_hold: Option<Arc<Notify>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    pub(crate) fn failing_resume(mut self, device: &str) -> Self {
        self.failing_resume.insert(device.to_string());
        self
    }

    /// Make `resume_reencrypt` block until the returned handle is notified
    pub(crate) fn hold_resume(&mut self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.resume_hold = Some(notify.clone());
        notify
    }

    pub(crate) fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, method: &'static str, device: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(format!("{method} {device}"));
        if self.failing.contains(method) {
            return Err(BackendError::failed(method, 1, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CryptBackend for FakeBackend {
    fn supported_key_sizes(&self) -> &[u32] {
        &[256, 512]
    }

    fn supported_ciphers(&self) -> Vec<String> {
        vec!["aes-xts-plain64".to_string()]
    }

    async fn init_header_file(&self, op: &EncryptDescriptor) -> Result<PathBuf, BackendError> {
        self.record("init_header_file", &op.device)?;
        Ok(PathBuf::from(format!("/tmp/{}.header", op.volume)))
    }

    async fn init_header_device(
        &self,
        device: &str,
        _passphrase: &str,
        _header: &Path,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        self.record("init_header_device", device)?;
        progress.report(0.5);
        progress.report(1.0);
        Ok(())
    }

    async fn decrypt_device(
        &self,
        device: &str,
        _passphrase: &str,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        self.record("decrypt_device", device)?;
        progress.report(1.0);
        Ok(())
    }

    async fn change_passphrase(&self, op: &ChangePassphraseDescriptor) -> Result<(), BackendError> {
        self.record("change_passphrase", &op.device)
    }

    async fn resume_reencrypt(
        &self,
        record: &PendingJobRecord,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        self.record("resume_reencrypt", &record.device)?;
        if let Some(hold) = &self.resume_hold {
            hold.notified().await;
        }
        if self.failing_resume.contains(&record.device) {
            return Err(BackendError::failed("resume_reencrypt", 1, "scripted failure"));
        }
        progress.report(1.0);
        Ok(())
    }
}
