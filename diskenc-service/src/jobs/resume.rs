// SPDX-License-Identifier: GPL-3.0-only

use diskenc_types::JobError;
use tokio::task::JoinHandle;
use tracing::info;

use crate::jobs::JobEngine;

/// Continues a conversion staged before the last shutdown
///
/// Runs once at startup. Results surface through the engine's regular
/// notifications with the empty job id.
pub struct ResumeCoordinator {
    engine: JobEngine,
    enabled: bool,
}

impl ResumeCoordinator {
    /// When enabled, the engine stops dispatching new jobs right away and
    /// resumes dispatch once the job started by [`start`](Self::start) ends
    pub fn new(engine: JobEngine, enabled: bool) -> Self {
        if enabled {
            engine.hold_for_resume();
        }
        Self { engine, enabled }
    }

    /// Start the resume job
    ///
    /// Returns `None` when resuming is disabled by configuration.
    pub fn start(self) -> Option<JoinHandle<Result<(), JobError>>> {
        if !self.enabled {
            info!("Boot-time resume disabled by configuration");
            return None;
        }
        Some(self.engine.start_resume())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use diskenc_contracts::JobEvent;
    use diskenc_sys::{FstabPatcher, JobStore};
    use diskenc_types::{CallerInfo, EncryptMode, EncryptionRequest, JobKind, PendingJobRecord};

    use super::*;
    use crate::jobs::testing::FakeBackend;
    use crate::policies::ParameterValidator;
    use crate::policies::validator::tests::FakeProbe;

    fn engine(dir: &std::path::Path, backend: Arc<FakeBackend>) -> JobEngine {
        JobEngine::new(
            backend,
            JobStore::new(dir.join("usec-crypt"), "encrypt.json"),
            FstabPatcher::new(dir.join("fstab")),
            ParameterValidator::new(Arc::new(FakeProbe), &[256, 512]),
        )
    }

    fn staged(dir: &std::path::Path) -> JobStore {
        let store = JobStore::new(dir.join("usec-crypt"), "encrypt.json");
        store
            .write_if_absent(&PendingJobRecord {
                device: "/dev/sdc1".to_string(),
                volume: "dm-sdc1".to_string(),
                cipher: "aes-xts-plain64".to_string(),
                passphrase: "hunter2".to_string(),
                key_size: 256,
                mode: EncryptMode::Passphrase,
                tpm_token: String::new(),
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn disabled_coordinator_leaves_store_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = staged(dir.path());
        let backend = Arc::new(FakeBackend::new());

        let coordinator = ResumeCoordinator::new(engine(dir.path(), backend.clone()), false);
        assert!(coordinator.start().is_none());
        assert!(backend.take_calls().is_empty());
        assert!(store.has_pending().unwrap());
    }

    #[tokio::test]
    async fn enabled_coordinator_resumes_staged_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = staged(dir.path());
        let backend = Arc::new(FakeBackend::new());

        let coordinator = ResumeCoordinator::new(engine(dir.path(), backend.clone()), true);
        let handle = coordinator.start().expect("resume enabled");
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(backend.take_calls(), vec!["resume_reencrypt /dev/sdc1"]);
        assert!(!store.has_pending().unwrap());
    }

    #[tokio::test]
    async fn requests_before_start_wait_for_resume() {
        let dir = tempfile::tempdir().unwrap();
        staged(dir.path());
        let backend = Arc::new(FakeBackend::new());
        let engine = engine(dir.path(), backend.clone());
        let mut rx = engine.subscribe();

        let coordinator = ResumeCoordinator::new(engine.clone(), true);
        let request = EncryptionRequest {
            device: Some("/dev/sdc1".to_string()),
            passphrase: Some("hunter2".to_string()),
            ..Default::default()
        };
        let caller = CallerInfo::new(1000, None, ":1.7".to_string());
        let id = engine.submit(JobKind::Decrypt, Ok(request), &caller).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(backend.take_calls().is_empty());

        coordinator.start().expect("resume enabled").await.unwrap().unwrap();
        loop {
            if let JobEvent::Finished { job_id, code, .. } = rx.recv().await.unwrap() {
                if job_id == id {
                    assert_eq!(code, 0);
                    break;
                }
            }
        }
        assert_eq!(
            backend.take_calls(),
            vec!["resume_reencrypt /dev/sdc1", "decrypt_device /dev/sdc1"]
        );
    }
}
