// SPDX-License-Identifier: GPL-3.0-only

//! Job engine - identity, dispatch and result reporting
//!
//! Every accepted request becomes a [`Job`] in the registry and runs on its
//! own task. Steps inside a job are strictly sequential; the only
//! cross-job serialization point is the job store's single slot (plus a lock
//! around mount table edits). Outcomes leave the engine as [`JobEvent`]s on a
//! broadcast channel, which the D-Bus layer turns into signals.

use std::collections::HashMap;
use std::sync::Arc;

use diskenc_contracts::{CryptBackend, JobEvent, ProgressReporter};
use diskenc_sys::{FstabPatcher, JobStore};
use diskenc_types::{
    CallerInfo, EncryptionRequest, Job, JobError, JobKind, JobSummary, PendingJobRecord,
};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};
use crate::jobs::pipeline;
use crate::policies::{ParameterValidator, ValidationError};

/// Id of the boot-time resume job
pub const RESUME_JOB_ID: &str = "";

const EVENT_CAPACITY: usize = 256;

pub(crate) struct EngineInner {
    pub(crate) backend: Arc<dyn CryptBackend>,
    pub(crate) store: JobStore,
    pub(crate) fstab: FstabPatcher,
    pub(crate) validator: ParameterValidator,
    /// Serializes mount table edits across jobs
    pub(crate) fstab_lock: Mutex<()>,
    jobs: Mutex<HashMap<String, Job>>,
    events: broadcast::Sender<JobEvent>,
    /// `false` while the resume job runs; new jobs wait in `Created`
    ready: watch::Sender<bool>,
}

impl EngineInner {
    pub(crate) fn emit(&self, event: JobEvent) {
        // No subscribers is fine; events are best-effort.
        let _ = self.events.send(event);
    }

    /// Reporter that forwards fractions for `device` as progress events
    pub(crate) fn progress(&self, kind: JobKind, device: &str) -> ProgressReporter {
        let events = self.events.clone();
        let device = device.to_string();
        ProgressReporter::new(move |fraction| {
            let _ = events.send(JobEvent::Progress {
                kind,
                device: device.clone(),
                fraction,
            });
        })
    }
}

#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl JobEngine {
    pub fn new(
        backend: Arc<dyn CryptBackend>,
        store: JobStore,
        fstab: FstabPatcher,
        validator: ParameterValidator,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (ready, _) = watch::channel(true);

        Self {
            inner: Arc::new(EngineInner {
                backend,
                store,
                fstab,
                validator,
                fstab_lock: Mutex::new(()),
                jobs: Mutex::new(HashMap::new()),
                events,
                ready,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn backend(&self) -> &Arc<dyn CryptBackend> {
        &self.inner.backend
    }

    /// Accept a request and return its job id
    ///
    /// Requests that failed to decode still get a job, which fails with
    /// `InvalidParameters` on its result notification.
    pub async fn submit(
        &self,
        kind: JobKind,
        request: std::result::Result<EncryptionRequest, ValidationError>,
        caller: &CallerInfo,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let device = request
            .as_ref()
            .map(|r| r.device_or_empty().to_string())
            .unwrap_or_default();

        info!(
            "Accepted {} job {} for '{}' from {}",
            kind,
            id,
            device,
            caller.display_name()
        );

        self.inner
            .jobs
            .lock()
            .await
            .insert(id.clone(), Job::new(id.clone(), kind, device));

        let engine = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            engine.wait_until_ready().await;
            engine.mark_running(&job_id).await;

            let result = match request {
                Ok(request) => pipeline::run(&engine.inner, &job_id, kind, &request).await,
                Err(e) => {
                    warn!("Job {} rejected: {}", job_id, e);
                    Err(JobError::InvalidParameters)
                }
            };

            engine.complete(&job_id, result).await;
        });

        id
    }

    /// Keep newly submitted jobs in `Created` until the next resume job
    /// finishes
    ///
    /// Must be called before requests can reach the engine; `start_resume`
    /// reopens the gate when it completes.
    pub fn hold_for_resume(&self) {
        self.inner.ready.send_replace(false);
    }

    /// Start the singleton resume job
    ///
    /// Jobs submitted before the returned task finishes are held in
    /// `Created` and dispatched afterwards.
    pub fn start_resume(&self) -> JoinHandle<std::result::Result<(), JobError>> {
        self.hold_for_resume();

        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.resume_pending().await;
            engine.inner.ready.send_replace(true);
            result
        })
    }

    async fn resume_pending(&self) -> std::result::Result<(), JobError> {
        let store = self.inner.store.clone();
        let records = match tokio::task::spawn_blocking(move || store.read_all()).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                error!("Cannot read pending job record: {}", e);
                let store = self.inner.store.clone();
                if let Ok(Err(e)) = tokio::task::spawn_blocking(move || store.clear_all()).await {
                    warn!("Failed to clear job store: {}", e);
                }
                return self.fail_resume().await;
            }
            Err(e) => {
                error!("Job store task failed: {}", e);
                return self.fail_resume().await;
            }
        };

        if records.is_empty() {
            debug!("No pending job to resume");
            return Ok(());
        }

        self.run_resume(records).await
    }

    async fn run_resume(&self, records: Vec<PendingJobRecord>) -> std::result::Result<(), JobError> {
        info!("Resuming {} staged conversion(s)", records.len());

        self.begin_resume().await;
        let result = pipeline::resume(&self.inner, &records).await;
        self.complete(RESUME_JOB_ID, result).await;
        result
    }

    /// Report the resume job as failed when the staged record is unusable
    async fn fail_resume(&self) -> std::result::Result<(), JobError> {
        let result = Err(JobError::ReencryptFailed);
        self.begin_resume().await;
        self.complete(RESUME_JOB_ID, result).await;
        result
    }

    async fn begin_resume(&self) {
        self.inner.jobs.lock().await.insert(
            RESUME_JOB_ID.to_string(),
            Job::new(RESUME_JOB_ID, JobKind::ResumeReencrypt, ""),
        );
        self.mark_running(RESUME_JOB_ID).await;
    }

    async fn wait_until_ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        if ready.wait_for(|ready| *ready).await.is_err() {
            warn!("Resume gate closed unexpectedly");
        }
    }

    async fn mark_running(&self, id: &str) {
        let mut jobs = self.inner.jobs.lock().await;
        if let Some(job) = jobs.get_mut(id) {
            if let Err(e) = job.start() {
                error!("Job {}: {}", id, e);
            }
        }
    }

    /// Record the terminal state, notify and forget the job
    async fn complete(&self, id: &str, result: std::result::Result<(), JobError>) {
        let Some(mut job) = self.inner.jobs.lock().await.remove(id) else {
            error!("Job {} vanished before completion", id);
            return;
        };

        if let Err(e) = job.finish(result) {
            error!("Job {}: {}", id, e);
        }
        let code = job
            .exit_code()
            .unwrap_or_else(|| JobError::result_code(result));

        match result {
            Ok(()) => info!("{} job {} for '{}' succeeded", job.kind(), id, job.device()),
            Err(e) => error!(
                "{} job {} for '{}' failed: {} (code {})",
                job.kind(),
                id,
                job.device(),
                e,
                e.code()
            ),
        }

        self.inner.emit(JobEvent::Finished {
            kind: job.kind(),
            job_id: id.to_string(),
            device: job.device().to_string(),
            code,
        });
    }

    /// Jobs that have not reached a terminal state
    pub async fn active_jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<_> = self
            .inner
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| !job.state().is_terminal())
            .map(Job::summary)
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub async fn has_pending_job(&self) -> Result<bool> {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.has_pending())
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(ServiceError::from)
    }

    /// Device of the staged conversion, if any
    pub async fn pending_device(&self) -> Result<Option<String>> {
        let store = self.inner.store.clone();
        let record = tokio::task::spawn_blocking(move || store.pending())
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))??;
        Ok(record.map(|r| r.device))
    }
}
