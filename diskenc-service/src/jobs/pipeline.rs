// SPDX-License-Identifier: GPL-3.0-only

//! Per-kind job steps
//!
//! Each pipeline is a plain sequence of fallible steps; the first failure
//! ends the job with its mapped [`JobError`]. Earlier successful steps are
//! never undone.

use diskenc_contracts::JobEvent;
use diskenc_sys::{DeviceSpecs, FstabError, FstabPatch, StoreError};
use diskenc_types::{
    ChangePassphraseDescriptor, DecryptDescriptor, EncryptDescriptor, EncryptionRequest,
    JobError, JobKind, OperationDescriptor, PendingJobRecord,
};
use tracing::{debug, error, info, warn};

use crate::jobs::engine::{EngineInner, RESUME_JOB_ID};

pub(crate) async fn run(
    inner: &EngineInner,
    job_id: &str,
    kind: JobKind,
    request: &EncryptionRequest,
) -> Result<(), JobError> {
    if kind == JobKind::Decrypt && request.init_only {
        debug!("Job {}: init-only decrypt has nothing to do", job_id);
        return Ok(());
    }

    let op = inner.validator.validate(kind, request).map_err(|e| {
        warn!("Job {} rejected: {}", job_id, e);
        JobError::InvalidParameters
    })?;
    debug!("Job {} validated for {}: {:?}", job_id, op.device(), op);

    match op {
        OperationDescriptor::PrepareEncrypt(op) if op.init_only => stage(inner, job_id, &op).await,
        OperationDescriptor::PrepareEncrypt(op) => encrypt(inner, &op).await,
        OperationDescriptor::Decrypt(op) => decrypt(inner, &op).await,
        OperationDescriptor::ChangePassphrase(op) => change_passphrase(inner, &op).await,
    }
}

/// Persist the record for boot-time conversion, then keep boot from
/// waiting on the device
async fn stage(inner: &EngineInner, job_id: &str, op: &EncryptDescriptor) -> Result<(), JobError> {
    let record = PendingJobRecord::from_descriptor(op);
    let store = inner.store.clone();
    let written = tokio::task::spawn_blocking(move || store.write_if_absent(&record))
        .await
        .map_err(|e| {
            error!("Job store task failed: {}", e);
            JobError::CannotPersistJob
        })?;

    match written {
        Ok(()) => {}
        Err(StoreError::HasPendingJob { path }) => {
            warn!("Job {}: a conversion is already staged in {}", job_id, path.display());
            return Err(JobError::HasPendingJob);
        }
        Err(e) => {
            error!("Job {}: {}", job_id, e);
            return Err(JobError::CannotPersistJob);
        }
    }

    // The record is durable from here on; a mount table problem does not
    // fail the job.
    let specs = DeviceSpecs::new(&op.device, &op.uuid);
    let patched = {
        let _guard = inner.fstab_lock.lock().await;
        let fstab = inner.fstab.clone();
        tokio::task::spawn_blocking(move || fstab.disable_mount_timeout(&specs)).await
    };

    match patched {
        Ok(Ok(FstabPatch::Applied | FstabPatch::AlreadyPresent)) => {}
        Ok(Err(FstabError::NoMatchingEntry { device })) => {
            info!("{} has no mount table entry, nothing to patch", device);
        }
        Ok(Err(e)) => mount_table_failed(inner, job_id, &op.device, &e.to_string()),
        Err(e) => mount_table_failed(inner, job_id, &op.device, &e.to_string()),
    }

    Ok(())
}

fn mount_table_failed(inner: &EngineInner, job_id: &str, device: &str, reason: &str) {
    warn!("Job {}: cannot patch mount table for {}: {}", job_id, device, reason);
    inner.emit(JobEvent::MountTablePatchFailed {
        job_id: job_id.to_string(),
        device: device.to_string(),
        code: JobError::MountTableOpenFailed.code(),
    });
}

async fn encrypt(inner: &EngineInner, op: &EncryptDescriptor) -> Result<(), JobError> {
    let header = inner.backend.init_header_file(op).await.map_err(|e| {
        error!("Header creation for {} failed: {}", op.device, e);
        JobError::CannotInitHeaderFile
    })?;
    debug!("Header for {} created at {}", op.device, header.display());

    let progress = inner.progress(JobKind::PrepareEncrypt, &op.device);
    inner
        .backend
        .init_header_device(&op.device, &op.passphrase, &header, progress)
        .await
        .map_err(|e| {
            error!(
                "Binding header {} to {} failed: {}",
                header.display(),
                op.device,
                e
            );
            JobError::CannotInitHeaderDevice
        })
}

async fn decrypt(inner: &EngineInner, op: &DecryptDescriptor) -> Result<(), JobError> {
    let progress = inner.progress(JobKind::Decrypt, &op.device);
    inner
        .backend
        .decrypt_device(&op.device, &op.passphrase, progress)
        .await
        .map_err(|e| {
            error!("Decrypting {} failed: {}", op.device, e);
            JobError::DecryptFailed
        })
}

async fn change_passphrase(
    inner: &EngineInner,
    op: &ChangePassphraseDescriptor,
) -> Result<(), JobError> {
    inner.backend.change_passphrase(op).await.map_err(|e| {
        error!("Changing passphrase of {} failed: {}", op.device, e);
        JobError::ChangePassphraseFailed
    })
}

/// Continue every staged conversion; fails if any device did not complete
///
/// One result per device is emitted either way, and the store is emptied
/// at the end whatever the outcome.
pub(crate) async fn resume(
    inner: &EngineInner,
    records: &[PendingJobRecord],
) -> Result<(), JobError> {
    let mut uncompleted = Vec::new();

    for record in records {
        info!("Resuming conversion of {} into {}", record.device, record.volume);
        let progress = inner.progress(JobKind::ResumeReencrypt, &record.device);

        let result = inner
            .backend
            .resume_reencrypt(record, progress)
            .await
            .map_err(|e| {
                error!("Resuming {} failed: {}", record.device, e);
                JobError::ReencryptFailed
            });
        if result.is_err() {
            uncompleted.push(record.device.clone());
        }

        inner.emit(JobEvent::DeviceResult {
            kind: JobKind::ResumeReencrypt,
            job_id: RESUME_JOB_ID.to_string(),
            device: record.device.clone(),
            code: JobError::result_code(result),
        });
    }

    let store = inner.store.clone();
    match tokio::task::spawn_blocking(move || store.clear_all()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to clear job store after resume: {}", e),
        Err(e) => warn!("Job store task failed: {}", e),
    }

    if uncompleted.is_empty() {
        Ok(())
    } else {
        warn!("Conversion not completed for: {}", uncompleted.join(", "));
        Err(JobError::ReencryptFailed)
    }
}
