// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Result;
use diskenc_contracts::JobEvent;
use diskenc_types::JobKind;
use tokio::sync::broadcast::error::RecvError;
use zbus::object_server::SignalEmitter;

use crate::handlers::DiskEncryptHandler;
use crate::jobs::JobEngine;

/// D-Bus signal a job event is published as
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JobSignal {
    PrepareEncryptDiskResult {
        device: String,
        job_id: String,
        code: i32,
    },
    DecryptDiskResult {
        device: String,
        job_id: String,
        code: i32,
    },
    ChangePassphraseResult {
        device: String,
        job_id: String,
        code: i32,
    },
    ReencryptResult {
        job_id: String,
        code: i32,
    },
    MountTablePatchFailed {
        device: String,
        job_id: String,
        code: i32,
    },
    EncryptProgress {
        device: String,
        fraction: f64,
    },
    DecryptProgress {
        device: String,
        fraction: f64,
    },
}

/// Map an engine event to its signal; passphrase changes have no progress
pub(crate) fn signal_for(event: JobEvent) -> Option<JobSignal> {
    let signal = match event {
        JobEvent::Progress {
            kind: JobKind::Decrypt,
            device,
            fraction,
        } => JobSignal::DecryptProgress { device, fraction },
        JobEvent::Progress {
            kind: JobKind::PrepareEncrypt | JobKind::ResumeReencrypt,
            device,
            fraction,
        } => JobSignal::EncryptProgress { device, fraction },
        JobEvent::Progress {
            kind: JobKind::ChangePassphrase,
            ..
        } => return None,

        // Resume reports each device the way a prepare job would
        JobEvent::DeviceResult {
            job_id,
            device,
            code,
            ..
        } => JobSignal::PrepareEncryptDiskResult {
            device,
            job_id,
            code,
        },

        JobEvent::Finished {
            kind,
            job_id,
            device,
            code,
        } => match kind {
            JobKind::PrepareEncrypt => JobSignal::PrepareEncryptDiskResult {
                device,
                job_id,
                code,
            },
            JobKind::Decrypt => JobSignal::DecryptDiskResult {
                device,
                job_id,
                code,
            },
            JobKind::ChangePassphrase => JobSignal::ChangePassphraseResult {
                device,
                job_id,
                code,
            },
            JobKind::ResumeReencrypt => JobSignal::ReencryptResult { job_id, code },
        },

        JobEvent::MountTablePatchFailed {
            job_id,
            device,
            code,
        } => JobSignal::MountTablePatchFailed {
            device,
            job_id,
            code,
        },
    };
    Some(signal)
}

/// Forward engine events to D-Bus signals on `object_path`
///
/// Subscribes before returning, so events emitted afterwards are not missed.
pub(crate) async fn forward_job_events(
    connection: zbus::Connection,
    object_path: &str,
    engine: &JobEngine,
) -> Result<()> {
    let iface_ref = connection
        .object_server()
        .interface::<_, DiskEncryptHandler>(object_path)
        .await?;
    let mut events = engine.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(signal) = signal_for(event) else {
                        continue;
                    };
                    if let Err(e) = emit(iface_ref.signal_emitter(), &signal).await {
                        tracing::error!("Failed to emit {:?}: {}", signal, e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Signal forwarder lagged, {} job events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Job event channel closed");
    });

    tracing::info!("Job signal forwarding started");
    Ok(())
}

async fn emit(emitter: &SignalEmitter<'_>, signal: &JobSignal) -> zbus::Result<()> {
    match signal {
        JobSignal::PrepareEncryptDiskResult {
            device,
            job_id,
            code,
        } => DiskEncryptHandler::prepare_encrypt_disk_result(emitter, device, job_id, *code).await,
        JobSignal::DecryptDiskResult {
            device,
            job_id,
            code,
        } => DiskEncryptHandler::decrypt_disk_result(emitter, device, job_id, *code).await,
        JobSignal::ChangePassphraseResult {
            device,
            job_id,
            code,
        } => DiskEncryptHandler::change_passphrase_result(emitter, device, job_id, *code).await,
        JobSignal::ReencryptResult { job_id, code } => {
            DiskEncryptHandler::reencrypt_result(emitter, job_id, *code).await
        }
        JobSignal::MountTablePatchFailed {
            device,
            job_id,
            code,
        } => DiskEncryptHandler::mount_table_patch_failed(emitter, device, job_id, *code).await,
        JobSignal::EncryptProgress { device, fraction } => {
            DiskEncryptHandler::encrypt_progress(emitter, device, *fraction).await
        }
        JobSignal::DecryptProgress { device, fraction } => {
            DiskEncryptHandler::decrypt_progress(emitter, device, *fraction).await
        }
    }
}

#[cfg(test)]
mod tests {
    use diskenc_types::JobError;

    use super::*;

    fn progress(kind: JobKind) -> JobEvent {
        JobEvent::Progress {
            kind,
            device: "/dev/sda1".to_string(),
            fraction: 0.5,
        }
    }

    fn finished(kind: JobKind, job_id: &str, code: i32) -> JobEvent {
        JobEvent::Finished {
            kind,
            job_id: job_id.to_string(),
            device: "/dev/sda1".to_string(),
            code,
        }
    }

    #[test]
    fn resume_device_results_use_prepare_signal_with_empty_id() {
        let event = JobEvent::DeviceResult {
            kind: JobKind::ResumeReencrypt,
            job_id: String::new(),
            device: "/dev/sdb1".to_string(),
            code: JobError::ReencryptFailed.code(),
        };
        assert_eq!(
            signal_for(event),
            Some(JobSignal::PrepareEncryptDiskResult {
                device: "/dev/sdb1".to_string(),
                job_id: String::new(),
                code: JobError::ReencryptFailed.code(),
            })
        );
    }

    #[test]
    fn finished_jobs_map_to_their_result_signal() {
        assert_eq!(
            signal_for(finished(JobKind::ResumeReencrypt, "", 8)),
            Some(JobSignal::ReencryptResult {
                job_id: String::new(),
                code: 8,
            })
        );
        assert_eq!(
            signal_for(finished(JobKind::PrepareEncrypt, "job-1", 0)),
            Some(JobSignal::PrepareEncryptDiskResult {
                device: "/dev/sda1".to_string(),
                job_id: "job-1".to_string(),
                code: 0,
            })
        );
        assert_eq!(
            signal_for(finished(JobKind::Decrypt, "job-2", 6)),
            Some(JobSignal::DecryptDiskResult {
                device: "/dev/sda1".to_string(),
                job_id: "job-2".to_string(),
                code: 6,
            })
        );
        assert_eq!(
            signal_for(finished(JobKind::ChangePassphrase, "job-3", 0)),
            Some(JobSignal::ChangePassphraseResult {
                device: "/dev/sda1".to_string(),
                job_id: "job-3".to_string(),
                code: 0,
            })
        );
    }

    #[test]
    fn progress_follows_the_conversion_direction() {
        let encrypt = Some(JobSignal::EncryptProgress {
            device: "/dev/sda1".to_string(),
            fraction: 0.5,
        });
        assert_eq!(signal_for(progress(JobKind::PrepareEncrypt)), encrypt);
        assert_eq!(signal_for(progress(JobKind::ResumeReencrypt)), encrypt);
        assert_eq!(
            signal_for(progress(JobKind::Decrypt)),
            Some(JobSignal::DecryptProgress {
                device: "/dev/sda1".to_string(),
                fraction: 0.5,
            })
        );
        assert_eq!(signal_for(progress(JobKind::ChangePassphrase)), None);
    }

    #[test]
    fn mount_table_failures_keep_job_id() {
        let event = JobEvent::MountTablePatchFailed {
            job_id: "job-4".to_string(),
            device: "/dev/sda1".to_string(),
            code: JobError::MountTableOpenFailed.code(),
        };
        assert_eq!(
            signal_for(event),
            Some(JobSignal::MountTablePatchFailed {
                device: "/dev/sda1".to_string(),
                job_id: "job-4".to_string(),
                code: JobError::MountTableOpenFailed.code(),
            })
        );
    }
}
