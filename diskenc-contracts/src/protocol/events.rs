// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use diskenc_types::JobKind;

/// Notification emitted by the job engine
///
/// The service forwards these to D-Bus signals. Resume notifications carry
/// an empty `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum JobEvent {
    Progress {
        kind: JobKind,
        device: String,
        fraction: f64,
    },

    /// Outcome for one device of a multi-device job
    DeviceResult {
        kind: JobKind,
        job_id: String,
        device: String,
        code: i32,
    },

    /// Terminal result of a job
    Finished {
        kind: JobKind,
        job_id: String,
        device: String,
        code: i32,
    },

    /// Mount table could not be patched after the job record was persisted
    MountTablePatchFailed {
        job_id: String,
        device: String,
        code: i32,
    },
}
