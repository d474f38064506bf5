// SPDX-License-Identifier: GPL-3.0-only

//! Job identity, state machine and result codes

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    PrepareEncrypt,
    Decrypt,
    ChangePassphrase,
    ResumeReencrypt,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrepareEncrypt => write!(f, "prepare_encrypt"),
            Self::Decrypt => write!(f, "decrypt"),
            Self::ChangePassphrase => write!(f, "change_passphrase"),
            Self::ResumeReencrypt => write!(f, "resume_reencrypt"),
        }
    }
}

/// Terminal failure of a job
///
/// Carried on result notifications as a numeric code; `0` means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobError {
    #[error("invalid parameters")]
    InvalidParameters,

    #[error("another encryption job is already pending")]
    HasPendingJob,

    #[error("cannot persist job record")]
    CannotPersistJob,

    #[error("cannot initialize encryption header file")]
    CannotInitHeaderFile,

    #[error("cannot bind encryption header to device")]
    CannotInitHeaderDevice,

    #[error("decrypting device failed")]
    DecryptFailed,

    #[error("changing passphrase failed")]
    ChangePassphraseFailed,

    #[error("resuming reencryption failed")]
    ReencryptFailed,

    #[error("cannot open mount table")]
    MountTableOpenFailed,
}

impl JobError {
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidParameters => 1,
            Self::HasPendingJob => 2,
            Self::CannotPersistJob => 3,
            Self::CannotInitHeaderFile => 4,
            Self::CannotInitHeaderDevice => 5,
            Self::DecryptFailed => 6,
            Self::ChangePassphraseFailed => 7,
            Self::ReencryptFailed => 8,
            Self::MountTableOpenFailed => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::InvalidParameters),
            2 => Some(Self::HasPendingJob),
            3 => Some(Self::CannotPersistJob),
            4 => Some(Self::CannotInitHeaderFile),
            5 => Some(Self::CannotInitHeaderDevice),
            6 => Some(Self::DecryptFailed),
            7 => Some(Self::ChangePassphraseFailed),
            8 => Some(Self::ReencryptFailed),
            9 => Some(Self::MountTableOpenFailed),
            _ => None,
        }
    }

    /// Wire code of a job outcome
    pub fn result_code(result: Result<(), JobError>) -> i32 {
        match result {
            Ok(()) => 0,
            Err(err) => err.code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum JobState {
    Created,
    Running,
    Succeeded,
    Failed(JobError),
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job state transition: {from:?} -> {to:?}")]
pub struct StateTransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// Runtime-only unit of asynchronous work
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    kind: JobKind,
    device: String,
    state: JobState,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, device: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            device: device.into(),
            state: JobState::Created,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// `Created -> Running`
    pub fn start(&mut self) -> Result<(), StateTransitionError> {
        self.transition(JobState::Running)
    }

    /// `Running -> Succeeded | Failed`
    pub fn finish(&mut self, result: Result<(), JobError>) -> Result<(), StateTransitionError> {
        let next = match result {
            Ok(()) => JobState::Succeeded,
            Err(err) => JobState::Failed(err),
        };
        self.transition(next)
    }

    /// Exit code once terminal, `None` while the job is still in flight
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            JobState::Succeeded => Some(0),
            JobState::Failed(err) => Some(err.code()),
            JobState::Created | JobState::Running => None,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            kind: self.kind,
            device: self.device.clone(),
            state: self.state,
        }
    }

    fn transition(&mut self, to: JobState) -> Result<(), StateTransitionError> {
        let allowed = matches!(
            (self.state, to),
            (JobState::Created, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed(_))
        );
        if !allowed {
            return Err(StateTransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Serializable snapshot of a job for read-only queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub kind: JobKind,
    pub device: String,
    #[serde(flatten)]
    pub state: JobState,
}
