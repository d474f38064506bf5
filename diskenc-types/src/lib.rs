// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for COSMIC Ext disk encryption
//!
//! This crate defines the types shared by every layer of the stack:
//!
//! - **diskenc-sys**: persists [`PendingJobRecord`] and reads the mount table
//! - **diskenc-service**: validates [`EncryptionRequest`] into an
//!   [`OperationDescriptor`] and tracks [`Job`] state
//! - **clients**: decode result codes through [`JobError::from_code`]
//!
//! ## Job lifecycle
//!
//! A request becomes a [`Job`] in [`JobState::Created`], is dispatched to
//! [`JobState::Running`] and ends in either [`JobState::Succeeded`] or
//! [`JobState::Failed`]. Terminal states are final.

pub mod caller;
pub mod descriptor;
pub mod job;
pub mod record;
pub mod request;

pub use caller::CallerInfo;
pub use descriptor::{
    ChangePassphraseDescriptor, DEFAULT_KEY_SIZE, DecryptDescriptor, EncryptDescriptor,
    OperationDescriptor, volume_name_for,
};
pub use job::{Job, JobError, JobKind, JobState, JobSummary, StateTransitionError};
pub use record::PendingJobRecord;
pub use request::{EncryptMode, EncryptionRequest, param_keys};
