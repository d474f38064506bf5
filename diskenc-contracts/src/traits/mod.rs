// SPDX-License-Identifier: GPL-3.0-only

pub mod backend;
pub mod progress;

pub use backend::{BackendError, CryptBackend};
pub use progress::ProgressReporter;
