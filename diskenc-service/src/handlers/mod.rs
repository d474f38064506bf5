// SPDX-License-Identifier: GPL-3.0-only

pub mod disk_encrypt;
mod signals;

pub use disk_encrypt::DiskEncryptHandler;
pub(crate) use signals::forward_job_events;
