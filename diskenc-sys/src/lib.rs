// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for disk encryption jobs
//!
//! Everything in this crate is synchronous and talks to the local system
//! directly:
//! - mount table patching ([`FstabPatcher`])
//! - the single-slot pending job record ([`JobStore`])
//! - `cryptsetup` invocation and progress parsing ([`CryptsetupCommand`])
//! - block device resolution
//!
//! These operations require elevated privileges and should only be called
//! from the privileged service, off the async runtime threads.

pub mod cryptsetup;
pub mod device;
pub mod error;
pub mod fstab;
pub mod job_store;

pub use cryptsetup::{CryptsetupCommand, CryptsetupError, parse_progress_line};
pub use device::{parent_dir_exists, resolve_block_device};
pub use error::{Result, SysError};
pub use fstab::{DeviceSpecs, FstabEntry, FstabError, FstabPatch, FstabPatcher, MOUNT_TIMEOUT_OPTION};
pub use job_store::{JobStore, StoreError};
