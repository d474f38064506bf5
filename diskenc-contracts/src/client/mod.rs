// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus client wrappers for the disk encryption service

pub mod connection;
pub mod disk_encrypt;
pub mod error;

pub use disk_encrypt::{DiskEncryptClient, DiskEncryptInterfaceProxy};
pub use error::ClientError;
