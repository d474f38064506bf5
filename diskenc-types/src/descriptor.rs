// SPDX-License-Identifier: GPL-3.0-only

//! Validated operation descriptors
//!
//! One variant per job kind, each carrying only the fields its pipeline
//! needs. Descriptors are only built by the service's validator, so holding
//! one means every required field is present.

use std::fmt;

use crate::request::EncryptMode;

/// Key size used unless a request overrides it
pub const DEFAULT_KEY_SIZE: u32 = 256;

/// Device-mapper name for a device under conversion (`/dev/sda1` -> `dm-sda1`)
pub fn volume_name_for(device: &str) -> String {
    let name = device.strip_prefix("/dev/").unwrap_or(device);
    format!("dm-{}", name.replace('/', "_"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationDescriptor {
    PrepareEncrypt(EncryptDescriptor),
    Decrypt(DecryptDescriptor),
    ChangePassphrase(ChangePassphraseDescriptor),
}

impl OperationDescriptor {
    pub fn device(&self) -> &str {
        match self {
            Self::PrepareEncrypt(op) => &op.device,
            Self::Decrypt(op) => &op.device,
            Self::ChangePassphrase(op) => &op.device,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct EncryptDescriptor {
    pub device: String,
    /// Filesystem UUID, empty when the caller did not supply one
    pub uuid: String,
    pub volume: String,
    pub cipher: String,
    pub passphrase: String,
    pub key_size: u32,
    pub mode: EncryptMode,
    /// Opaque TPM binding blob, empty for passphrase mode
    pub tpm_token: String,
    pub recovery_export_path: Option<String>,
    pub init_only: bool,
}

impl fmt::Debug for EncryptDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptDescriptor")
            .field("device", &self.device)
            .field("uuid", &self.uuid)
            .field("volume", &self.volume)
            .field("cipher", &self.cipher)
            .field("passphrase", &"<redacted>")
            .field("key_size", &self.key_size)
            .field("mode", &self.mode)
            .field("tpm_token", &(!self.tpm_token.is_empty()))
            .field("recovery_export_path", &self.recovery_export_path)
            .field("init_only", &self.init_only)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DecryptDescriptor {
    pub device: String,
    pub passphrase: String,
}

impl fmt::Debug for DecryptDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptDescriptor")
            .field("device", &self.device)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ChangePassphraseDescriptor {
    pub device: String,
    pub old_passphrase: String,
    pub new_passphrase: String,
    /// The old secret is a recovery key rather than the current passphrase
    pub validate_with_recovery_key: bool,
}

impl fmt::Debug for ChangePassphraseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePassphraseDescriptor")
            .field("device", &self.device)
            .field("old_passphrase", &"<redacted>")
            .field("new_passphrase", &"<redacted>")
            .field("validate_with_recovery_key", &self.validate_with_recovery_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_name_strips_dev_prefix() {
        assert_eq!(volume_name_for("/dev/sda1"), "dm-sda1");
        assert_eq!(volume_name_for("/dev/nvme0n1p3"), "dm-nvme0n1p3");
        assert_eq!(volume_name_for("/dev/mapper/vg-home"), "dm-mapper_vg-home");
    }

    #[test]
    fn debug_output_hides_passphrase() {
        let op = EncryptDescriptor {
            device: "/dev/sda1".to_string(),
            uuid: String::new(),
            volume: "dm-sda1".to_string(),
            cipher: "aes".to_string(),
            passphrase: "secret".to_string(),
            key_size: DEFAULT_KEY_SIZE,
            mode: EncryptMode::Passphrase,
            tpm_token: String::new(),
            recovery_export_path: None,
            init_only: true,
        };
        let debug = format!("{op:?}");
        assert!(debug.contains("/dev/sda1"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn every_kind_exposes_its_device() {
        let decrypt = OperationDescriptor::Decrypt(DecryptDescriptor {
            device: "/dev/sdb2".to_string(),
            passphrase: "secret".to_string(),
        });
        let change = OperationDescriptor::ChangePassphrase(ChangePassphraseDescriptor {
            device: "/dev/sdc3".to_string(),
            old_passphrase: "old".to_string(),
            new_passphrase: "new".to_string(),
            validate_with_recovery_key: false,
        });
        assert_eq!(decrypt.device(), "/dev/sdb2");
        assert_eq!(change.device(), "/dev/sdc3");
    }
}
