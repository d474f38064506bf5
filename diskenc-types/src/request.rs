// SPDX-License-Identifier: GPL-3.0-only

//! Encryption requests as submitted by clients
//!
//! A request is the raw, unvalidated input of one call. It is never
//! persisted; the service turns it into an [`crate::OperationDescriptor`]
//! before anything touches the disk.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Keys of the `a{sv}` parameter map accepted by the D-Bus methods
pub mod param_keys {
    pub const DEVICE: &str = "device";
    pub const UUID: &str = "uuid";
    pub const MODE: &str = "mode";
    pub const PASSPHRASE: &str = "passphrase";
    pub const OLD_PASSPHRASE: &str = "oldPassphrase";
    pub const CIPHER: &str = "cipher";
    pub const RECOVERY_EXPORT_PATH: &str = "exportRecKeyTo";
    pub const INIT_PARAMS_ONLY: &str = "initParamsOnly";
    pub const TPM_CONFIG: &str = "tpmConfig";
    pub const VALIDATE_WITH_RECOVERY_KEY: &str = "usingRecKey";
    pub const KEY_SIZE: &str = "keySize";
}

/// How the volume key is protected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptMode {
    /// Passphrase only
    #[default]
    #[serde(rename = "pin")]
    Passphrase,

    /// Passphrase sealed by the TPM, unsealed with a PIN
    #[serde(rename = "tpm-pin")]
    TpmAndPin,

    /// Passphrase sealed by the TPM, no user interaction
    #[serde(rename = "tpm")]
    TpmOnly,
}

impl EncryptMode {
    /// Decode the numeric mode used on the wire
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Passphrase),
            1 => Some(Self::TpmAndPin),
            2 => Some(Self::TpmOnly),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Passphrase => 0,
            Self::TpmAndPin => 1,
            Self::TpmOnly => 2,
        }
    }

    /// Tag written into the pending job record
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Passphrase => "pin",
            Self::TpmAndPin => "tpm-pin",
            Self::TpmOnly => "tpm",
        }
    }

    pub fn uses_tpm(self) -> bool {
        matches!(self, Self::TpmAndPin | Self::TpmOnly)
    }
}

impl fmt::Display for EncryptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Unvalidated request parameters
///
/// Every field is optional here; which ones are required depends on the job
/// kind and is decided by the validator.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub device: Option<String>,
    pub uuid: Option<String>,
    pub cipher: Option<String>,
    pub passphrase: Option<String>,
    pub old_passphrase: Option<String>,
    pub mode: Option<EncryptMode>,
    pub key_size: Option<u32>,
    pub tpm_config: Option<String>,
    pub recovery_export_path: Option<String>,
    pub init_only: bool,
    pub validate_with_recovery_key: bool,
}

impl EncryptionRequest {
    /// Device as given, or an empty string (used to label results of
    /// requests that failed validation)
    pub fn device_or_empty(&self) -> &str {
        self.device.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for EncryptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionRequest")
            .field("device", &self.device)
            .field("uuid", &self.uuid)
            .field("cipher", &self.cipher)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field(
                "old_passphrase",
                &self.old_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("mode", &self.mode)
            .field("key_size", &self.key_size)
            .field("tpm_config", &self.tpm_config.as_ref().map(|_| "<present>"))
            .field("recovery_export_path", &self.recovery_export_path)
            .field("init_only", &self.init_only)
            .field("validate_with_recovery_key", &self.validate_with_recovery_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes_match_wire_values() {
        assert_eq!(EncryptMode::from_code(0), Some(EncryptMode::Passphrase));
        assert_eq!(EncryptMode::from_code(1), Some(EncryptMode::TpmAndPin));
        assert_eq!(EncryptMode::from_code(2), Some(EncryptMode::TpmOnly));
        assert_eq!(EncryptMode::from_code(3), None);
        assert_eq!(EncryptMode::TpmAndPin.as_tag(), "tpm-pin");
        assert!(!EncryptMode::Passphrase.uses_tpm());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let request = EncryptionRequest {
            device: Some("/dev/sda1".to_string()),
            passphrase: Some("hunter2".to_string()),
            old_passphrase: Some("hunter1".to_string()),
            ..Default::default()
        };

        let rendered = format!("{request:?}");
        assert!(rendered.contains("/dev/sda1"));
        assert!(!rendered.contains("hunter"));
    }
}
