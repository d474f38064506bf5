// SPDX-License-Identifier: GPL-3.0-only

//! Pending job record persisted for boot-time continuation

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::EncryptDescriptor;
use crate::request::EncryptMode;

/// Durable description of a staged device conversion
///
/// The on-disk form is a flat JSON object:
///
/// ```json
/// {"device":"/dev/sda1","volume":"dm-sda1","cipher":"sm4","passphrase":"...",
///  "key-size":256,"mode":"pin","token-tpm":""}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PendingJobRecord {
    pub device: String,
    pub volume: String,
    pub cipher: String,
    pub passphrase: String,
    pub key_size: u32,
    pub mode: EncryptMode,
    #[serde(rename = "token-tpm", default)]
    pub tpm_token: String,
}

impl PendingJobRecord {
    /// Record staged by an init-only prepare request
    ///
    /// The TPM token is left empty; the boot-time step fills it in once the
    /// TPM has sealed the key.
    pub fn from_descriptor(op: &EncryptDescriptor) -> Self {
        Self {
            device: op.device.clone(),
            volume: op.volume.clone(),
            cipher: op.cipher.clone(),
            passphrase: op.passphrase.clone(),
            key_size: op.key_size,
            mode: op.mode,
            tpm_token: String::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Debug for PendingJobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingJobRecord")
            .field("device", &self.device)
            .field("volume", &self.volume)
            .field("cipher", &self.cipher)
            .field("passphrase", &"<redacted>")
            .field("key_size", &self.key_size)
            .field("mode", &self.mode)
            .field("tpm_token", &(!self.tpm_token.is_empty()))
            .finish()
    }
}
