// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;
use std::sync::Arc;

use diskenc_contracts::ParamsError;
use diskenc_sys::SysError;
use diskenc_types::{
    ChangePassphraseDescriptor, DEFAULT_KEY_SIZE, DecryptDescriptor, EncryptDescriptor,
    EncryptMode, EncryptionRequest, JobKind, OperationDescriptor, param_keys, volume_name_for,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed request: {0}")]
    Malformed(#[from] ParamsError),

    #[error("missing required parameter '{0}'")]
    Missing(&'static str),

    #[error("device '{device}' is not usable: {reason}")]
    BadDevice { device: String, reason: String },

    #[error("{mode} mode requires '{}'", param_keys::TPM_CONFIG)]
    MissingTpmConfig { mode: EncryptMode },

    #[error("key size {requested} is not supported (supported: {supported:?})")]
    UnsupportedKeySize { requested: u32, supported: Vec<u32> },

    #[error("recovery key directory does not exist for {0}")]
    RecoveryDirMissing(String),

    #[error("old and new passphrase are identical")]
    SamePassphrase,

    #[error("{0} jobs cannot be requested")]
    NotRequestable(JobKind),
}

/// Host checks the validator depends on
pub trait BlockDeviceProbe: Send + Sync {
    fn check_block_device(&self, device: &str) -> Result<(), SysError>;
    fn parent_dir_exists(&self, path: &Path) -> bool;
}

/// Probe backed by the live `/dev` tree
pub struct SysBlockDevices;

impl BlockDeviceProbe for SysBlockDevices {
    fn check_block_device(&self, device: &str) -> Result<(), SysError> {
        diskenc_sys::resolve_block_device(device).map(|_| ())
    }

    fn parent_dir_exists(&self, path: &Path) -> bool {
        diskenc_sys::parent_dir_exists(path)
    }
}

/// Turns raw requests into operation descriptors
///
/// All-or-nothing: either every field the kind needs is present and sane, or
/// the request is rejected without touching any other component.
pub struct ParameterValidator {
    probe: Arc<dyn BlockDeviceProbe>,
    key_sizes: Vec<u32>,
}

impl ParameterValidator {
    pub fn new(probe: Arc<dyn BlockDeviceProbe>, key_sizes: &[u32]) -> Self {
        Self {
            probe,
            key_sizes: key_sizes.to_vec(),
        }
    }

    pub fn validate(
        &self,
        kind: JobKind,
        request: &EncryptionRequest,
    ) -> Result<OperationDescriptor, ValidationError> {
        match kind {
            JobKind::PrepareEncrypt => self.prepare(request).map(OperationDescriptor::PrepareEncrypt),
            JobKind::Decrypt => self.decrypt(request).map(OperationDescriptor::Decrypt),
            JobKind::ChangePassphrase => self
                .change_passphrase(request)
                .map(OperationDescriptor::ChangePassphrase),
            JobKind::ResumeReencrypt => Err(ValidationError::NotRequestable(kind)),
        }
    }

    fn prepare(&self, request: &EncryptionRequest) -> Result<EncryptDescriptor, ValidationError> {
        let device = self.device(request)?;
        let cipher = required(&request.cipher, param_keys::CIPHER)?;
        let passphrase = required(&request.passphrase, param_keys::PASSPHRASE)?;

        let mode = request.mode.unwrap_or(EncryptMode::Passphrase);
        let tpm_token = if mode.uses_tpm() {
            required(&request.tpm_config, param_keys::TPM_CONFIG)
                .map_err(|_| ValidationError::MissingTpmConfig { mode })?
        } else {
            String::new()
        };

        let key_size = request.key_size.unwrap_or(DEFAULT_KEY_SIZE);
        if !self.key_sizes.contains(&key_size) {
            return Err(ValidationError::UnsupportedKeySize {
                requested: key_size,
                supported: self.key_sizes.clone(),
            });
        }

        let recovery_export_path = match non_empty(&request.recovery_export_path) {
            Some(path) if !self.probe.parent_dir_exists(Path::new(path)) => {
                return Err(ValidationError::RecoveryDirMissing(path.to_string()));
            }
            other => other.map(str::to_string),
        };

        Ok(EncryptDescriptor {
            volume: volume_name_for(&device),
            uuid: non_empty(&request.uuid).unwrap_or_default().to_string(),
            device,
            cipher,
            passphrase,
            key_size,
            mode,
            tpm_token,
            recovery_export_path,
            init_only: request.init_only,
        })
    }

    fn decrypt(&self, request: &EncryptionRequest) -> Result<DecryptDescriptor, ValidationError> {
        Ok(DecryptDescriptor {
            device: self.device(request)?,
            passphrase: required(&request.passphrase, param_keys::PASSPHRASE)?,
        })
    }

    fn change_passphrase(
        &self,
        request: &EncryptionRequest,
    ) -> Result<ChangePassphraseDescriptor, ValidationError> {
        let device = self.device(request)?;
        let old_passphrase = required(&request.old_passphrase, param_keys::OLD_PASSPHRASE)?;
        let new_passphrase = required(&request.passphrase, param_keys::PASSPHRASE)?;
        if old_passphrase == new_passphrase {
            return Err(ValidationError::SamePassphrase);
        }

        Ok(ChangePassphraseDescriptor {
            device,
            old_passphrase,
            new_passphrase,
            validate_with_recovery_key: request.validate_with_recovery_key,
        })
    }

    fn device(&self, request: &EncryptionRequest) -> Result<String, ValidationError> {
        let device = required(&request.device, param_keys::DEVICE)?;
        if !device.starts_with("/dev/") {
            return Err(ValidationError::BadDevice {
                device,
                reason: "not a /dev path".to_string(),
            });
        }
        self.probe
            .check_block_device(&device)
            .map_err(|e| ValidationError::BadDevice {
                reason: e.to_string(),
                device: device.clone(),
            })?;
        Ok(device)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn required(value: &Option<String>, key: &'static str) -> Result<String, ValidationError> {
    non_empty(value)
        .map(str::to_string)
        .ok_or(ValidationError::Missing(key))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Accepts every `/dev/sd*` device and any parent directory except
    /// `/missing`
    pub(crate) struct FakeProbe;

    impl BlockDeviceProbe for FakeProbe {
        fn check_block_device(&self, device: &str) -> Result<(), SysError> {
            if device.starts_with("/dev/sd") {
                Ok(())
            } else {
                Err(SysError::DeviceNotFound(device.to_string()))
            }
        }

        fn parent_dir_exists(&self, path: &Path) -> bool {
            !path.starts_with("/missing")
        }
    }

    fn validator() -> ParameterValidator {
        ParameterValidator::new(Arc::new(FakeProbe), &[256, 512])
    }

    fn prepare_request() -> EncryptionRequest {
        EncryptionRequest {
            device: Some("/dev/sda1".to_string()),
            uuid: Some("1234-abcd".to_string()),
            cipher: Some("aes-xts-plain64".to_string()),
            passphrase: Some("secret".to_string()),
            init_only: true,
            ..Default::default()
        }
    }

    #[test]
    fn prepare_fills_defaults() {
        let op = match validator().validate(JobKind::PrepareEncrypt, &prepare_request()) {
            Ok(OperationDescriptor::PrepareEncrypt(op)) => op,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(op.volume, "dm-sda1");
        assert_eq!(op.key_size, 256);
        assert_eq!(op.mode, EncryptMode::Passphrase);
        assert!(op.tpm_token.is_empty());
        assert_eq!(op.uuid, "1234-abcd");
    }

    #[test]
    fn prepare_requires_each_field() {
        let v = validator();

        let mut request = prepare_request();
        request.device = None;
        assert_eq!(
            v.validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::Missing(param_keys::DEVICE))
        );

        let mut request = prepare_request();
        request.cipher = Some(String::new());
        assert_eq!(
            v.validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::Missing(param_keys::CIPHER))
        );

        let mut request = prepare_request();
        request.passphrase = None;
        assert_eq!(
            v.validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::Missing(param_keys::PASSPHRASE))
        );
    }

    #[test]
    fn tpm_modes_need_binding_blob() {
        let mut request = prepare_request();
        request.mode = Some(EncryptMode::TpmOnly);
        assert_eq!(
            validator().validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::MissingTpmConfig {
                mode: EncryptMode::TpmOnly
            })
        );

        request.tpm_config = Some("{\"pcr\":7}".to_string());
        assert!(validator().validate(JobKind::PrepareEncrypt, &request).is_ok());
    }

    #[test]
    fn key_size_must_be_supported() {
        let mut request = prepare_request();
        request.key_size = Some(512);
        assert!(validator().validate(JobKind::PrepareEncrypt, &request).is_ok());

        request.key_size = Some(128);
        assert!(matches!(
            validator().validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::UnsupportedKeySize { requested: 128, .. })
        ));
    }

    #[test]
    fn devices_must_be_resolvable_dev_paths() {
        let mut request = prepare_request();
        request.device = Some("sda1".to_string());
        assert!(matches!(
            validator().validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::BadDevice { .. })
        ));

        request.device = Some("/dev/nvme9n9".to_string());
        assert!(matches!(
            validator().validate(JobKind::Decrypt, &request),
            Err(ValidationError::BadDevice { .. })
        ));
    }

    #[test]
    fn recovery_export_dir_must_exist() {
        let mut request = prepare_request();
        request.recovery_export_path = Some("/missing/dir/key".to_string());
        assert_eq!(
            validator().validate(JobKind::PrepareEncrypt, &request),
            Err(ValidationError::RecoveryDirMissing("/missing/dir/key".to_string()))
        );
    }

    #[test]
    fn identical_passphrases_are_rejected() {
        let request = EncryptionRequest {
            device: Some("/dev/sdb1".to_string()),
            passphrase: Some("same".to_string()),
            old_passphrase: Some("same".to_string()),
            ..Default::default()
        };
        assert_eq!(
            validator().validate(JobKind::ChangePassphrase, &request),
            Err(ValidationError::SamePassphrase)
        );
    }

    #[test]
    fn change_passphrase_carries_recovery_flag() {
        let request = EncryptionRequest {
            device: Some("/dev/sdb1".to_string()),
            passphrase: Some("new".to_string()),
            old_passphrase: Some("RECOVERY-KEY".to_string()),
            validate_with_recovery_key: true,
            ..Default::default()
        };
        let Ok(OperationDescriptor::ChangePassphrase(op)) =
            validator().validate(JobKind::ChangePassphrase, &request)
        else {
            panic!("expected change passphrase descriptor");
        };
        assert!(op.validate_with_recovery_key);
        assert_eq!(op.old_passphrase, "RECOVERY-KEY");
    }

    #[test]
    fn resume_cannot_be_requested() {
        assert_eq!(
            validator().validate(JobKind::ResumeReencrypt, &prepare_request()),
            Err(ValidationError::NotRequestable(JobKind::ResumeReencrypt))
        );
    }
}
