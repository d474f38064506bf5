// SPDX-License-Identifier: GPL-3.0-only

//! `CryptBackend` backed by the `cryptsetup` CLI
//!
//! Detached LUKS2 headers live under the configured header directory as
//! `<volume>.luks2`. All command invocations run on the blocking pool.

use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use diskenc_contracts::{BackendError, CryptBackend, ProgressReporter};
use diskenc_sys::{CryptsetupCommand, CryptsetupError};
use diskenc_types::{
    ChangePassphraseDescriptor, DEFAULT_KEY_SIZE, EncryptDescriptor, PendingJobRecord,
    volume_name_for,
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const KEY_SIZES: &[u32] = &[DEFAULT_KEY_SIZE, 512];
const CIPHERS: &[&str] = &["aes-xts-plain64", "sm4-xts-plain64", "serpent-xts-plain64"];

pub struct CryptsetupBackend {
    command: CryptsetupCommand,
    header_dir: PathBuf,
}

impl CryptsetupBackend {
    pub fn new(command: CryptsetupCommand, header_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            header_dir: header_dir.into(),
        }
    }

    fn header_path(&self, volume: &str) -> PathBuf {
        self.header_dir.join(format!("{volume}.luks2"))
    }

    /// Detached header created for `device` by an earlier prepare, if any
    fn existing_header(&self, device: &str) -> Option<PathBuf> {
        let path = self.header_path(&volume_name_for(device));
        path.is_file().then_some(path)
    }
}

fn to_backend_error(operation: &'static str, err: CryptsetupError) -> BackendError {
    match err {
        CryptsetupError::NotFound(msg) => BackendError::Unavailable(msg),
        CryptsetupError::Spawn(e) => BackendError::Unavailable(e.to_string()),
        other => BackendError::failed(operation, other.status(), other.to_string()),
    }
}

async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CryptsetupError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::Io(format!("{operation} task failed: {e}")))?
        .map_err(|e| to_backend_error(operation, e))
}

/// 32 hex digits in groups of eight
fn generate_recovery_key() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    hex.as_bytes()
        .chunks(8)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect::<Vec<_>>()
        .join("-")
}

fn write_secret_file(path: &Path, secret: &str) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))?;
    writeln!(tmp, "{secret}")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl CryptBackend for CryptsetupBackend {
    fn supported_key_sizes(&self) -> &[u32] {
        KEY_SIZES
    }

    fn supported_ciphers(&self) -> Vec<String> {
        CIPHERS.iter().map(|c| c.to_string()).collect()
    }

    async fn init_header_file(&self, op: &EncryptDescriptor) -> Result<PathBuf, BackendError> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.header_dir)
            .map_err(|e| BackendError::Io(format!("{}: {e}", self.header_dir.display())))?;

        let header = self.header_path(&op.volume);
        if header.exists() {
            return Err(BackendError::failed(
                "init_header_file",
                -1,
                format!("{} already exists", header.display()),
            ));
        }

        let command = self.command.clone();
        let device = op.device.clone();
        let cipher = op.cipher.clone();
        let key_size = op.key_size;
        let passphrase = op.passphrase.clone();
        let path = header.clone();
        blocking("init_header_file", move || {
            command.init_encrypt_header(&device, &path, &cipher, key_size, &passphrase)
        })
        .await?;
        info!("Created detached header {} for {}", header.display(), op.device);

        if let Some(export) = &op.recovery_export_path {
            let recovery_key = generate_recovery_key();

            let command = self.command.clone();
            let device = op.device.clone();
            let passphrase = op.passphrase.clone();
            let path = header.clone();
            let key = recovery_key.clone();
            blocking("add_recovery_key", move || {
                command.add_key(&device, Some(&path), &passphrase, &key)
            })
            .await?;

            write_secret_file(Path::new(export), &recovery_key)
                .map_err(|e| BackendError::Io(format!("{export}: {e}")))?;
            info!("Exported recovery key for {} to {}", op.device, export);
        }

        Ok(header)
    }

    async fn init_header_device(
        &self,
        device: &str,
        passphrase: &str,
        header: &Path,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        let command = self.command.clone();
        let device = device.to_string();
        let passphrase = passphrase.to_string();
        let header = header.to_path_buf();
        let reporter = progress.clone();
        blocking("init_header_device", move || {
            command.resume_reencrypt(&device, Some(&header), &passphrase, |f| reporter.report(f))
        })
        .await?;

        progress.report(1.0);
        Ok(())
    }

    async fn decrypt_device(
        &self,
        device: &str,
        passphrase: &str,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        let command = self.command.clone();
        let header = self.existing_header(device);
        let device = device.to_string();
        let passphrase = passphrase.to_string();
        let reporter = progress.clone();
        blocking("decrypt_device", move || {
            command.decrypt(&device, header.as_deref(), &passphrase, |f| reporter.report(f))
        })
        .await?;

        progress.report(1.0);
        Ok(())
    }

    async fn change_passphrase(&self, op: &ChangePassphraseDescriptor) -> Result<(), BackendError> {
        if op.validate_with_recovery_key {
            debug!("Authorizing passphrase change on {} with a recovery key", op.device);
        }

        let command = self.command.clone();
        let header = self.existing_header(&op.device);
        let device = op.device.clone();
        let old = op.old_passphrase.clone();
        let new = op.new_passphrase.clone();
        blocking("change_passphrase", move || {
            command.change_key(&device, header.as_deref(), &old, &new)
        })
        .await
    }

    async fn resume_reencrypt(
        &self,
        record: &PendingJobRecord,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        let header = self.header_path(&record.volume);
        let header = header.is_file().then_some(header);

        let command = self.command.clone();
        let device = record.device.clone();
        let passphrase = record.passphrase.clone();
        let reporter = progress.clone();
        blocking("resume_reencrypt", move || {
            command.resume_reencrypt(&device, header.as_deref(), &passphrase, |f| {
                reporter.report(f)
            })
        })
        .await?;

        progress.report(1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use diskenc_types::EncryptMode;

    use super::*;

    /// Fake cryptsetup that appends its arguments and stdin to `log`
    fn fake_cryptsetup(dir: &Path, log: &Path, exit: i32) -> CryptsetupCommand {
        let path = dir.join("cryptsetup");
        fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"$@\" >> {log}\ncat >> {log}\necho '{{\"device_bytes\":\"3\",\"device_size\":\"4\"}}'\nexit {exit}\n",
                log = log.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        CryptsetupCommand::with_binary(path)
    }

    fn descriptor(export: Option<String>) -> EncryptDescriptor {
        EncryptDescriptor {
            device: "/dev/sda1".to_string(),
            uuid: String::new(),
            volume: "dm-sda1".to_string(),
            cipher: "aes-xts-plain64".to_string(),
            passphrase: "hunter2".to_string(),
            key_size: 512,
            mode: EncryptMode::Passphrase,
            tpm_token: String::new(),
            recovery_export_path: export,
            init_only: false,
        }
    }

    #[tokio::test]
    async fn header_init_exports_recovery_key() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let export = dir.path().join("recovery.key");
        let backend = CryptsetupBackend::new(
            fake_cryptsetup(dir.path(), &log, 0),
            dir.path().join("headers"),
        );

        let header = backend
            .init_header_file(&descriptor(Some(export.display().to_string())))
            .await
            .unwrap();
        assert_eq!(header, dir.path().join("headers/dm-sda1.luks2"));

        let log = fs::read_to_string(log).unwrap();
        assert!(log.contains("reencrypt --encrypt --init-only"));
        assert!(log.contains("--key-size 512"));
        assert!(log.contains("luksAddKey --batch-mode --header"));
        assert!(log.contains("hunter2\n"));

        let key = fs::read_to_string(&export).unwrap();
        assert_eq!(key.trim().len(), 35);
        assert_eq!(fs::metadata(&export).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn resume_uses_staged_header_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let headers = dir.path().join("headers");
        fs::create_dir_all(&headers).unwrap();
        fs::write(headers.join("dm-sda1.luks2"), b"").unwrap();
        let backend = CryptsetupBackend::new(fake_cryptsetup(dir.path(), &log, 0), &headers);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = ProgressReporter::new(move |f| sink.lock().unwrap().push(f));
        let record = PendingJobRecord::from_descriptor(&descriptor(None));

        backend.resume_reencrypt(&record, progress).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0.75, 1.0]);
        let log = fs::read_to_string(log).unwrap();
        assert!(log.contains("reencrypt --resume-only --batch-mode --progress-json --header"));
        assert!(log.contains("dm-sda1.luks2 /dev/sda1"));
    }

    #[tokio::test]
    async fn failed_command_maps_to_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let backend = CryptsetupBackend::new(
            fake_cryptsetup(dir.path(), &log, 2),
            dir.path().join("headers"),
        );

        let op = ChangePassphraseDescriptor {
            device: "/dev/sda1".to_string(),
            old_passphrase: "old".to_string(),
            new_passphrase: "new".to_string(),
            validate_with_recovery_key: false,
        };
        let err = backend.change_passphrase(&op).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Failed {
                operation: "change_passphrase",
                status: 2,
                ..
            }
        ));
        assert!(fs::read_to_string(log).unwrap().contains("old\nnew\n"));
    }

    #[test]
    fn recovery_keys_are_grouped_hex() {
        let key = generate_recovery_key();
        let groups: Vec<&str> = key.split('-').collect();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 8));
        assert!(key.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }
}
