// SPDX-License-Identifier: GPL-3.0-only

//! Execution wrapper for invoking `cryptsetup`
//!
//! Secrets are written to the child's stdin, one per line, and never appear
//! on the command line. Long-running reencryption steps run with
//! `--progress-json` and report each parsed fraction to a callback.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CryptsetupError {
    #[error("cryptsetup binary not found: {0}")]
    NotFound(String),

    #[error("failed to run cryptsetup: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("cryptsetup {action} exited with status {status}: {message}")]
    Failed {
        action: &'static str,
        status: i32,
        message: String,
    },

    #[error("secret for {action} contains a line break")]
    InvalidSecret { action: &'static str },
}

impl CryptsetupError {
    /// Exit status of the child, `-1` when it never produced one
    pub fn status(&self) -> i32 {
        match self {
            Self::Failed { status, .. } => *status,
            _ => -1,
        }
    }
}

#[derive(Debug)]
struct Output {
    stderr: String,
    status: i32,
}

#[derive(Debug, Clone)]
pub struct CryptsetupCommand {
    binary: PathBuf,
}

impl CryptsetupCommand {
    /// Resolve `binary` through `PATH` (absolute paths are used as-is)
    pub fn locate(binary: impl AsRef<OsStr>) -> Result<Self, CryptsetupError> {
        let binary = binary.as_ref();
        which::which(binary)
            .map(Self::with_binary)
            .map_err(|e| CryptsetupError::NotFound(format!("{}: {e}", binary.to_string_lossy())))
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Create a LUKS2 detached header and stage an encryption of `device`
    pub fn init_encrypt_header(
        &self,
        device: &str,
        header: &Path,
        cipher: &str,
        key_size: u32,
        passphrase: &str,
    ) -> Result<(), CryptsetupError> {
        let header = header.to_string_lossy();
        let key_size = key_size.to_string();
        let args = [
            "reencrypt",
            "--encrypt",
            "--init-only",
            "--batch-mode",
            "--type",
            "luks2",
            "--cipher",
            cipher,
            "--key-size",
            key_size.as_str(),
            "--header",
            header.as_ref(),
            device,
        ];
        self.run_checked("reencrypt --init-only", &args, &[passphrase], |_| {})
    }

    /// Run (or continue) a staged reencryption until it completes
    pub fn resume_reencrypt(
        &self,
        device: &str,
        header: Option<&Path>,
        passphrase: &str,
        on_progress: impl FnMut(f64),
    ) -> Result<(), CryptsetupError> {
        let mut args = vec![
            "reencrypt".to_string(),
            "--resume-only".to_string(),
            "--batch-mode".to_string(),
            "--progress-json".to_string(),
        ];
        push_header(&mut args, header);
        args.push(device.to_string());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked("reencrypt --resume-only", &args, &[passphrase], on_progress)
    }

    /// Decrypt `device` in place, removing LUKS
    pub fn decrypt(
        &self,
        device: &str,
        header: Option<&Path>,
        passphrase: &str,
        on_progress: impl FnMut(f64),
    ) -> Result<(), CryptsetupError> {
        let mut args = vec![
            "reencrypt".to_string(),
            "--decrypt".to_string(),
            "--batch-mode".to_string(),
            "--progress-json".to_string(),
        ];
        push_header(&mut args, header);
        args.push(device.to_string());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked("reencrypt --decrypt", &args, &[passphrase], on_progress)
    }

    /// Replace the key slot opened by `old` with `new`
    pub fn change_key(
        &self,
        device: &str,
        header: Option<&Path>,
        old: &str,
        new: &str,
    ) -> Result<(), CryptsetupError> {
        let mut args = vec!["luksChangeKey".to_string(), "--batch-mode".to_string()];
        push_header(&mut args, header);
        args.push(device.to_string());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked("luksChangeKey", &args, &[old, new], |_| {})
    }

    /// Add a key slot for `new`, authorized by `existing`
    pub fn add_key(
        &self,
        device: &str,
        header: Option<&Path>,
        existing: &str,
        new: &str,
    ) -> Result<(), CryptsetupError> {
        let mut args = vec!["luksAddKey".to_string(), "--batch-mode".to_string()];
        push_header(&mut args, header);
        args.push(device.to_string());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked("luksAddKey", &args, &[existing, new], |_| {})
    }

    fn run_checked(
        &self,
        action: &'static str,
        args: &[&str],
        secrets: &[&str],
        on_progress: impl FnMut(f64),
    ) -> Result<(), CryptsetupError> {
        if secrets.iter().any(|s| s.contains('\n')) {
            return Err(CryptsetupError::InvalidSecret { action });
        }

        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let out = self.run(args, secrets, on_progress)?;
        if out.status == 0 {
            return Ok(());
        }

        Err(CryptsetupError::Failed {
            action,
            status: out.status,
            message: diagnostic(&out.stderr),
        })
    }

    fn run(
        &self,
        args: &[&str],
        secrets: &[&str],
        mut on_progress: impl FnMut(f64),
    ) -> Result<Output, CryptsetupError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(CryptsetupError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload = String::new();
            for secret in secrets {
                payload.push_str(secret);
                payload.push('\n');
            }
            // A child that exits early closes the pipe; its status tells why.
            let _ = stdin.write_all(payload.as_bytes());
        }

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if let Some(fraction) = parse_progress_line(&line) {
                    on_progress(fraction);
                }
            }
        }

        let status = child.wait().map_err(CryptsetupError::Spawn)?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        Ok(Output {
            stderr,
            status: status.code().unwrap_or(-1),
        })
    }
}

fn push_header(args: &mut Vec<String>, header: Option<&Path>) {
    if let Some(header) = header {
        args.push("--header".to_string());
        args.push(header.to_string_lossy().into_owned());
    }
}

fn diagnostic(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}

/// Fraction done from one `--progress-json` line
///
/// cryptsetup prints byte counters as JSON strings, e.g.
/// `{"device":"/dev/sda1","device_bytes":"8192","device_size":"44040192",...}`.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let done = counter(&value, "device_bytes")?;
    let total = counter(&value, "device_size")?;
    if total == 0 {
        return None;
    }
    Some((done as f64 / total as f64).clamp(0.0, 1.0))
}

fn counter(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
