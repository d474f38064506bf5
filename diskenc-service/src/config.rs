// SPDX-License-Identifier: GPL-3.0-only

//! Service configuration
//!
//! Read once at startup from `/etc/cosmic-ext-diskenc/service.toml` (or the
//! file named by `DISKENC_SERVICE_CONFIG`). Every key is optional:
//!
//! ```toml
//! fstab_path = "/etc/fstab"
//! job_store_dir = "/boot/usec-crypt"
//! job_file_name = "encrypt.json"
//! header_dir = "/boot/usec-crypt/headers"
//! cryptsetup_binary = "cryptsetup"
//! log_filter = "cosmic_ext_diskenc_service=debug"
//! resume_on_start = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/cosmic-ext-diskenc/service.toml";
pub const CONFIG_PATH_ENV: &str = "DISKENC_SERVICE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub fstab_path: PathBuf,
    /// Directory holding the pending job record
    pub job_store_dir: PathBuf,
    pub job_file_name: String,
    /// Where detached LUKS headers are created
    pub header_dir: PathBuf,
    pub cryptsetup_binary: String,
    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_filter: Option<String>,
    /// Continue a staged conversion when the service starts
    pub resume_on_start: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fstab_path: PathBuf::from("/etc/fstab"),
            job_store_dir: PathBuf::from("/boot/usec-crypt"),
            job_file_name: "encrypt.json".to_string(),
            header_dir: PathBuf::from("/boot/usec-crypt/headers"),
            cryptsetup_binary: "cryptsetup".to_string(),
            log_filter: None,
            resume_on_start: true,
        }
    }
}

impl ServiceConfig {
    /// Load from the environment-selected path, falling back to defaults
    /// when the file does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_from(&dir.path().join("service.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(
            &path,
            "fstab_path = \"/tmp/fstab\"\nresume_on_start = false\nlog_filter = \"debug\"\n",
        )
        .unwrap();

        let config = ServiceConfig::load_from(&path).unwrap();
        assert_eq!(config.fstab_path, PathBuf::from("/tmp/fstab"));
        assert!(!config.resume_on_start);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.job_file_name, "encrypt.json");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(&path, "resume_on_start = \"sometimes\"").unwrap();

        assert!(matches!(
            ServiceConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
