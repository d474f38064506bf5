// SPDX-License-Identifier: GPL-3.0-only

use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::{Result, SysError};

/// Resolve a device path (following `/dev/disk/by-*` links) to a block device node
pub fn resolve_block_device(device: &str) -> Result<PathBuf> {
    let resolved = match std::fs::canonicalize(device) {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SysError::DeviceNotFound(device.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = std::fs::metadata(&resolved)?;
    if !metadata.file_type().is_block_device() {
        return Err(SysError::NotBlockDevice(resolved.display().to_string()));
    }

    Ok(resolved)
}

/// Whether the directory a file would be written into exists
pub fn parent_dir_exists(path: &Path) -> bool {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_files_are_not_block_devices() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("disk.img");
        std::fs::write(&file, b"").unwrap();

        let err = resolve_block_device(file.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SysError::NotBlockDevice(_)));

        let err = resolve_block_device("/dev/does-not-exist-diskenc").unwrap_err();
        assert!(matches!(err, SysError::DeviceNotFound(_)));
    }

    #[test]
    fn parent_dir_checks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parent_dir_exists(&dir.path().join("recovery.key")));
        assert!(!parent_dir_exists(&dir.path().join("missing/recovery.key")));
        assert!(!parent_dir_exists(Path::new("recovery.key")));
    }
}
