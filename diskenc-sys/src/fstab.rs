// SPDX-License-Identifier: GPL-3.0-only

//! Mount table patching
//!
//! A device under conversion must not make boot wait on it, so its mount
//! table line gets `x-systemd.device-timeout=0` appended to the options.
//! Only the options field of the first matching line changes; every other
//! byte of the file is written back as read.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Option token appended to the matched entry
pub const MOUNT_TIMEOUT_OPTION: &str = "x-systemd.device-timeout=0";

const OPTIONS_FIELD: usize = 3;

#[derive(Debug, Error)]
pub enum FstabError {
    #[error("no mount table entry for {device}")]
    NoMatchingEntry { device: String },

    #[error("failed to read mount table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write mount table {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a successful patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FstabPatch {
    Applied,
    /// The matched entry already carried the option; nothing was written
    AlreadyPresent,
}

/// Spellings a device may have in the first mount table field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpecs {
    pub path_form: String,
    pub uuid_form: Option<String>,
}

impl DeviceSpecs {
    /// `uuid` is the bare filesystem UUID; empty means unknown
    pub fn new(device: &str, uuid: &str) -> Self {
        Self {
            path_form: device.to_string(),
            uuid_form: (!uuid.is_empty()).then(|| format!("UUID={uuid}")),
        }
    }

    fn matches(&self, spec: &str) -> bool {
        spec == self.path_form || self.uuid_form.as_deref() == Some(spec)
    }
}

/// One six-field mount table line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub spec: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
    pub dump: String,
    pub pass: String,
}

impl FstabEntry {
    /// Parse a line; comments, blank lines and lines without exactly six
    /// fields yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        if is_comment(line) {
            return None;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [spec, mount_point, fs_type, options, dump, pass] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            spec: spec.to_string(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
            options: options.split(',').map(str::to_string).collect(),
            dump: dump.to_string(),
            pass: pass.to_string(),
        })
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Byte ranges of the whitespace-separated fields of a line
fn field_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, idx));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, line.len()));
    }
    spans
}

/// Patch mount table content in memory
///
/// Returns `None` when no line matches. On `AlreadyPresent` the returned
/// content equals the input.
pub fn patch_content(content: &str, specs: &DeviceSpecs) -> Option<(String, FstabPatch)> {
    let mut out = String::with_capacity(content.len() + MOUNT_TIMEOUT_OPTION.len() + 1);
    let mut outcome = None;

    for line in content.split_inclusive('\n') {
        let entry = match outcome {
            None => FstabEntry::parse(line).filter(|entry| specs.matches(&entry.spec)),
            Some(_) => None,
        };
        let Some(entry) = entry else {
            out.push_str(line);
            continue;
        };

        if entry.has_option(MOUNT_TIMEOUT_OPTION) {
            out.push_str(line);
            outcome = Some(FstabPatch::AlreadyPresent);
            continue;
        }

        let Some(&(_, opt_end)) = field_spans(line).get(OPTIONS_FIELD) else {
            out.push_str(line);
            continue;
        };
        out.push_str(&line[..opt_end]);
        out.push(',');
        out.push_str(MOUNT_TIMEOUT_OPTION);
        out.push_str(&line[opt_end..]);
        outcome = Some(FstabPatch::Applied);
    }

    outcome.map(|patch| (out, patch))
}

/// Mount table editor bound to one file
///
/// Not synchronized: callers serialize access to the same path.
#[derive(Debug, Clone)]
pub struct FstabPatcher {
    path: PathBuf,
}

impl FstabPatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the boot timeout option to the first entry for `specs`
    ///
    /// The file is replaced through a temporary file in the same directory,
    /// so readers see either the old or the new table.
    pub fn disable_mount_timeout(&self, specs: &DeviceSpecs) -> Result<FstabPatch, FstabError> {
        let content = self.read()?;

        let Some((patched, outcome)) = patch_content(&content, specs) else {
            return Err(FstabError::NoMatchingEntry {
                device: specs.path_form.clone(),
            });
        };

        match outcome {
            FstabPatch::AlreadyPresent => {
                debug!(
                    "{} already has {} in {}",
                    specs.path_form,
                    MOUNT_TIMEOUT_OPTION,
                    self.path.display()
                );
            }
            FstabPatch::Applied => {
                self.replace(&patched).map_err(|source| FstabError::Write {
                    path: self.path.clone(),
                    source,
                })?;
                info!(
                    "Disabled mount timeout for {} in {}",
                    specs.path_form,
                    self.path.display()
                );
            }
        }

        Ok(outcome)
    }

    fn read(&self) -> Result<String, FstabError> {
        fs::read_to_string(&self.path).map_err(|source| FstabError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn replace(&self, content: &str) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        let permissions = fs::metadata(&self.path)?.permissions();
        tmp.as_file().set_permissions(permissions)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        if let Ok(dir) = fs::File::open(dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}
