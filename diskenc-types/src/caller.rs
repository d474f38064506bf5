// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus caller identity information

use serde::{Deserialize, Serialize};

/// Information about a D-Bus method caller
///
/// Populated by the `#[authorized_interface]` macro from the message header
/// once the Polkit check has passed. Jobs record the caller so the journal
/// shows who staged an encryption or decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Unix user ID of the calling process
    pub uid: u32,

    /// Username resolved from UID via getpwuid, `None` if the lookup failed
    pub username: Option<String>,

    /// D-Bus unique bus name of the caller (e.g., ":1.42")
    pub sender: String,
}

impl CallerInfo {
    pub fn new(uid: u32, username: Option<String>, sender: String) -> Self {
        Self {
            uid,
            username,
            sender,
        }
    }

    /// Caller used for jobs the service starts on its own (boot-time resume)
    pub fn service() -> Self {
        Self {
            uid: 0,
            username: Some("root".to_string()),
            sender: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Short label for log lines
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => format!("{name} (uid {})", self.uid),
            None => format!("uid {}", self.uid),
        }
    }
}
