// SPDX-License-Identifier: GPL-3.0-only

//! Shared D-Bus connection management

use std::sync::OnceLock;

use zbus::Connection;

use super::error::ClientError;

/// Cached D-Bus system bus connection
static SYSTEM_CONNECTION: OnceLock<Connection> = OnceLock::new();

/// Get or create the shared system bus connection
///
/// Established lazily on first use and reused by every client instance.
pub async fn shared_connection() -> Result<&'static Connection, ClientError> {
    if let Some(conn) = SYSTEM_CONNECTION.get() {
        return Ok(conn);
    }

    let conn = Connection::system()
        .await
        .map_err(|e| ClientError::Connection(format!("Failed to connect to system bus: {}", e)))?;

    // Another task may have won the race; the OnceLock keeps exactly one
    let _ = SYSTEM_CONNECTION.set(conn);

    SYSTEM_CONNECTION.get().ok_or_else(|| {
        ClientError::Connection("Failed to initialize shared system bus connection".to_string())
    })
}
