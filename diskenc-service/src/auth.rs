// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::ffi::CStr;

use diskenc_types::CallerInfo;
use zbus::Connection;
use zbus::message::Header as MessageHeader;
use zbus_polkit::policykit1::{AuthorityProxy, CheckAuthorizationFlags, Subject};

/// Polkit-check the sender of `header` for `action_id`
///
/// Called from code generated by `#[authorized_interface]`. Returns the
/// caller's identity once authorized and `AccessDenied` otherwise.
pub async fn authorize_caller(
    connection: &Connection,
    header: &MessageHeader<'_>,
    action_id: &str,
) -> zbus::fdo::Result<CallerInfo> {
    let sender = header
        .sender()
        .ok_or_else(|| zbus::fdo::Error::Failed("No sender in message header".to_string()))?
        .to_string();

    tracing::debug!("Method called by sender: {}", sender);

    let dbus_proxy = zbus::fdo::DBusProxy::new(connection)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("D-Bus connection error: {e}")))?;

    let bus_name: zbus::names::BusName = sender
        .as_str()
        .try_into()
        .map_err(|e| zbus::fdo::Error::Failed(format!("Invalid bus name: {e}")))?;

    let uid = dbus_proxy.get_connection_unix_user(bus_name.clone()).await?;
    let pid = dbus_proxy.get_connection_unix_process_id(bus_name).await?;

    tracing::debug!("Caller {} has UID {} and PID {}", sender, uid, pid);

    let authority = AuthorityProxy::new(connection)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("Polkit connection error: {e}")))?;

    let subject = Subject::new_for_owner(pid, None, None)
        .map_err(|e| zbus::fdo::Error::Failed(format!("Failed to create Polkit subject: {e}")))?;

    let result = authority
        .check_authorization(
            &subject,
            action_id,
            &HashMap::new(),
            CheckAuthorizationFlags::AllowUserInteraction.into(),
            "",
        )
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("Authorization check failed: {e}")))?;

    if !result.is_authorized {
        tracing::warn!("Authorization denied for {} (UID {})", action_id, uid);
        return Err(zbus::fdo::Error::AccessDenied(format!(
            "Not authorized for action: {action_id}"
        )));
    }

    tracing::debug!("Authorization granted for {}", action_id);

    Ok(CallerInfo::new(uid, username_for(uid), sender))
}

fn username_for(uid: u32) -> Option<String> {
    // SAFETY: getpwuid returns null or a pointer to static storage that stays
    // valid until the next getpw* call on this thread; the name is copied out
    // immediately.
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            tracing::warn!("Failed to resolve username for UID {}", uid);
            return None;
        }
        CStr::from_ptr((*pw).pw_name)
            .to_str()
            .ok()
            .map(str::to_string)
    }
}
