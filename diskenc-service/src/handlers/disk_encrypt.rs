// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use diskenc_contracts::decode_params;
use diskenc_macros::authorized_interface;
use diskenc_types::{CallerInfo, JobKind};
use zbus::message::Header as MessageHeader;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;
use zbus::{Connection, interface};

use crate::error::ServiceError;
use crate::jobs::JobEngine;
use crate::policies::ValidationError;

/// D-Bus interface for disk encryption jobs
///
/// Job methods only hand the request to the engine and return its job id;
/// outcomes arrive later as result signals carrying that id.
pub struct DiskEncryptHandler {
    engine: JobEngine,
    version: String,
}

impl DiskEncryptHandler {
    pub fn new(engine: JobEngine) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn submit(
        &self,
        kind: JobKind,
        params: &HashMap<String, OwnedValue>,
        caller: &CallerInfo,
    ) -> String {
        let request = decode_params(params).map_err(ValidationError::from);
        self.engine.submit(kind, request, caller).await
    }
}

#[interface(name = "org.cosmic.ext.DiskEncrypt.Service.DiskEncrypt")]
impl DiskEncryptHandler {
    /// Stage (`initParamsOnly`) or start encryption of a device
    ///
    /// Authorization: org.cosmic.ext.diskenc.service.prepare-encrypt
    #[authorized_interface(action = "org.cosmic.ext.diskenc.service.prepare-encrypt")]
    async fn prepare_encrypt_disk(
        &self,
        #[zbus(connection)] connection: &Connection,
        #[zbus(header)] header: MessageHeader<'_>,
        params: HashMap<String, OwnedValue>,
    ) -> zbus::fdo::Result<String> {
        Ok(self.submit(JobKind::PrepareEncrypt, &params, &caller).await)
    }

    /// Authorization: org.cosmic.ext.diskenc.service.decrypt
    #[authorized_interface(action = "org.cosmic.ext.diskenc.service.decrypt")]
    async fn decrypt_disk(
        &self,
        #[zbus(connection)] connection: &Connection,
        #[zbus(header)] header: MessageHeader<'_>,
        params: HashMap<String, OwnedValue>,
    ) -> zbus::fdo::Result<String> {
        Ok(self.submit(JobKind::Decrypt, &params, &caller).await)
    }

    /// Authorization: org.cosmic.ext.diskenc.service.change-passphrase
    #[authorized_interface(action = "org.cosmic.ext.diskenc.service.change-passphrase")]
    async fn change_encrypt_passphrase(
        &self,
        #[zbus(connection)] connection: &Connection,
        #[zbus(header)] header: MessageHeader<'_>,
        params: HashMap<String, OwnedValue>,
    ) -> zbus::fdo::Result<String> {
        Ok(self.submit(JobKind::ChangePassphrase, &params, &caller).await)
    }

    #[authorized_interface(action = "org.cosmic.ext.diskenc.service.read")]
    async fn has_pending_job(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
    ) -> zbus::fdo::Result<bool> {
        tracing::debug!("HasPendingJob called (UID {})", caller.uid);
        Ok(self.engine.has_pending_job().await?)
    }

    /// Device of the staged conversion, empty when nothing is staged
    #[authorized_interface(action = "org.cosmic.ext.diskenc.service.read")]
    async fn pending_device(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
    ) -> zbus::fdo::Result<String> {
        tracing::debug!("PendingDevice called (UID {})", caller.uid);
        Ok(self.engine.pending_device().await?.unwrap_or_default())
    }

    /// JSON array of jobs still in flight
    #[authorized_interface(action = "org.cosmic.ext.diskenc.service.read")]
    async fn list_jobs(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
    ) -> zbus::fdo::Result<String> {
        tracing::debug!("ListJobs called (UID {})", caller.uid);
        let jobs = self.engine.active_jobs().await;
        Ok(serde_json::to_string(&jobs).map_err(ServiceError::from)?)
    }

    #[zbus(property)]
    async fn version(&self) -> &str {
        &self.version
    }

    #[zbus(property)]
    async fn supported_ciphers(&self) -> Vec<String> {
        self.engine.backend().supported_ciphers()
    }

    #[zbus(signal)]
    pub(crate) async fn prepare_encrypt_disk_result(
        signal_ctx: &SignalEmitter<'_>,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn decrypt_disk_result(
        signal_ctx: &SignalEmitter<'_>,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn change_passphrase_result(
        signal_ctx: &SignalEmitter<'_>,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    /// Aggregate outcome of the boot-time resume job (job id is empty)
    #[zbus(signal)]
    pub(crate) async fn reencrypt_result(
        signal_ctx: &SignalEmitter<'_>,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    /// The job record was persisted but the mount table could not be patched
    #[zbus(signal)]
    pub(crate) async fn mount_table_patch_failed(
        signal_ctx: &SignalEmitter<'_>,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn encrypt_progress(
        signal_ctx: &SignalEmitter<'_>,
        device: &str,
        progress: f64,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn decrypt_progress(
        signal_ctx: &SignalEmitter<'_>,
        device: &str,
        progress: f64,
    ) -> zbus::Result<()>;
}
