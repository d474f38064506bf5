// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use zbus::proxy;
use zbus::zvariant::OwnedValue;

use diskenc_types::{EncryptionRequest, JobSummary};

use crate::client::connection::shared_connection;
use crate::client::error::ClientError;
use crate::protocol::encode_params;

/// D-Bus proxy for the disk encryption job interface
#[proxy(
    interface = "org.cosmic.ext.DiskEncrypt.Service.DiskEncrypt",
    default_service = "org.cosmic.ext.DiskEncrypt.Service",
    default_path = "/org/cosmic/ext/DiskEncrypt/Service"
)]
pub trait DiskEncryptInterface {
    /// Stage or run an encryption; returns the job id
    async fn prepare_encrypt_disk(&self, params: &HashMap<String, OwnedValue>)
    -> zbus::Result<String>;

    /// Decrypt a device; returns the job id
    async fn decrypt_disk(&self, params: &HashMap<String, OwnedValue>) -> zbus::Result<String>;

    /// Replace the passphrase of a device; returns the job id
    async fn change_encrypt_passphrase(
        &self,
        params: &HashMap<String, OwnedValue>,
    ) -> zbus::Result<String>;

    async fn has_pending_job(&self) -> zbus::Result<bool>;

    async fn pending_device(&self) -> zbus::Result<String>;

    /// JSON-serialized Vec<JobSummary>
    async fn list_jobs(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn supported_ciphers(&self) -> zbus::Result<Vec<String>>;

    #[zbus(signal)]
    async fn prepare_encrypt_disk_result(
        &self,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn decrypt_disk_result(&self, device: &str, job_id: &str, err_code: i32)
    -> zbus::Result<()>;

    #[zbus(signal)]
    async fn change_passphrase_result(
        &self,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn reencrypt_result(&self, job_id: &str, err_code: i32) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn mount_table_patch_failed(
        &self,
        device: &str,
        job_id: &str,
        err_code: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn encrypt_progress(&self, device: &str, progress: f64) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn decrypt_progress(&self, device: &str, progress: f64) -> zbus::Result<()>;
}

/// Client for disk encryption jobs
pub struct DiskEncryptClient {
    proxy: DiskEncryptInterfaceProxy<'static>,
}

impl DiskEncryptClient {
    /// Create a new client connected to the encryption service
    pub async fn new() -> Result<Self, ClientError> {
        let conn = shared_connection().await?;

        let proxy = DiskEncryptInterfaceProxy::new(conn).await.map_err(|e| {
            ClientError::Connection(format!("Failed to create disk encrypt proxy: {}", e))
        })?;

        Ok(Self { proxy })
    }

    pub async fn prepare_encrypt(&self, request: &EncryptionRequest) -> Result<String, ClientError> {
        let params = encode_params(request)?;
        Ok(self.proxy.prepare_encrypt_disk(&params).await?)
    }

    pub async fn decrypt(&self, request: &EncryptionRequest) -> Result<String, ClientError> {
        let params = encode_params(request)?;
        Ok(self.proxy.decrypt_disk(&params).await?)
    }

    pub async fn change_passphrase(
        &self,
        request: &EncryptionRequest,
    ) -> Result<String, ClientError> {
        let params = encode_params(request)?;
        Ok(self.proxy.change_encrypt_passphrase(&params).await?)
    }

    pub async fn has_pending_job(&self) -> Result<bool, ClientError> {
        Ok(self.proxy.has_pending_job().await?)
    }

    /// Device of the staged conversion, if any
    pub async fn pending_device(&self) -> Result<Option<String>, ClientError> {
        let device = self.proxy.pending_device().await?;
        Ok(if device.is_empty() { None } else { Some(device) })
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, ClientError> {
        let json = self.proxy.list_jobs().await?;
        serde_json::from_str(&json)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse job list: {}", e)))
    }

    /// Get the underlying proxy for signal subscriptions
    pub fn proxy(&self) -> &DiskEncryptInterfaceProxy<'static> {
        &self.proxy
    }
}
