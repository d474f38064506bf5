// SPDX-License-Identifier: GPL-3.0-only

use diskenc_sys::StoreError;
use thiserror::Error;
use zbus::fdo;

/// Errors returned to D-Bus callers
///
/// Job failures are not in here: they travel as result codes on signals.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for fdo::Error {
    fn from(err: ServiceError) -> Self {
        fdo::Error::Failed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
