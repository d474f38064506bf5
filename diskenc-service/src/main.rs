// SPDX-License-Identifier: GPL-3.0-only

//! COSMIC Ext Disk Encryption Service - D-Bus service for encryption jobs
//!
//! Accepts encrypt, decrypt and passphrase change requests from authorized
//! callers, runs them as background jobs and reports results as signals.
//! A conversion staged for the next boot is resumed on startup.

use std::sync::Arc;

use anyhow::Result;
use diskenc_contracts::CryptBackend;
use diskenc_sys::{CryptsetupCommand, FstabPatcher, JobStore};
use tracing_subscriber::{EnvFilter, fmt};
use zbus::connection::Builder as ConnectionBuilder;

mod adapters;
mod auth;
mod config;
mod error;
mod handlers;
mod jobs;
mod policies;

use adapters::CryptsetupBackend;
use config::ServiceConfig;
use handlers::DiskEncryptHandler;
use jobs::{JobEngine, ResumeCoordinator};
use policies::{ParameterValidator, SysBlockDevices};

const SERVICE_NAME: &str = "org.cosmic.ext.DiskEncrypt.Service";
const OBJECT_PATH: &str = "/org/cosmic/ext/DiskEncrypt/Service";
const DEFAULT_LOG_FILTER: &str = "cosmic_ext_diskenc_service=info,diskenc_sys=info,warn";

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration is read first so it can supply the log filter
    let config = ServiceConfig::load();
    let fallback_filter = config
        .as_ref()
        .ok()
        .and_then(|c| c.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "Starting COSMIC Ext Disk Encryption Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = config?;
    tracing::debug!("Configuration: {:?}", config);

    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("Disk encryption service must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    let command = CryptsetupCommand::locate(&config.cryptsetup_binary)?;
    tracing::info!("Using cryptsetup at {}", command.binary().display());

    let backend: Arc<dyn CryptBackend> =
        Arc::new(CryptsetupBackend::new(command, &config.header_dir));
    let validator =
        ParameterValidator::new(Arc::new(SysBlockDevices), backend.supported_key_sizes());
    let engine = JobEngine::new(
        backend,
        JobStore::new(&config.job_store_dir, &config.job_file_name),
        FstabPatcher::new(&config.fstab_path),
        validator,
    );

    // Holds dispatch from here on, so requests arriving as soon as the name
    // is taken wait for the staged conversion
    let resume = ResumeCoordinator::new(engine.clone(), config.resume_on_start);

    let connection = ConnectionBuilder::system()?
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, DiskEncryptHandler::new(engine.clone()))?
        .build()
        .await?;

    tracing::info!("Service registered on D-Bus system bus");
    tracing::info!("  - {} at {}", SERVICE_NAME, OBJECT_PATH);

    // Subscribe before the resume job starts so its results become signals
    handlers::forward_job_events(connection.clone(), OBJECT_PATH, &engine).await?;

    if let Some(resume) = resume.start() {
        tokio::spawn(async move {
            match resume.await {
                Ok(Ok(())) => tracing::info!("Boot-time resume finished"),
                Ok(Err(e)) => tracing::warn!("Boot-time resume failed: {}", e),
                Err(e) => tracing::error!("Boot-time resume task failed: {}", e),
            }
        });
    }

    tracing::info!("Service ready, waiting for requests...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    tracing::info!("COSMIC Ext Disk Encryption Service shutting down");
    Ok(())
}
