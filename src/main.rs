//! # Senior Safe
//!
//! Headless caregiver client for elder-care remote monitoring.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Durable store, backend client and realtime channel
//! - Local HTTP/WebSocket bridge for the UI

use anyhow::Result;
use tracing::info;

use senior_safe::config::Settings;
use senior_safe::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    senior_safe::telemetry::init_tracing();

    info!("Starting Senior Safe monitor...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        backend = %settings.backend.api_base_url,
        storage = %settings.storage.backend,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Monitor ready");
    application.run_until_stopped().await?;

    Ok(())
}
