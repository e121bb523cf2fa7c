// Daemon bootstrap: config resolution, data directory layout, and the serve
// loop that wires the stores, the registry, and the HTTP server together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::device::SimDeviceReader;
use crate::engine::JobRegistry;
use crate::models::DaemonConfig;
use crate::server::{self, AppState};
use crate::storage::records::JsonRecordStore;
use crate::storage::trendlog::CsvTrendLogStore;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the DaemonConfig, trying in order:
///   1. --config CLI flag (passed as config_path)
///   2. PTL_CONFIG_DIR environment variable
///   3. Platform config dir (dirs::config_dir()/plc-trend-logger/config.json)
///   4. {data_dir}/config.json
///   5. Defaults when no config file exists.
pub fn load_config(config_path: Option<&Path>) -> Result<DaemonConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: DaemonConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            tracing::info!("Loaded config from: {}", path.display());
            return Ok(config);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var("PTL_CONFIG_DIR") {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read config from PTL_CONFIG_DIR")?;
            let config: DaemonConfig = serde_json::from_str(&content)
                .context("Failed to parse config from PTL_CONFIG_DIR")?;
            tracing::info!("Loaded config from PTL_CONFIG_DIR: {}", path.display());
            return Ok(config);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("plc-trend-logger").join("config.json");
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read config from platform config dir")?;
            let config: DaemonConfig = serde_json::from_str(&content)
                .context("Failed to parse config from platform config dir")?;
            tracing::info!("Loaded config from: {}", path.display());
            return Ok(config);
        }
    }

    let data_dir = resolve_data_dir(None);
    let path = data_dir.join("config.json");
    if path.exists() {
        let content =
            std::fs::read_to_string(&path).context("Failed to read config from data dir")?;
        let config: DaemonConfig =
            serde_json::from_str(&content).context("Failed to parse config from data dir")?;
        tracing::info!("Loaded config from: {}", path.display());
        return Ok(config);
    }

    tracing::info!("No config file found, using defaults");
    Ok(DaemonConfig::default())
}

/// Resolve the data directory: explicit override, then the PTL_DATA_DIR
/// environment variable, then the platform data dir.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("PTL_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plc-trend-logger")
}

/// Create the data directory layout: record files live at the root, trend
/// CSVs under `trends/`.
pub async fn create_data_dirs(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(data_dir.join("trends"))
        .await
        .context("Failed to create trends directory")?;
    tracing::info!("Data directories ensured at: {}", data_dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Serve loop
// ---------------------------------------------------------------------------

/// Start the daemon: load config, build the stores and registry, bind the
/// HTTP server, and run until Ctrl+C or SIGTERM. On shutdown every running
/// job is signalled to stop and given a bounded grace period to flush.
pub async fn start_daemon(
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
    host_override: Option<&str>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(h) = host_override {
        config.host = h.to_string();
    }
    if let Some(p) = port_override {
        config.port = p;
    }

    let data_dir = if let Some(d) = data_dir_override {
        d.to_path_buf()
    } else if let Some(ref d) = config.data_dir {
        d.clone()
    } else {
        resolve_data_dir(None)
    };
    config.data_dir = Some(data_dir.clone());
    let config = Arc::new(config);

    create_data_dirs(&data_dir).await?;

    let record_store = Arc::new(JsonRecordStore::new(data_dir.clone()).await?);
    let log_store = Arc::new(CsvTrendLogStore::new(data_dir.join("trends")).await?);
    let registry = Arc::new(JobRegistry::new(
        Arc::new(SimDeviceReader),
        log_store,
        config.read_retry_limit,
        config.recent_samples_capacity,
    ));

    let state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        record_store,
        config: Arc::clone(&config),
        start_time: Instant::now(),
    });

    let router = server::create_router(state);
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context(format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Daemon started. Listening on http://{}", bind_addr);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .ok();
    });

    wait_for_signal().await?;

    let _ = shutdown_tx.send(());

    tracing::info!("Stopping running trends...");
    registry
        .shutdown(std::time::Duration::from_secs(config.stop_grace_secs))
        .await;

    let _ = server_handle.await;

    tracing::info!("Daemon exited cleanly.");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM signal");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C signal");
    Ok(())
}
