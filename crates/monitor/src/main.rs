//! Discovery daemon: one monitor per configured currency, a shared fanout
//! socket and a shared query socket.

use std::io;

use payment_discovery_domain::config::DiscoveryConfig;
use payment_discovery_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use payment_discovery_monitor::{run_discovery, MonitorError};
use tracing::info;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[discovery] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = DiscoveryConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("DISCOVERY")?;
    init_telemetry(&telemetry_config)?;

    tokio::select! {
        result = run_discovery(config) => result,
        signal = shutdown_signal() => {
            info!(signal, "shutting down");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        },
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}
