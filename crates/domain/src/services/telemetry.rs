//! Log and metrics setup for the discovery daemon.
//!
//! Logs go through a `tracing` fmt layer filtered by `<PREFIX>_LOG_FILTER`.
//! Metrics are exported only when `<PREFIX>_METRICS_ADDRESS` is set; the
//! Prometheus scrape endpoint is then served on that address. Without it the
//! `metrics` macros have no recorder and cost nothing.

use std::{env, net::SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info";

static INSTALLED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_listen: Option<SocketAddr>,
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER` (default `info`) and the optional
    /// `<PREFIX>_METRICS_ADDRESS`. A blank value counts as unset.
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let prefix = prefix.trim().to_ascii_uppercase();

        let log_filter = non_blank_var(&format!("{prefix}_LOG_FILTER"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let metrics_key = format!("{prefix}_METRICS_ADDRESS");
        let metrics_listen = non_blank_var(&metrics_key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|source| TelemetryError::InvalidMetricsAddress {
                        key: metrics_key.clone(),
                        value,
                        source,
                    })
            })
            .transpose()?;

        Ok(Self {
            log_filter,
            metrics_listen,
        })
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_listen(&self) -> Option<SocketAddr> {
        self.metrics_listen
    }
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Installs the subscriber and, when configured, the Prometheus exporter.
/// Later calls in the same process are no-ops.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    INSTALLED.get_or_try_init(|| {
        let filter = EnvFilter::try_new(config.log_filter()).map_err(|err| {
            TelemetryError::InvalidLogFilter {
                filter: config.log_filter().to_string(),
                reason: err.to_string(),
            }
        })?;
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;

        if let Some(addr) = config.metrics_listen() {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            info!(%addr, "prometheus exporter listening");
        }

        Ok(())
    })?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidLogFilter { filter: String, reason: String },
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("`{key}` is not a socket address (`{value}`): {source}")]
    InvalidMetricsAddress {
        key: String,
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),
}
