use std::sync::Arc;

use payment_discovery_domain::{
    config::{ConfigError, DiscoveryConfig},
    model::Currency,
    services::telemetry::TelemetryError,
};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::info;
use zeromq::{RepSocket, Socket};

use crate::{
    feed::{FeedError, ZmqNotificationFeed},
    fetcher::{FetchError, HttpChainFetcher},
    monitor::{CurrencyMonitor, Monitor},
    publisher::{PublishError, Publisher, ZmqPublisher},
    query::QueryService,
    rescan::RetryPolicy,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{currency} rescan failed after {attempts} attempt(s): {source}")]
    RescanExhausted {
        currency: Currency,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("task failed: {0}")]
    Task(String),
}

impl From<FeedError> for MonitorError {
    fn from(value: FeedError) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<PublishError> for MonitorError {
    fn from(value: PublishError) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<zeromq::ZmqError> for MonitorError {
    fn from(value: zeromq::ZmqError) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Binds the fanout and query sockets, starts one monitor per configured
/// currency and runs until a task fails.
pub async fn run_discovery(config: DiscoveryConfig) -> Result<(), MonitorError> {
    let fanout = ZmqPublisher::bind(config.pub_endpoint()).await?;
    info!(endpoint = fanout.endpoint(), "fanout bound");
    let publisher: Arc<dyn Publisher> = Arc::new(fanout);

    let mut rep = RepSocket::new();
    let rep_endpoint = rep.bind(config.rep_endpoint()).await?;
    info!(endpoint = %rep_endpoint, "query socket bound");

    let retry = RetryPolicy::default().with_max_attempts(config.rescan_attempts());
    let mut tasks = JoinSet::new();
    let mut monitors: Vec<Arc<dyn CurrencyMonitor>> = Vec::new();

    for currency_config in config.currencies() {
        let currency = currency_config.currency();
        let source =
            HttpChainFetcher::new(currency, currency_config.rpc_url(), config.fetch_timeout())?;
        let feed = ZmqNotificationFeed::connect(currency_config.sub_endpoint()).await?;
        info!(
            %currency,
            rpc = currency_config.rpc_url(),
            sub = currency_config.sub_endpoint(),
            window = currency_config.cached_block_count(),
            "starting monitor"
        );

        let monitor: Arc<dyn CurrencyMonitor> = Arc::new(Monitor::new(
            currency,
            source,
            currency_config.cached_block_count(),
            publisher.clone(),
            retry.clone(),
        ));

        let rescanning = monitor.clone();
        tasks.spawn(async move { rescanning.rescan().await });
        let listening = monitor.clone();
        tasks.spawn(async move { listening.listen(Box::new(feed)).await });

        monitors.push(monitor);
    }

    let service = QueryService::new(monitors);
    tasks.spawn(service.serve(rep));

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(err) => return Err(MonitorError::Task(err.to_string())),
        }
    }

    Ok(())
}
