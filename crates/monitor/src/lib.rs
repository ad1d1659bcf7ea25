//! Payment discovery monitor: watches Bitcoin-family nodes for marker
//! payments, republishes them on a fanout socket and answers "since
//! timestamp" lookups from a window of recent blocks.

pub mod feed;
pub mod fetcher;
pub mod monitor;
pub mod pipeline;
pub mod publisher;
pub mod query;
pub mod rescan;
pub mod worker;

#[cfg(test)]
mod testing;

pub use feed::{Notification, NotificationFeed, ZmqNotificationFeed};
pub use fetcher::{ChainSource, FetchError, HttpChainFetcher};
pub use monitor::{CurrencyMonitor, Monitor, ReadySignal};
pub use publisher::{PublishError, Publisher, ZmqPublisher};
pub use query::QueryService;
pub use rescan::RetryPolicy;
pub use worker::{run_discovery, MonitorError};
