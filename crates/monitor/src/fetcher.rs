use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use payment_discovery_domain::model::{Block, ChainInfo, Currency, Transaction};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Read-only view of a chain node.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn chain_info(&self) -> Result<ChainInfo, FetchError>;
    async fn block(&self, hash: &str) -> Result<Block, FetchError>;
    async fn transaction(&self, txid: &str) -> Result<Transaction, FetchError>;
}

#[async_trait]
impl<T> ChainSource for Arc<T>
where
    T: ChainSource + ?Sized,
{
    async fn chain_info(&self) -> Result<ChainInfo, FetchError> {
        (**self).chain_info().await
    }

    async fn block(&self, hash: &str) -> Result<Block, FetchError> {
        (**self).block(hash).await
    }

    async fn transaction(&self, txid: &str) -> Result<Transaction, FetchError> {
        (**self).transaction(txid).await
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed http request: status code = {status}; url = {url}")]
    Status { url: String, status: u16 },
    #[error("invalid json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn chain_info_path() -> &'static str {
    "/rest/chaininfo.json"
}

pub fn block_path(hash: &str) -> String {
    format!("/rest/block/{hash}.json")
}

pub fn tx_path(txid: &str) -> String {
    format!("/rest/tx/{txid}.json")
}

/// Client for the node's REST interface. Each call is a single GET bounded
/// by the configured timeout; retries are left to the caller.
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    currency: Currency,
    base_url: String,
    client: reqwest::Client,
}

impl HttpChainFetcher {
    pub fn new(currency: Currency, base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            currency,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        path: &str,
    ) -> Result<T, FetchError> {
        let result = self.fetch_inner(path).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(
            "discovery_fetch_total",
            "currency" => self.currency.tag(),
            "kind" => kind,
            "result" => outcome
        )
        .increment(1);
        result
    }

    async fn fetch_inner<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.url(path);
        debug!(currency = %self.currency, %url, "fetching");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl ChainSource for HttpChainFetcher {
    async fn chain_info(&self) -> Result<ChainInfo, FetchError> {
        self.fetch("chaininfo", chain_info_path()).await
    }

    async fn block(&self, hash: &str) -> Result<Block, FetchError> {
        self.fetch("block", &block_path(hash)).await
    }

    async fn transaction(&self, txid: &str) -> Result<Transaction, FetchError> {
        self.fetch("tx", &tx_path(txid)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_rest_paths() {
        assert_eq!(chain_info_path(), "/rest/chaininfo.json");
        assert_eq!(block_path("00ff"), "/rest/block/00ff.json");
        assert_eq!(tx_path("abcd"), "/rest/tx/abcd.json");
    }

    #[test]
    fn joins_base_url_without_double_slash() {
        let fetcher = HttpChainFetcher::new(
            Currency::Bitcoin,
            "http://127.0.0.1:8332/",
            Duration::from_secs(1),
        )
        .expect("client builds");
        assert_eq!(
            fetcher.url(&block_path("aa")),
            "http://127.0.0.1:8332/rest/block/aa.json"
        );
    }

    #[tokio::test]
    async fn unreachable_node_is_a_request_error() {
        let fetcher = HttpChainFetcher::new(
            Currency::Litecoin,
            "http://127.0.0.1:1",
            Duration::from_millis(500),
        )
        .expect("client builds");

        let err = fetcher.chain_info().await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Request { ref url, .. } if url == "http://127.0.0.1:1/rest/chaininfo.json"
        ));
    }
}
