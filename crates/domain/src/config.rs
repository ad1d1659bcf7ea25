//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use strum::IntoEnumIterator;
use thiserror::Error;

use crate::model::Currency;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RESCAN_ATTEMPTS: u32 = 5;

/// Endpoints and window size for one watched chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyConfig {
    currency: Currency,
    rpc_url: String,
    sub_endpoint: String,
    cached_block_count: usize,
}

impl CurrencyConfig {
    pub fn new(
        currency: Currency,
        rpc_url: impl Into<String>,
        sub_endpoint: impl Into<String>,
        cached_block_count: usize,
    ) -> Self {
        Self {
            currency,
            rpc_url: rpc_url.into(),
            sub_endpoint: sub_endpoint.into(),
            cached_block_count,
        }
    }

    /// Reads `<TAG>_RPC_URL`, `<TAG>_SUB_ENDPOINT` and
    /// `<TAG>_CACHED_BLOCK_COUNT`. Returns `Ok(None)` when the RPC URL is not
    /// set, which leaves the currency disabled.
    fn load_from_env(currency: Currency) -> Result<Option<Self>, ConfigError> {
        let tag = currency.tag();
        let Some(rpc_url) = get_optional_var(&format!("{tag}_RPC_URL")) else {
            return Ok(None);
        };

        let sub_key = format!("{tag}_SUB_ENDPOINT");
        let sub_endpoint =
            get_optional_var(&sub_key).ok_or(ConfigError::MissingVar { key: sub_key })?;

        let count_key = format!("{tag}_CACHED_BLOCK_COUNT");
        let cached_block_count: usize = get_optional_var(&count_key)
            .ok_or_else(|| ConfigError::MissingVar {
                key: count_key.clone(),
            })?
            .parse()
            .map_err(|source| ConfigError::InvalidNumber {
                key: count_key.clone(),
                source,
            })?;
        if cached_block_count == 0 {
            return Err(ConfigError::ZeroWindow { key: count_key });
        }

        Ok(Some(Self {
            currency,
            rpc_url,
            sub_endpoint,
            cached_block_count,
        }))
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn sub_endpoint(&self) -> &str {
        &self.sub_endpoint
    }

    pub fn cached_block_count(&self) -> usize {
        self.cached_block_count
    }
}

/// Process configuration for the discovery daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub_endpoint: String,
    rep_endpoint: String,
    fetch_timeout: Duration,
    rescan_attempts: u32,
    currencies: Vec<CurrencyConfig>,
}

impl DiscoveryConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so the daemon can refuse to start.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let pub_endpoint = get_required_var("DISCOVERY_PUB_ENDPOINT")?;
        let rep_endpoint = get_required_var("DISCOVERY_REP_ENDPOINT")?;
        let fetch_timeout = Duration::from_secs(
            get_optional_number("DISCOVERY_FETCH_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        );
        let rescan_attempts = get_optional_number("DISCOVERY_RESCAN_ATTEMPTS")?
            .unwrap_or(DEFAULT_RESCAN_ATTEMPTS)
            .max(1);

        let mut currencies = Vec::new();
        for currency in Currency::iter() {
            if let Some(config) = CurrencyConfig::load_from_env(currency)? {
                currencies.push(config);
            }
        }
        if currencies.is_empty() {
            return Err(ConfigError::NoCurrencies);
        }

        Ok(Self {
            pub_endpoint,
            rep_endpoint,
            fetch_timeout,
            rescan_attempts,
            currencies,
        })
    }

    pub fn pub_endpoint(&self) -> &str {
        &self.pub_endpoint
    }

    pub fn rep_endpoint(&self) -> &str {
        &self.rep_endpoint
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn rescan_attempts(&self) -> u32 {
        self.rescan_attempts
    }

    pub fn currencies(&self) -> &[CurrencyConfig] {
        &self.currencies
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar {
        key: key.to_string(),
    })
}

fn get_optional_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_number<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    get_optional_var(key)
        .map(|value| {
            value.parse().map_err(|source| ConfigError::InvalidNumber {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("DISCOVERY_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: String },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    ZeroWindow { key: String },
    #[error("no currency configured; set BTC_RPC_URL and/or LTC_RPC_URL")]
    NoCurrencies,
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

/// Held by every test in this crate that touches process environment.
#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
