//! Chain data structures shared by the monitor daemon and the CLI client.
//!
//! Field names on the wire follow the node's REST JSON so that transactions
//! republished on the fanout feed look exactly like what the node returned.

mod marker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

pub use marker::{is_marked_payment, MARKER_PREFIX, MARKER_RECORD_LENGTH};

/// Bitcoin-family chains the monitor knows how to watch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Currency {
    #[strum(to_string = "BTC", serialize = "bitcoin")]
    Bitcoin,
    #[strum(to_string = "LTC", serialize = "litecoin")]
    Litecoin,
}

impl Currency {
    /// Canonical tag used as fanout topic, query selector and env prefix.
    pub fn tag(&self) -> &'static str {
        (*self).into()
    }

    pub fn parse(value: &str) -> Result<Self, CurrencyParseError> {
        value
            .trim()
            .parse()
            .map_err(|_| CurrencyParseError(value.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown currency `{0}`")]
pub struct CurrencyParseError(pub String);

/// Response of `/rest/chaininfo.json`; only the tip pointer is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    #[serde(rename = "previousblockhash", default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(rename = "time")]
    pub time: i64,
    #[serde(rename = "tx", default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block time as reported by the node, `None` if out of range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }

    /// RFC 3339 rendering of the block time for logs; falls back to the raw
    /// seconds when out of range.
    pub fn time_label(&self) -> String {
        self.timestamp()
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| self.time.to_string())
    }

    /// Marker-bearing transactions in block order.
    pub fn marked_payments(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| is_marked_payment(tx))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "txid")]
    pub id: String,
    #[serde(rename = "vout", default)]
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Amount>,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

impl Output {
    pub fn script_hex(&self) -> &str {
        &self.script_pub_key.hex
    }
}

/// Output amount kept as the exact JSON text the node sent, so a
/// republished transaction carries `0.00010000` rather than `0.0001`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Box<RawValue>);

impl Amount {
    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptPubKey {
    pub hex: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}
