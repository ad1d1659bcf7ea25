//! Frame layouts of the fanout feed and the query request/reply exchange.
//!
//! Both transports carry multipart messages. A fanout message is
//! `[currency tag, transaction json]`; a query request is
//! `[currency selector, decimal timestamp]` and its reply is
//! `[status, payload]` where the status is `OK` or `ERROR`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Currency, CurrencyParseError, Transaction};

pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "ERROR";

/// Historical lookup: marked payments in blocks stamped at or after `since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRequest {
    pub currency: Currency,
    pub since: i64,
}

impl QueryRequest {
    pub fn new(currency: Currency, since: i64) -> Self {
        Self { currency, since }
    }

    pub fn from_frames<F: AsRef<[u8]>>(frames: &[F]) -> Result<Self, QueryError> {
        let (Some(currency), Some(since)) = (frames.first(), frames.get(1)) else {
            return Err(QueryError::MissingFrame);
        };

        let currency = String::from_utf8_lossy(currency.as_ref());
        let currency = Currency::parse(&currency)?;

        let since = String::from_utf8_lossy(since.as_ref());
        let since = since
            .trim()
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidTimestamp(since.to_string()))?;

        Ok(Self { currency, since })
    }

    pub fn to_frames(&self) -> Vec<Vec<u8>> {
        vec![
            self.currency.tag().as_bytes().to_vec(),
            self.since.to_string().into_bytes(),
        ]
    }
}

/// Body of a successful reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub txs: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryReply {
    Ok(QueryResult),
    Error(String),
}

impl QueryReply {
    pub fn to_frames(&self) -> Result<Vec<Vec<u8>>, serde_json::Error> {
        let frames = match self {
            QueryReply::Ok(result) => vec![
                STATUS_OK.as_bytes().to_vec(),
                serde_json::to_vec(result)?,
            ],
            QueryReply::Error(message) => vec![
                STATUS_ERROR.as_bytes().to_vec(),
                message.as_bytes().to_vec(),
            ],
        };
        Ok(frames)
    }

    pub fn from_frames<F: AsRef<[u8]>>(frames: &[F]) -> Result<Self, ReplyDecodeError> {
        let (Some(status), Some(payload)) = (frames.first(), frames.get(1)) else {
            return Err(ReplyDecodeError::MissingFrame);
        };

        let status: &[u8] = status.as_ref();
        match status {
            s if s == STATUS_OK.as_bytes() => Ok(QueryReply::Ok(serde_json::from_slice(
                payload.as_ref(),
            )?)),
            s if s == STATUS_ERROR.as_bytes() => Ok(QueryReply::Error(
                String::from_utf8_lossy(payload.as_ref()).into_owned(),
            )),
            other => Err(ReplyDecodeError::UnknownStatus(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// Request-side failures reported back to the requester as `ERROR`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("request must carry a currency and a timestamp")]
    MissingFrame,
    #[error(transparent)]
    UnknownCurrency(#[from] CurrencyParseError),
    #[error("incorrect timestamp `{0}`")]
    InvalidTimestamp(String),
    #[error("currency {0} is not monitored")]
    NotMonitored(Currency),
}

#[derive(Debug, Error)]
pub enum ReplyDecodeError {
    #[error("reply must carry a status and a payload")]
    MissingFrame,
    #[error("unknown reply status `{0}`")]
    UnknownStatus(String),
    #[error("invalid reply payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Two-frame fanout message for a detected payment.
pub fn fanout_frames(
    currency: Currency,
    tx: &Transaction,
) -> Result<(String, Vec<u8>), serde_json::Error> {
    Ok((currency.tag().to_string(), serde_json::to_vec(tx)?))
}
