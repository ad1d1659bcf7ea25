//! Domain-level building blocks shared by the discovery daemon and its CLI
//! client: the chain data model, marker detection, the block window, the
//! wire protocol and environment-driven configuration.

pub mod config;
pub mod model;
pub mod protocol;
pub mod services;

pub use model::{
    is_marked_payment, Amount, Block, ChainInfo, Currency, CurrencyParseError, Output,
    ScriptPubKey, Transaction,
};
pub use protocol::{QueryError, QueryReply, QueryRequest, QueryResult};
pub use services::window::{AppendOutcome, BlockWindowCache};
