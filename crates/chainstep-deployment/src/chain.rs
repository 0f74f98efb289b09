//! Chain client boundary
//!
//! Everything the engine needs from the ledger network: the deploying
//! account, contract deployment, state-changing calls, receipts and
//! read-only queries. Implementations live outside this crate (HTTP gateway)
//! or in [`crate::mock`].

use async_trait::async_trait;
use chainstep_types::{Address, Wei};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::error::{DeploymentError, Result};

/// Transaction hash as reported by the chain client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The account that signs and pays for transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: Address,
    pub balance: Wei,
}

/// Deploy a named contract with constructor arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub contract: String,
    #[serde(default)]
    pub constructor_args: Vec<Value>,
}

/// State-changing call against a deployed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub target: Address,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Read-only query against a deployed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadQuery {
    pub target: Address,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// A submitted, not yet confirmed, transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub tx_hash: TxHash,
}

/// Confirmation of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
    #[serde(default)]
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    #[serde(default)]
    pub effective_gas_price: Option<Wei>,
}

impl Receipt {
    /// Cost of the transaction, falling back to `reference_price` when the
    /// client did not report the price actually paid
    pub fn cost(&self, reference_price: Wei) -> Wei {
        Wei::cost(
            self.gas_used,
            self.effective_gas_price.unwrap_or(reference_price),
        )
    }
}

/// Chain client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("no receipt for {tx_hash} after {waited_secs}s")]
    Timeout { tx_hash: TxHash, waited_secs: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Interface to the ledger network
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Signing account and its current balance
    async fn account(&self) -> std::result::Result<AccountInfo, ChainError>;

    /// Submit a contract deployment
    async fn deploy(
        &self,
        request: &DeployRequest,
    ) -> std::result::Result<PendingTransaction, ChainError>;

    /// Submit a state-changing call
    async fn send(&self, request: &CallRequest)
        -> std::result::Result<PendingTransaction, ChainError>;

    /// Block until the transaction is confirmed (or the client gives up)
    async fn wait_for_receipt(
        &self,
        pending: &PendingTransaction,
    ) -> std::result::Result<Receipt, ChainError>;

    /// Read contract state without submitting a transaction
    async fn query(&self, query: &ReadQuery) -> std::result::Result<Value, ChainError>;
}

/// Wait for `pending` and require a successful receipt
pub(crate) async fn confirm(
    chain: &dyn ChainClient,
    pending: &PendingTransaction,
    context: &str,
) -> Result<Receipt> {
    let receipt = chain
        .wait_for_receipt(pending)
        .await
        .map_err(|source| DeploymentError::submission(context, source))?;
    if !receipt.success {
        return Err(DeploymentError::Reverted {
            context: context.to_string(),
            tx_hash: receipt.tx_hash,
        });
    }
    Ok(receipt)
}

/// Interpret a query result as an unsigned count
///
/// Accepts JSON numbers and decimal strings (large integers are commonly
/// returned as strings).
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Compare a queried value against an expected one
///
/// Strings compare case-insensitively so that checksummed and lowercase
/// addresses are equal.
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
        }
        (a, b) => match (value_as_u64(a), value_as_u64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}
