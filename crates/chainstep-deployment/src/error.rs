//! Error types for deployment and migration runs.

use chainstep_state::StateError;
use chainstep_types::{ArtifactKey, LedgerError};
use thiserror::Error;

use crate::chain::{ChainError, TxHash};

/// Failure category reported to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing dependency, bad plan, malformed ledger; nothing was submitted
    Configuration,
    /// Migration dataset is not sorted by key; nothing was submitted
    UnorderedInput,
    /// A transaction was not confirmed; earlier confirmed work is ledgered
    Submission,
    /// The ledger document could not be written
    Storage,
    /// The operator stopped the run at a gate
    Aborted,
}

/// Errors that can occur during deployment and migration.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("step {step} requires artifact {artifact}, which is not in the ledger")]
    MissingDependency { step: String, artifact: ArtifactKey },

    #[error("record {index} has key {key}, which is lower than the previous key {previous}")]
    UnorderedInput {
        index: usize,
        previous: u64,
        key: u64,
    },

    #[error("submission failed for {context}: {source}")]
    Submission {
        context: String,
        #[source]
        source: ChainError,
    },

    #[error("transaction {tx_hash} for {context} reverted")]
    Reverted { context: String, tx_hash: TxHash },

    #[error("deployment of {step} confirmed without a contract address (tx {tx_hash})")]
    MissingContractAddress { step: String, tx_hash: TxHash },

    #[error(
        "batch {batch_index} failed after {confirmed_records} records were confirmed; \
         resume from offset {resume_offset}: {source}"
    )]
    BatchFailed {
        batch_index: usize,
        resume_offset: usize,
        confirmed_records: usize,
        #[source]
        source: Box<DeploymentError>,
    },

    #[error(
        "batch {batch_index} was submitted as {tx_hash} but not confirmed: {source}; \
         entity count is {}, {expected_if_included} if the batch was included; \
         resume from offset {included_offset} if it was included, {resume_offset} if not",
        .reported_count.map_or_else(|| "unknown".to_string(), |c| c.to_string())
    )]
    BatchUnconfirmed {
        batch_index: usize,
        tx_hash: TxHash,
        /// Offset to resume from if the transaction was dropped
        resume_offset: usize,
        /// Offset to resume from if the transaction was included
        included_offset: usize,
        confirmed_records: usize,
        /// Best-effort entity count queried after the failure
        reported_count: Option<u64>,
        expected_if_included: u64,
        #[source]
        source: Box<DeploymentError>,
    },

    #[error(
        "migration aborted by operator after {confirmed_records} records; \
         resume from offset {resume_offset}"
    )]
    OperatorAborted {
        confirmed_records: usize,
        resume_offset: usize,
    },

    #[error("operator gate failed: {0}")]
    Gate(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StateError),
}

impl DeploymentError {
    pub(crate) fn submission(context: impl Into<String>, source: ChainError) -> Self {
        DeploymentError::Submission {
            context: context.into(),
            source,
        }
    }

    /// Operator-facing failure category
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeploymentError::Configuration(_)
            | DeploymentError::MissingDependency { .. }
            | DeploymentError::Ledger(_) => ErrorKind::Configuration,
            DeploymentError::UnorderedInput { .. } => ErrorKind::UnorderedInput,
            DeploymentError::Submission { .. }
            | DeploymentError::Reverted { .. }
            | DeploymentError::MissingContractAddress { .. } => ErrorKind::Submission,
            DeploymentError::BatchFailed { source, .. } => source.kind(),
            DeploymentError::BatchUnconfirmed { .. } => ErrorKind::Submission,
            DeploymentError::OperatorAborted { .. } | DeploymentError::Gate(_) => {
                ErrorKind::Aborted
            }
            DeploymentError::Store(StateError::Malformed { .. })
            | DeploymentError::Store(StateError::InvalidEnvironment(_))
            | DeploymentError::Store(StateError::LeaseHeld { .. }) => ErrorKind::Configuration,
            DeploymentError::Store(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for deployment operations.
pub type Result<T> = std::result::Result<T, DeploymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failure_kind_follows_cause() {
        let err = DeploymentError::BatchFailed {
            batch_index: 1,
            resume_offset: 100,
            confirmed_records: 100,
            source: Box::new(DeploymentError::submission(
                "batch 1",
                ChainError::Transport("connection reset".into()),
            )),
        };
        assert_eq!(err.kind(), ErrorKind::Submission);
        assert!(err.to_string().contains("resume from offset 100"));
    }

    #[test]
    fn test_unconfirmed_batch_names_both_resume_points() {
        let err = DeploymentError::BatchUnconfirmed {
            batch_index: 1,
            tx_hash: TxHash("0xabc".into()),
            resume_offset: 200,
            included_offset: 300,
            confirmed_records: 100,
            reported_count: None,
            expected_if_included: 300,
            source: Box::new(DeploymentError::submission(
                "batch 1",
                ChainError::Timeout {
                    tx_hash: TxHash("0xabc".into()),
                    waited_secs: 600,
                },
            )),
        };
        assert_eq!(err.kind(), ErrorKind::Submission);
        let message = err.to_string();
        assert!(message.contains("entity count is unknown, 300 if the batch was included"));
        assert!(message.contains("resume from offset 300 if it was included, 200 if not"));
    }

    #[test]
    fn test_malformed_ledger_is_configuration() {
        let err = DeploymentError::from(StateError::Malformed {
            path: "deploys/mainnet.json".into(),
            reason: "expected value".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
