//! Migration execution loop

use chainstep_state::LedgerStore;
use chainstep_types::{Address, ArtifactKey, Environment, LedgerDocument, MigrationRecord, Wei};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::batch::{partition, Batch};
use super::gate::{GateCheckpoint, GateDecision, OperatorGate};
use crate::chain::{confirm, value_as_u64, CallRequest, ChainClient, ReadQuery, TxHash};
use crate::error::{DeploymentError, Result};

/// Default number of records per batch transaction
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Migration tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub batch_size: usize,
    /// Price used for cost accounting when a receipt carries none
    pub reference_gas_price: Wei,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            reference_gas_price: Wei::from_gwei(50),
        }
    }
}

/// Contract and methods the records are replayed onto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    pub contract: Address,
    pub submit_method: String,
    pub count_method: String,
}

impl MigrationTarget {
    /// Resolve the target contract from a ledgered single artifact
    pub fn from_ledger(
        ledger: &LedgerDocument,
        key: ArtifactKey,
        submit_method: impl Into<String>,
        count_method: impl Into<String>,
    ) -> Result<Self> {
        let contract = ledger
            .artifact(key)
            .and_then(|r| r.as_single().cloned())
            .ok_or_else(|| DeploymentError::MissingDependency {
                step: "migrate".to_string(),
                artifact: key,
            })?;
        Ok(Self {
            contract,
            submit_method: submit_method.into(),
            count_method: count_method.into(),
        })
    }
}

/// A confirmed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub start: usize,
    pub records: usize,
    pub tx_hash: TxHash,
    pub gas_used: u64,
    pub cost: Wei,
}

/// Authoritative count differs from what was expected after the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyWarning {
    pub expected: u64,
    pub reported: u64,
}

/// Summary of a migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Authoritative count before the first batch
    pub pre_existing: u64,
    pub submitted_records: usize,
    pub batches: Vec<BatchOutcome>,
    pub total_gas: u64,
    pub total_cost: Wei,
    /// Authoritative count after the last batch
    pub reported_count: u64,
    pub consistency_warning: Option<ConsistencyWarning>,
}

/// Check that keys never decrease; equal keys are allowed
///
/// On failure, `index` is the offset of the later record of the first
/// inverted pair.
pub fn validate_ordering(records: &[MigrationRecord]) -> Result<()> {
    for (i, pair) in records.windows(2).enumerate() {
        if pair[1].key < pair[0].key {
            return Err(DeploymentError::UnorderedInput {
                index: i + 1,
                previous: pair[0].key,
                key: pair[1].key,
            });
        }
    }
    Ok(())
}

/// Submits record batches for one environment
pub struct MigrationEngine {
    environment: Environment,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    target: MigrationTarget,
    config: MigrationConfig,
}

impl MigrationEngine {
    pub fn new(
        environment: Environment,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn LedgerStore>,
        target: MigrationTarget,
        config: MigrationConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(DeploymentError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            environment,
            chain,
            store,
            target,
            config,
        })
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Current authoritative entity count
    pub async fn entity_count(&self) -> Result<u64> {
        let query = ReadQuery {
            target: self.target.contract.clone(),
            method: self.target.count_method.clone(),
            args: Vec::new(),
        };
        let value = self
            .chain
            .query(&query)
            .await
            .map_err(|e| DeploymentError::submission(&self.target.count_method, e))?;
        value_as_u64(&value).ok_or_else(|| {
            DeploymentError::submission(
                &self.target.count_method,
                crate::chain::ChainError::Decode(format!("count is not an unsigned integer: {}", value)),
            )
        })
    }

    /// Submit `records[start..]` batch by batch
    ///
    /// `records` is the whole dataset; its ordering is validated before
    /// anything is submitted. Every offset this method reports or ledgers is
    /// an absolute dataset position. After each confirmed batch the ledger's
    /// migrated position is persisted; between batches `gate` decides whether
    /// to continue.
    #[instrument(
        skip(self, records, ledger, gate),
        fields(environment = %self.environment, records = records.len(), batch_size = self.config.batch_size)
    )]
    pub async fn migrate(
        &self,
        records: &[MigrationRecord],
        start: usize,
        ledger: LedgerDocument,
        gate: &dyn OperatorGate,
    ) -> Result<(LedgerDocument, MigrationReport)> {
        validate_ordering(records)?;
        let remaining = records.get(start..).ok_or_else(|| {
            DeploymentError::Configuration(format!(
                "offset {} is past the end of the dataset ({} records)",
                start,
                records.len()
            ))
        })?;

        let mut batches = partition(remaining, self.config.batch_size);
        let batches_total = batches.len();
        let pre_existing = self.entity_count().await?;
        info!(pre_existing, batches = batches_total, "Starting migration");

        let mut ledger = ledger;
        let mut outcomes = Vec::with_capacity(batches_total);
        let mut confirmed = 0usize;
        let mut total_gas = 0u64;
        let mut total_cost = Wei::ZERO;

        for batch in batches.iter_mut() {
            let batch_start = start + batch.start;
            let batch_end = start + batch.end();
            let tx_hash = match self.submit(batch).await {
                Ok(tx_hash) => tx_hash,
                Err(SubmitFailure::NotIncluded(source)) => {
                    batch.mark_failed();
                    error!(
                        batch = batch.index,
                        confirmed_records = confirmed,
                        resume_offset = batch_start,
                        error = %source,
                        "Batch failed"
                    );
                    return Err(DeploymentError::BatchFailed {
                        batch_index: batch.index,
                        resume_offset: batch_start,
                        confirmed_records: confirmed,
                        source: Box::new(source),
                    });
                }
                Err(SubmitFailure::Unconfirmed { tx_hash, source }) => {
                    batch.mark_failed();
                    let reported_count = match self.entity_count().await {
                        Ok(count) => Some(count),
                        Err(e) => {
                            warn!(error = %e, "Entity count unavailable after unconfirmed batch");
                            None
                        }
                    };
                    error!(
                        batch = batch.index,
                        tx_hash = %tx_hash,
                        confirmed_records = confirmed,
                        reported_count = ?reported_count,
                        error = %source,
                        "Batch submitted but not confirmed"
                    );
                    return Err(DeploymentError::BatchUnconfirmed {
                        batch_index: batch.index,
                        tx_hash,
                        resume_offset: batch_start,
                        included_offset: batch_end,
                        confirmed_records: confirmed,
                        reported_count,
                        expected_if_included: pre_existing + (confirmed + batch.len()) as u64,
                        source: Box::new(source),
                    });
                }
            };

            confirmed += batch.len();
            total_gas += batch.gas_used;
            total_cost += batch.cost;
            ledger.set_migrated(batch_end as u64);
            ledger = match self.store.save(&self.environment, &ledger).await {
                Ok(saved) => saved,
                Err(e) => {
                    return Err(DeploymentError::BatchFailed {
                        batch_index: batch.index,
                        resume_offset: batch_end,
                        confirmed_records: confirmed,
                        source: Box::new(e.into()),
                    })
                }
            };
            info!(
                batch = batch.index,
                records = batch.len(),
                gas_used = batch.gas_used,
                cost_ether = %batch.cost.format_ether(6),
                confirmed_records = confirmed,
                "Batch confirmed"
            );
            outcomes.push(BatchOutcome {
                index: batch.index,
                start: batch_start,
                records: batch.len(),
                tx_hash,
                gas_used: batch.gas_used,
                cost: batch.cost,
            });

            if batch.index + 1 < batches_total {
                let checkpoint = GateCheckpoint {
                    batch_index: batch.index,
                    batches_total,
                    records_confirmed: confirmed,
                    records_total: remaining.len(),
                    gas_used: batch.gas_used,
                    cost: batch.cost,
                    total_cost,
                };
                if gate.confirm(&checkpoint).await? == GateDecision::Abort {
                    warn!(confirmed_records = confirmed, resume_offset = batch_end, "Migration aborted by operator");
                    return Err(DeploymentError::OperatorAborted {
                        confirmed_records: confirmed,
                        resume_offset: batch_end,
                    });
                }
            }
        }

        let reported_count = self.entity_count().await?;
        let expected = pre_existing + remaining.len() as u64;
        let consistency_warning = if reported_count != expected {
            warn!(expected, reported = reported_count, "Entity count does not match submitted records");
            Some(ConsistencyWarning {
                expected,
                reported: reported_count,
            })
        } else {
            None
        };

        info!(
            submitted = confirmed,
            reported_count,
            total_gas,
            total_cost_ether = %total_cost.format_ether(6),
            "Migration complete"
        );
        Ok((
            ledger,
            MigrationReport {
                pre_existing,
                submitted_records: confirmed,
                batches: outcomes,
                total_gas,
                total_cost,
                reported_count,
                consistency_warning,
            },
        ))
    }

    async fn submit(&self, batch: &mut Batch<'_>) -> std::result::Result<TxHash, SubmitFailure> {
        let context = format!("batch {}", batch.index);
        let request = CallRequest {
            target: self.target.contract.clone(),
            method: self.target.submit_method.clone(),
            args: batch.payload().into_args(),
        };
        let pending = self
            .chain
            .send(&request)
            .await
            .map_err(|e| SubmitFailure::NotIncluded(DeploymentError::submission(&context, e)))?;
        let receipt = match confirm(self.chain.as_ref(), &pending, &context).await {
            Ok(receipt) => receipt,
            // A reverted receipt proves the batch had no effect
            Err(e @ DeploymentError::Reverted { .. }) => return Err(SubmitFailure::NotIncluded(e)),
            Err(source) => {
                return Err(SubmitFailure::Unconfirmed {
                    tx_hash: pending.tx_hash,
                    source,
                })
            }
        };
        batch.mark_confirmed(&receipt, self.config.reference_gas_price);
        Ok(receipt.tx_hash)
    }
}

/// Why a batch did not confirm
enum SubmitFailure {
    /// The batch is known not to be on the ledger
    NotIncluded(DeploymentError),
    /// The transaction was accepted but its outcome is unknown
    Unconfirmed { tx_hash: TxHash, source: DeploymentError },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u64) -> MigrationRecord {
        MigrationRecord {
            key,
            controller: Address::from_low_u64(1),
            category: 0,
            name: format!("Entity {}", key),
        }
    }

    #[test]
    fn test_equal_keys_are_ordered() {
        validate_ordering(&[record(1), record(1), record(2)]).unwrap();
        validate_ordering(&[]).unwrap();
    }

    #[test]
    fn test_inversion_reports_later_index() {
        let err = validate_ordering(&[record(1), record(5), record(3), record(2)]).unwrap_err();
        match err {
            DeploymentError::UnorderedInput { index, previous, key } => {
                assert_eq!((index, previous, key), (2, 5, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        use crate::mock::MockChainClient;
        use chainstep_state::InMemoryLedgerStore;

        let result = MigrationEngine::new(
            Environment::new("localhost", 31337),
            Arc::new(MockChainClient::new()),
            Arc::new(InMemoryLedgerStore::new()),
            MigrationTarget {
                contract: Address::from_low_u64(1),
                submit_method: "createBatchSeries".into(),
                count_method: "seriesCount".into(),
            },
            MigrationConfig {
                batch_size: 0,
                ..MigrationConfig::default()
            },
        );
        assert!(matches!(result, Err(DeploymentError::Configuration(_))));
    }
}
