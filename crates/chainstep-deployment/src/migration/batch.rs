//! Dataset partitioning

use chainstep_types::{Address, MigrationRecord, Wei};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::Receipt;

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A contiguous slice of the dataset submitted as one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<'a> {
    pub index: usize,
    /// Offset of the first record within the submitted dataset
    pub start: usize,
    pub records: &'a [MigrationRecord],
    pub status: BatchStatus,
    pub gas_used: u64,
    pub cost: Wei,
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offset one past the last record
    pub fn end(&self) -> usize {
        self.start + self.records.len()
    }

    pub fn payload(&self) -> BatchPayload {
        BatchPayload::from_records(self.records)
    }

    pub fn mark_confirmed(&mut self, receipt: &Receipt, reference_price: Wei) {
        self.status = BatchStatus::Confirmed;
        self.gas_used = receipt.gas_used;
        self.cost = receipt.cost(reference_price);
    }

    pub fn mark_failed(&mut self) {
        self.status = BatchStatus::Failed;
    }
}

/// Split `records` into consecutive batches of at most `batch_size`
///
/// Every batch but the last holds exactly `batch_size` records; a
/// `batch_size` of zero is treated as one.
pub fn partition(records: &[MigrationRecord], batch_size: usize) -> Vec<Batch<'_>> {
    let size = batch_size.max(1);
    records
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            start: index * size,
            records: chunk,
            status: BatchStatus::Pending,
            gas_used: 0,
            cost: Wei::ZERO,
        })
        .collect()
}

/// Column-wise call arguments for one batch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchPayload {
    pub categories: Vec<u32>,
    pub controllers: Vec<Address>,
    pub keys: Vec<u64>,
    pub names: Vec<String>,
}

impl BatchPayload {
    pub fn from_records(records: &[MigrationRecord]) -> Self {
        let mut payload = BatchPayload::default();
        for record in records {
            payload.categories.push(record.category);
            payload.controllers.push(record.controller.clone());
            payload.keys.push(record.key);
            payload.names.push(record.name.clone());
        }
        payload
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Arguments in submission order: categories, controllers, keys, names
    pub fn into_args(self) -> Vec<Value> {
        vec![
            Value::from(self.categories),
            Value::Array(
                self.controllers
                    .into_iter()
                    .map(|c| Value::String(c.to_string()))
                    .collect(),
            ),
            Value::from(self.keys),
            Value::from(self.names),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(n: usize) -> Vec<MigrationRecord> {
        (0..n)
            .map(|i| MigrationRecord {
                key: 1_600_000_000 + i as u64,
                controller: Address::from_low_u64(i as u64 + 1),
                category: (i % 3) as u32,
                name: format!("Entity {}", i),
            })
            .collect()
    }

    #[test]
    fn test_partition_sizes() {
        let data = records(250);
        let batches = partition(&data, 100);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(batches[2].start, 200);
        assert_eq!(batches[2].end(), 250);
        assert!(batches.iter().all(|b| b.status == BatchStatus::Pending));
    }

    #[test]
    fn test_partition_exact_multiple() {
        let data = records(200);
        assert_eq!(partition(&data, 100).len(), 2);
        assert_eq!(partition(&data[..100], 100).len(), 1);
        assert!(partition(&[], 100).is_empty());
    }

    #[test]
    fn test_payload_column_order() {
        let data = records(2);
        let args = BatchPayload::from_records(&data).into_args();
        assert_eq!(args.len(), 4);
        assert_eq!(args[0], json!([0, 1]));
        assert_eq!(args[1], json!([Address::from_low_u64(1).to_string(), Address::from_low_u64(2).to_string()]));
        assert_eq!(args[2], json!([1_600_000_000u64, 1_600_000_001u64]));
        assert_eq!(args[3], json!(["Entity 0", "Entity 1"]));
    }

    #[test]
    fn test_mark_confirmed_records_cost() {
        let data = records(1);
        let mut batch = partition(&data, 10).remove(0);
        let receipt = Receipt {
            tx_hash: crate::chain::TxHash("0x01".into()),
            success: true,
            contract_address: None,
            gas_used: 1_000,
            effective_gas_price: None,
        };
        batch.mark_confirmed(&receipt, Wei::from_gwei(50));
        assert_eq!(batch.status, BatchStatus::Confirmed);
        assert_eq!(batch.cost, Wei(1_000 * 50_000_000_000));
    }
}
