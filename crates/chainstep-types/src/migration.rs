//! Migration records and datasets
//!
//! A dataset is the externally supplied list of entities to replay onto the
//! ledger. Ordering is not checked here; the migration engine validates it
//! before anything is submitted.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One entity to be migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Ordering key (creation time in the source system)
    pub key: u64,
    /// Owner / controller of the entity
    pub controller: Address,
    /// Category code understood by the target contract
    pub category: u32,
    /// Display name
    pub name: String,
}

/// Maps category labels found in datasets to on-ledger codes
pub type CategoryTable = BTreeMap<String, u32>;

/// Numeric field that may arrive as a JSON number or a numeric string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

/// Record as it appears in a dataset file, before labels are resolved
#[derive(Debug, Clone, Deserialize)]
pub struct RawMigrationRecord {
    key: NumberOrText,
    controller: Address,
    category: NumberOrText,
    name: String,
}

/// Dataset loading errors
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("malformed dataset: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record {index}: ordering key is not numeric: {value}")]
    InvalidKey { index: usize, value: String },

    #[error("record {index}: unknown category label: {label}")]
    UnknownCategory { index: usize, label: String },
}

/// Dataset file layout
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationDataset {
    #[serde(default)]
    pub records: Vec<RawMigrationRecord>,
}

impl MigrationDataset {
    /// Parse a dataset document and resolve it into records
    pub fn parse(raw: &str, categories: &CategoryTable) -> Result<Vec<MigrationRecord>, DatasetError> {
        let dataset: MigrationDataset = serde_json::from_str(raw)?;
        dataset.resolve(categories)
    }

    /// Resolve numeric strings and category labels, preserving input order
    pub fn resolve(self, categories: &CategoryTable) -> Result<Vec<MigrationRecord>, DatasetError> {
        self.records
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let key = match raw.key {
                    NumberOrText::Number(n) => n,
                    NumberOrText::Text(text) => text
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| DatasetError::InvalidKey { index, value: text })?,
                };
                let category = match raw.category {
                    NumberOrText::Number(n) => u32::try_from(n).map_err(|_| {
                        DatasetError::UnknownCategory {
                            index,
                            label: n.to_string(),
                        }
                    })?,
                    NumberOrText::Text(label) => match label.trim().parse::<u32>() {
                        Ok(code) => code,
                        Err(_) => *categories
                            .get(&label)
                            .ok_or(DatasetError::UnknownCategory { index, label })?,
                    },
                };
                Ok(MigrationRecord {
                    key,
                    controller: raw.controller,
                    category,
                    name: raw.name,
                })
            })
            .collect()
    }
}
