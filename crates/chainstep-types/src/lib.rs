//! chainstep Types - Core types for checkpointed ledger deployments
//!
//! chainstep applies a plan of deployment steps and bulk record migrations
//! onto an append-only ledger, recording every confirmed result in a
//! per-environment ledger document so that an interrupted run can be resumed.
//!
//! ## Key Concepts
//!
//! - **Environment**: A named deployment target with its own ledger document
//! - **ArtifactKey**: The closed set of artifacts a plan can produce
//! - **LedgerDocument**: Typed record of everything already done in an environment
//! - **MigrationRecord**: One off-chain entity to be replayed onto the ledger
//! - **Wei**: Native currency amounts used for balances and cost accounting

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod address;
pub mod artifact;
pub mod environment;
pub mod ledger;
pub mod migration;
pub mod wei;

// Re-export main types
pub use address::{Address, AddressError};
pub use artifact::{ArtifactKey, ArtifactRef, UnknownArtifact};
pub use environment::Environment;
pub use ledger::{LedgerDocument, LedgerError};
pub use migration::{CategoryTable, DatasetError, MigrationDataset, MigrationRecord, RawMigrationRecord};
pub use wei::Wei;
