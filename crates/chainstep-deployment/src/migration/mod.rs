//! Batch migration engine
//!
//! Replays an ordered dataset of records onto the ledger in bounded batches.
//! Each batch is one transaction; its confirmation is checkpointed in the
//! ledger document, and an operator gate decides whether the next batch is
//! submitted.

mod batch;
mod engine;
mod gate;

pub use batch::{partition, Batch, BatchPayload, BatchStatus};
pub use engine::{
    validate_ordering, BatchOutcome, ConsistencyWarning, MigrationConfig, MigrationEngine,
    MigrationReport, MigrationTarget,
};
pub use gate::{GateCheckpoint, GateDecision, MockOperatorGate, OperatorGate};
