//! Operator gate between batches

use async_trait::async_trait;
use chainstep_types::Wei;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Result;

/// Progress shown to the operator after a confirmed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateCheckpoint {
    /// Zero-based index of the batch just confirmed
    pub batch_index: usize,
    pub batches_total: usize,
    pub records_confirmed: usize,
    pub records_total: usize,
    pub gas_used: u64,
    pub cost: Wei,
    pub total_cost: Wei,
}

/// Operator decision at a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Abort,
}

/// Decides whether the next batch is submitted
///
/// The engine awaits `confirm` between batches and submits nothing while it
/// is pending. Production gates block on operator input.
#[async_trait]
pub trait OperatorGate: Send + Sync {
    async fn confirm(&self, checkpoint: &GateCheckpoint) -> Result<GateDecision>;
}

/// Gate that answers immediately, for tests
#[derive(Debug, Default)]
pub struct MockOperatorGate {
    abort_at: Option<usize>,
    checkpoints: Mutex<Vec<GateCheckpoint>>,
}

impl MockOperatorGate {
    /// Always proceed
    pub fn proceeding() -> Self {
        Self::default()
    }

    /// Abort on the `call`-th invocation (zero-based)
    pub fn aborting_at(call: usize) -> Self {
        Self {
            abort_at: Some(call),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.checkpoints.lock().len()
    }

    pub fn checkpoints(&self) -> Vec<GateCheckpoint> {
        self.checkpoints.lock().clone()
    }
}

#[async_trait]
impl OperatorGate for MockOperatorGate {
    async fn confirm(&self, checkpoint: &GateCheckpoint) -> Result<GateDecision> {
        let mut checkpoints = self.checkpoints.lock();
        let call = checkpoints.len();
        checkpoints.push(checkpoint.clone());
        if self.abort_at == Some(call) {
            Ok(GateDecision::Abort)
        } else {
            Ok(GateDecision::Proceed)
        }
    }
}
