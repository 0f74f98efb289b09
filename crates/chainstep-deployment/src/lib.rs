//! chainstep Deployment Engine
//!
//! Applies a deployment plan and bulk record migrations onto an append-only
//! ledger, checkpointing every confirmed result in the environment's ledger
//! document.
//!
//! ## Architectural Boundaries
//!
//! - `chainstep-state` owns: persisting ledger documents (called BY this crate)
//! - `chainstep-deployment` owns: deciding what is already done, sequencing
//!   external calls, batch migration, verification triggering
//! - the chain client and verification backend are external collaborators,
//!   reached only through the [`ChainClient`] and [`VerificationBackend`] traits
//!
//! ## Key Principle
//!
//! The ledger document is the only record of completion. A step whose
//! artifact is already ledgered is never executed again, and every confirmed
//! result is persisted before the next external call is made.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use chainstep_deployment::{MockChainClient, Plan, StepDescriptor, StepRunner};
//! use chainstep_state::{InMemoryLedgerStore, LedgerStore};
//! use chainstep_types::Environment;
//!
//! # async fn example(descriptors: Vec<StepDescriptor>) -> chainstep_deployment::Result<()> {
//! let env = Environment::new("localhost", 31337);
//! let store = Arc::new(InMemoryLedgerStore::new());
//! let chain = Arc::new(MockChainClient::new());
//!
//! let plan = Plan::new(descriptors)?;
//! let runner = StepRunner::new(env.clone(), chain, store.clone());
//! let ledger = store.load_or_default(&env).await?;
//! let (_ledger, report) = runner.run_plan(&plan, ledger).await?;
//! println!("{} steps deployed", report.deployed_count());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod chain;
pub mod error;
pub mod migration;
pub mod mock;
pub mod plan;
pub mod runner;
pub mod verification;

// Re-exports
pub use chain::{
    AccountInfo, CallRequest, ChainClient, ChainError, DeployRequest, PendingTransaction,
    ReadQuery, Receipt, TxHash,
};
pub use error::{DeploymentError, ErrorKind, Result};
pub use migration::{
    partition, validate_ordering, Batch, BatchOutcome, BatchPayload, BatchStatus,
    ConsistencyWarning, GateCheckpoint, GateDecision, MigrationConfig, MigrationEngine,
    MigrationReport, MigrationTarget, MockOperatorGate, OperatorGate,
};
pub use mock::MockChainClient;
pub use plan::{ArgSource, CallCheck, Completion, Plan, Step, StepAction, StepDescriptor};
pub use runner::{CheckOutcome, PipelineReport, ReadBack, StepOutcome, StepReport, StepRunner};
pub use verification::{
    MockVerificationBackend, VerificationBackend, VerificationError, VerificationOutcome,
    VerificationRequest, VerificationTrigger,
};
