//! # chainstep State - Durable Deployment Ledger Storage
//!
//! Persists one [`LedgerDocument`](chainstep_types::LedgerDocument) per
//! environment. The store is pure storage: it never talks to the network and
//! holds no deployment logic.
//!
//! ## Guarantees
//!
//! - A missing document is a normal first-run condition, reported as `Ok(None)`
//! - Saving is read-merge-write: keys already on disk and absent from the
//!   saved document survive
//! - The file backend writes a sibling temporary file and renames it over the
//!   document, so a crash mid-write never leaves a truncated ledger
//! - [`FileLedgerStore::acquire_lease`] takes an exclusive per-environment
//!   lease file so two runs cannot target one environment at once
//!
//! ## Example
//!
//! ```rust,no_run
//! use chainstep_state::{FileLedgerStore, LedgerStore};
//! use chainstep_types::Environment;
//!
//! # async fn example() -> chainstep_state::Result<()> {
//! let store = FileLedgerStore::new("deploys");
//! let env = Environment::new("sepolia", 11155111);
//!
//! let _lease = store.acquire_lease(&env)?;
//! let document = store.load_or_default(&env).await?;
//! store.save(&env, &document).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lease;
pub mod storage;

pub use error::{Result, StateError};
pub use lease::LedgerLease;
pub use storage::{FileLedgerStore, InMemoryLedgerStore, LedgerStore};
