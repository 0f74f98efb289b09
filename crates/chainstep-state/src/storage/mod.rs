//! Ledger storage backends.
//!
//! Provides storage abstractions for persisting ledger documents.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileLedgerStore;
pub use memory::InMemoryLedgerStore;
pub use traits::LedgerStore;
