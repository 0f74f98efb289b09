//! Deployment environments

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain ids of local development networks
const LOCAL_CHAIN_IDS: [u64; 2] = [31337, 1337];

/// A named deployment target with its own ledger document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name; also the ledger file stem
    pub name: String,
    /// Chain id of the network
    pub chain_id: u64,
}

impl Environment {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
        }
    }

    /// Local networks are never submitted for verification
    pub fn is_local(&self) -> bool {
        LOCAL_CHAIN_IDS.contains(&self.chain_id)
    }

    /// Block explorer that serves this chain, if a known one does
    pub fn explorer_name(&self) -> Option<&'static str> {
        match self.chain_id {
            1 => Some("Etherscan"),
            137 => Some("Polygonscan"),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (chain {})", self.name, self.chain_id)
    }
}
