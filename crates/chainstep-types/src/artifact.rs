//! Artifact keys and references
//!
//! The set of artifacts a plan can produce is closed: a key that is not
//! listed here is a configuration error wherever it appears.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of an artifact recorded in the ledger document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactKey {
    #[serde(rename = "master")]
    Master,
    #[serde(rename = "uri")]
    Uri,
    #[serde(rename = "governorInitializer")]
    GovernorInitializer,
    #[serde(rename = "timestamp")]
    Timestamp,
    #[serde(rename = "jurisdictions")]
    Jurisdictions,
}

impl ArtifactKey {
    /// All known keys, in ledger document order
    pub const ALL: [ArtifactKey; 5] = [
        ArtifactKey::Master,
        ArtifactKey::Uri,
        ArtifactKey::GovernorInitializer,
        ArtifactKey::Timestamp,
        ArtifactKey::Jurisdictions,
    ];

    /// JSON name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKey::Master => "master",
            ArtifactKey::Uri => "uri",
            ArtifactKey::GovernorInitializer => "governorInitializer",
            ArtifactKey::Timestamp => "timestamp",
            ArtifactKey::Jurisdictions => "jurisdictions",
        }
    }

    /// Whether the key holds an ordered list of references
    pub fn is_list(&self) -> bool {
        matches!(self, ArtifactKey::Jurisdictions)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for names outside the known artifact set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown artifact: {0}")]
pub struct UnknownArtifact(pub String);

impl FromStr for ArtifactKey {
    type Err = UnknownArtifact;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownArtifact(s.to_string()))
    }
}

/// A persisted artifact reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactRef {
    Single(Address),
    List(Vec<Address>),
}

impl ArtifactRef {
    /// JSON form used when the reference is passed as a call argument
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArtifactRef::Single(addr) => serde_json::Value::String(addr.to_string()),
            ArtifactRef::List(addrs) => serde_json::Value::Array(
                addrs
                    .iter()
                    .map(|a| serde_json::Value::String(a.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn as_single(&self) -> Option<&Address> {
        match self {
            ArtifactRef::Single(addr) => Some(addr),
            ArtifactRef::List(_) => None,
        }
    }

    /// Addresses held by the reference, in order
    pub fn addresses(&self) -> Vec<&Address> {
        match self {
            ArtifactRef::Single(addr) => vec![addr],
            ArtifactRef::List(addrs) => addrs.iter().collect(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRef::Single(addr) => write!(f, "{}", addr),
            ArtifactRef::List(addrs) => {
                let joined: Vec<&str> = addrs.iter().map(|a| a.as_str()).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}
