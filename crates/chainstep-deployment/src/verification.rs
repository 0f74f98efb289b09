//! Verification trigger
//!
//! After a contract is newly deployed on a non-local environment, its address
//! and constructor arguments are submitted to a source-verification service.
//! Verification is advisory: every failure becomes a logged outcome and never
//! an error of the deploy step.

use async_trait::async_trait;
use chainstep_types::{Address, Environment};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// What is submitted for verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub address: Address,
    pub contract: String,
    #[serde(default)]
    pub constructor_args: Vec<Value>,
}

/// Result of one verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    Mismatch { reason: String },
    Unreachable { reason: String },
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified)
    }
}

/// Verification backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("verification service unreachable: {0}")]
    Transport(String),

    #[error("verification service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("unexpected verification response: {0}")]
    Decode(String),
}

/// A source-verification service
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Submit a deployed contract; `Verified` means the service accepted it
    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, VerificationError>;
}

/// Submits fresh deployments and turns every failure into an outcome
#[derive(Clone)]
pub struct VerificationTrigger {
    backend: Arc<dyn VerificationBackend>,
    environment: Environment,
}

impl VerificationTrigger {
    /// `None` for local environments, which are never verified
    pub fn for_environment(
        environment: &Environment,
        backend: Arc<dyn VerificationBackend>,
    ) -> Option<Self> {
        if environment.is_local() {
            return None;
        }
        Some(Self {
            backend,
            environment: environment.clone(),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    #[instrument(
        skip(self, request),
        fields(backend = %self.backend.name(), address = %request.address, contract = %request.contract)
    )]
    pub async fn verify(&self, request: &VerificationRequest) -> VerificationOutcome {
        let outcome = match self.backend.submit(request).await {
            Ok(outcome) => outcome,
            Err(e) => VerificationOutcome::Unreachable {
                reason: e.to_string(),
            },
        };
        match &outcome {
            VerificationOutcome::Verified => info!("Contract verified"),
            VerificationOutcome::Mismatch { reason } => {
                warn!(reason = %reason, "Verification rejected; deployment is unaffected")
            }
            VerificationOutcome::Unreachable { reason } => {
                warn!(reason = %reason, "Verification not completed; deployment is unaffected")
            }
        }
        outcome
    }
}

/// Mock verification backend for testing
pub struct MockVerificationBackend {
    response: Result<VerificationOutcome, VerificationError>,
    requests: Mutex<Vec<VerificationRequest>>,
}

impl MockVerificationBackend {
    pub fn verifying() -> Self {
        Self::responding(Ok(VerificationOutcome::Verified))
    }

    pub fn mismatching(reason: &str) -> Self {
        Self::responding(Ok(VerificationOutcome::Mismatch {
            reason: reason.to_string(),
        }))
    }

    pub fn unreachable(reason: &str) -> Self {
        Self::responding(Err(VerificationError::Transport(reason.to_string())))
    }

    fn responding(response: Result<VerificationOutcome, VerificationError>) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl VerificationBackend for MockVerificationBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, VerificationError> {
        self.requests.lock().push(request.clone());
        self.response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> VerificationRequest {
        VerificationRequest {
            address: Address::from_low_u64(0x1000),
            contract: "Master".into(),
            constructor_args: vec![],
        }
    }

    #[test]
    fn test_local_environment_has_no_trigger() {
        let backend = Arc::new(MockVerificationBackend::verifying());
        assert!(VerificationTrigger::for_environment(&Environment::new("localhost", 31337), backend.clone()).is_none());
        assert!(VerificationTrigger::for_environment(&Environment::new("polygon", 137), backend).is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_unreachable() {
        let backend = Arc::new(MockVerificationBackend::unreachable("connection refused"));
        let trigger = VerificationTrigger::for_environment(&Environment::new("mainnet", 1), backend.clone()).unwrap();

        let outcome = trigger.verify(&request()).await;
        assert!(matches!(outcome, VerificationOutcome::Unreachable { ref reason } if reason.contains("connection refused")));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mismatch_is_returned() {
        let backend = Arc::new(MockVerificationBackend::mismatching("bytecode differs"));
        let trigger = VerificationTrigger::for_environment(&Environment::new("mainnet", 1), backend).unwrap();
        assert!(!trigger.verify(&request()).await.is_verified());
    }
}
