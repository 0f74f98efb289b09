//! Console operator gate

use crate::output::{format_amount, print_info};
use async_trait::async_trait;
use chainstep_deployment::{DeploymentError, GateCheckpoint, GateDecision, OperatorGate};
use tracing::debug;

/// Prompts the operator on the terminal between batches
pub struct ConsoleGate {
    currency: String,
}

impl ConsoleGate {
    pub fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
        }
    }

    fn summary(&self, checkpoint: &GateCheckpoint) -> String {
        format!(
            "Batch {}/{} confirmed: {}/{} records, gas {}, cost {} (total {})",
            checkpoint.batch_index + 1,
            checkpoint.batches_total,
            checkpoint.records_confirmed,
            checkpoint.records_total,
            checkpoint.gas_used,
            format_amount(checkpoint.cost, &self.currency),
            format_amount(checkpoint.total_cost, &self.currency),
        )
    }
}

#[async_trait]
impl OperatorGate for ConsoleGate {
    async fn confirm(&self, checkpoint: &GateCheckpoint) -> chainstep_deployment::Result<GateDecision> {
        print_info(&self.summary(checkpoint));
        let prompt = format!("Submit batch {}?", checkpoint.batch_index + 2);

        let proceed = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .unwrap_or_else(|e| {
                    debug!(error = %e, "Gate prompt failed; treating as abort");
                    false
                })
        })
        .await
        .map_err(|e| DeploymentError::Gate(e.to_string()))?;

        Ok(if proceed {
            GateDecision::Proceed
        } else {
            GateDecision::Abort
        })
    }
}
