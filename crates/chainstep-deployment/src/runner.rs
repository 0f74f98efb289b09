//! Idempotent step runner
//!
//! Executes plan steps against the chain client, consulting the ledger first
//! and persisting every confirmed result before the next external call.

use chainstep_state::LedgerStore;
use chainstep_types::{Address, ArtifactKey, ArtifactRef, Environment, LedgerDocument, Wei};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::chain::{confirm, values_match, CallRequest, ChainClient, DeployRequest, ReadQuery, Receipt};
use crate::error::{DeploymentError, Result};
use crate::plan::{resolve_all, resolve_expectations, ArgSource, CallCheck, Completion, Plan, Step, StepAction};
use crate::verification::{VerificationOutcome, VerificationRequest, VerificationTrigger};

/// Result of a read-back query
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Matched,
    Mismatch { expected: Value, actual: Value },
    /// Report-only check; `Null` when the query failed
    Observed { value: Value },
}

impl CheckOutcome {
    fn warning(&self) -> Option<String> {
        match self {
            CheckOutcome::Mismatch { expected, actual } => {
                Some(format!("expected {}, got {}", expected, actual))
            }
            _ => None,
        }
    }
}

/// A read-back against one freshly deployed contract
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBack {
    pub address: Address,
    pub method: String,
    pub outcome: CheckOutcome,
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Already complete in the ledger; nothing was submitted
    Skipped { reference: Option<ArtifactRef> },
    /// New contracts were deployed and ledgered
    Deployed {
        reference: ArtifactRef,
        receipts: Vec<Receipt>,
        verifications: Vec<(Address, VerificationOutcome)>,
        checks: Vec<ReadBack>,
    },
    /// A call step was confirmed and recorded
    Called {
        receipt: Receipt,
        check: Option<CheckOutcome>,
    },
}

impl StepOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped { .. })
    }

    pub fn receipts(&self) -> &[Receipt] {
        match self {
            StepOutcome::Skipped { .. } => &[],
            StepOutcome::Deployed { receipts, .. } => receipts,
            StepOutcome::Called { receipt, .. } => std::slice::from_ref(receipt),
        }
    }

    /// Operator-facing warnings (failed verification, check mismatch)
    pub fn warnings(&self) -> Vec<String> {
        match self {
            StepOutcome::Skipped { .. } => Vec::new(),
            StepOutcome::Deployed {
                verifications, checks, ..
            } => verifications
                .iter()
                .filter_map(|(address, outcome)| match outcome {
                    VerificationOutcome::Verified => None,
                    VerificationOutcome::Mismatch { reason } => {
                        Some(format!("verification of {} rejected: {}", address, reason))
                    }
                    VerificationOutcome::Unreachable { reason } => {
                        Some(format!("verification of {} not completed: {}", address, reason))
                    }
                })
                .chain(checks.iter().filter_map(|c| {
                    c.outcome
                        .warning()
                        .map(|w| format!("check {} on {} failed: {}", c.method, c.address, w))
                }))
                .collect(),
            StepOutcome::Called { check, .. } => check
                .as_ref()
                .and_then(CheckOutcome::warning)
                .map(|w| format!("check failed: {}", w))
                .into_iter()
                .collect(),
        }
    }
}

/// One step in a pipeline report
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

/// Summary of a full plan run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineReport {
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_skipped()).count()
    }

    /// Steps that did work in this run
    pub fn deployed_count(&self) -> usize {
        self.steps.len() - self.skipped_count()
    }

    pub fn total_gas(&self) -> u64 {
        self.steps
            .iter()
            .flat_map(|s| s.outcome.receipts())
            .map(|r| r.gas_used)
            .sum()
    }

    pub fn total_cost(&self, reference_price: Wei) -> Wei {
        self.steps
            .iter()
            .flat_map(|s| s.outcome.receipts())
            .fold(Wei::ZERO, |acc, r| acc + r.cost(reference_price))
    }

    pub fn warnings(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| {
                s.outcome
                    .warnings()
                    .into_iter()
                    .map(move |w| format!("{}: {}", s.name, w))
            })
            .collect()
    }
}

/// Runs steps against one environment
pub struct StepRunner {
    environment: Environment,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    verification: Option<VerificationTrigger>,
}

impl StepRunner {
    pub fn new(environment: Environment, chain: Arc<dyn ChainClient>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            environment,
            chain,
            store,
            verification: None,
        }
    }

    /// Submit fresh deployments for verification
    pub fn with_verification(mut self, trigger: Option<VerificationTrigger>) -> Self {
        self.verification = trigger;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Run every step of the plan in order
    ///
    /// Dependencies are checked against the ledger before anything is
    /// submitted. A failing step aborts the run; everything confirmed before
    /// it is already persisted.
    #[instrument(skip(self, plan, ledger), fields(environment = %self.environment, steps = plan.len()))]
    pub async fn run_plan(&self, plan: &Plan, ledger: LedgerDocument) -> Result<(LedgerDocument, PipelineReport)> {
        plan.check_dependencies(&ledger)?;

        info!(pending = plan.pending(&ledger).count(), "Starting deployment run");
        let mut ledger = ledger;
        let mut report = PipelineReport::default();
        for step in plan.steps() {
            let (next, outcome) = self.run(step, ledger).await?;
            ledger = next;
            report.steps.push(StepReport {
                name: step.name().to_string(),
                outcome,
            });
        }

        info!(
            deployed = report.deployed_count(),
            skipped = report.skipped_count(),
            total_gas = report.total_gas(),
            "Deployment run complete"
        );
        Ok((ledger, report))
    }

    /// Run one step, skipping it if the ledger already proves it complete
    #[instrument(skip(self, step, ledger), fields(step = %step.name()))]
    pub async fn run(&self, step: &Step, ledger: LedgerDocument) -> Result<(LedgerDocument, StepOutcome)> {
        if step.is_complete(&ledger) {
            let reference = step.produces().and_then(|key| ledger.artifact(key));
            match &reference {
                Some(r) => info!(reference = %r, "Already deployed, skipping"),
                None => info!("Already applied, skipping"),
            }
            return Ok((ledger, StepOutcome::Skipped { reference }));
        }

        match (step.action(), step.completion()) {
            (StepAction::Deploy { contract, args, checks }, Completion::Artifact(key)) => {
                self.deploy_single(step.name(), *key, contract, args, checks, ledger, ArtifactWrite::Record)
                    .await
            }
            (StepAction::DeployEach { contract, instances, checks }, Completion::Artifact(key)) => {
                self.deploy_each(step.name(), *key, contract, instances, checks, ledger).await
            }
            (StepAction::Call { target, method, args, check }, Completion::Call(name)) => {
                self.call(name, *target, method, args, check.as_ref(), ledger).await
            }
            _ => Err(DeploymentError::Configuration(format!(
                "step {} has an inconsistent definition",
                step.name()
            ))),
        }
    }

    /// Deploy the step again and overwrite its ledgered address
    ///
    /// This is the only path that replaces an existing artifact. Call steps
    /// of `plan` that read the artifact lose their ledger marker in the same
    /// save, so the next [`run_plan`](Self::run_plan) applies them again
    /// against the new address; their names are returned.
    #[instrument(skip(self, plan, step, ledger), fields(step = %step.name()))]
    pub async fn redeploy(
        &self,
        plan: &Plan,
        step: &Step,
        ledger: LedgerDocument,
    ) -> Result<(LedgerDocument, StepOutcome, Vec<String>)> {
        match (step.action(), step.completion()) {
            (StepAction::Deploy { contract, args, checks }, Completion::Artifact(key)) => {
                let deps = step.dependencies();
                if let Some(missing) = deps.into_iter().find(|k| !ledger.contains(*k)) {
                    return Err(DeploymentError::MissingDependency {
                        step: step.name().to_string(),
                        artifact: missing,
                    });
                }
                let stale: Vec<String> = plan
                    .calls_reading(*key)
                    .map(|s| s.name().to_string())
                    .filter(|name| ledger.has_call(name))
                    .collect();
                let (ledger, outcome) = self
                    .deploy_single(
                        step.name(),
                        *key,
                        contract,
                        args,
                        checks,
                        ledger,
                        ArtifactWrite::Replace { invalidates: &stale },
                    )
                    .await?;
                if !stale.is_empty() {
                    warn!(calls = ?stale, "Calls reading the replaced artifact will be applied again");
                }
                Ok((ledger, outcome, stale))
            }
            _ => Err(DeploymentError::Configuration(format!(
                "only single deploy steps can be redeployed; {} is not one",
                step.name()
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn deploy_single(
        &self,
        name: &str,
        key: ArtifactKey,
        contract: &str,
        args: &[ArgSource],
        checks: &[CallCheck],
        mut ledger: LedgerDocument,
        write: ArtifactWrite<'_>,
    ) -> Result<(LedgerDocument, StepOutcome)> {
        let constructor_args = resolve_all(name, args, &ledger)?;
        let expected = resolve_expectations(name, checks, &ledger)?;
        let (address, receipt) = self.deploy_contract(name, contract, &constructor_args).await?;

        let reference = ArtifactRef::Single(address.clone());
        match write {
            ArtifactWrite::Record => ledger.record(key, reference.clone())?,
            ArtifactWrite::Replace { invalidates } => {
                if let Some(previous) = ledger.replace(key, reference.clone())? {
                    warn!(previous = %previous, address = %address, "Replaced ledgered artifact");
                }
                for call in invalidates {
                    ledger.unmark_call(call);
                }
            }
        }
        let ledger = self.store.save(&self.environment, &ledger).await?;
        info!(address = %address, gas_used = receipt.gas_used, "Deployed and ledgered");

        let read_backs = self.read_backs(name, &address, checks, &expected).await;
        let mut verifications = Vec::new();
        if let Some(outcome) = self.verify(&address, contract, constructor_args).await {
            verifications.push((address, outcome));
        }
        Ok((
            ledger,
            StepOutcome::Deployed {
                reference,
                receipts: vec![receipt],
                verifications,
                checks: read_backs,
            },
        ))
    }

    async fn deploy_each(
        &self,
        name: &str,
        key: ArtifactKey,
        contract: &str,
        instances: &[Vec<ArgSource>],
        checks: &[CallCheck],
        mut ledger: LedgerDocument,
    ) -> Result<(LedgerDocument, StepOutcome)> {
        let done = ledger.list_len(key);
        if done > 0 {
            info!(done, total = instances.len(), "Resuming partially deployed list");
        }
        let expected = resolve_expectations(name, checks, &ledger)?;

        let mut receipts = Vec::new();
        let mut verifications = Vec::new();
        let mut read_backs = Vec::new();
        for (index, args) in instances.iter().enumerate().skip(done) {
            let constructor_args = resolve_all(name, args, &ledger)?;
            let context = format!("{}[{}]", name, index);
            let (address, receipt) = self.deploy_contract(&context, contract, &constructor_args).await?;

            ledger.append(key, address.clone())?;
            ledger = self.store.save(&self.environment, &ledger).await?;
            info!(index, address = %address, gas_used = receipt.gas_used, "Deployed and ledgered list entry");
            receipts.push(receipt);

            read_backs.extend(self.read_backs(&context, &address, checks, &expected).await);
            if let Some(outcome) = self.verify(&address, contract, constructor_args).await {
                verifications.push((address, outcome));
            }
        }

        let reference = ledger
            .artifact(key)
            .unwrap_or_else(|| ArtifactRef::List(Vec::new()));
        Ok((
            ledger,
            StepOutcome::Deployed {
                reference,
                receipts,
                verifications,
                checks: read_backs,
            },
        ))
    }

    async fn call(
        &self,
        name: &str,
        target: ArtifactKey,
        method: &str,
        args: &[ArgSource],
        check: Option<&CallCheck>,
        mut ledger: LedgerDocument,
    ) -> Result<(LedgerDocument, StepOutcome)> {
        let target_address = self.single_address(name, target, &ledger)?;
        let request = CallRequest {
            target: target_address.clone(),
            method: method.to_string(),
            args: resolve_all(name, args, &ledger)?,
        };
        let expected = match check.and_then(|c| c.expect.as_ref()) {
            Some(expect) => Some(expect.resolve(name, &ledger)?),
            None => None,
        };

        debug!(to = %target_address, method, "Submitting call");
        let pending = self
            .chain
            .send(&request)
            .await
            .map_err(|e| DeploymentError::submission(name, e))?;
        let receipt = confirm(self.chain.as_ref(), &pending, name).await?;

        ledger.mark_call(name);
        let ledger = self.store.save(&self.environment, &ledger).await?;
        info!(tx_hash = %receipt.tx_hash, gas_used = receipt.gas_used, "Call confirmed and ledgered");

        let check = match check {
            Some(check) => Some(self.read_back(name, &target_address, check, expected).await),
            None => None,
        };
        Ok((ledger, StepOutcome::Called { receipt, check }))
    }

    async fn read_backs(
        &self,
        name: &str,
        address: &Address,
        checks: &[CallCheck],
        expected: &[Option<Value>],
    ) -> Vec<ReadBack> {
        let mut read_backs = Vec::with_capacity(checks.len());
        for (check, expected) in checks.iter().zip(expected) {
            let outcome = self.read_back(name, address, check, expected.clone()).await;
            read_backs.push(ReadBack {
                address: address.clone(),
                method: check.method.clone(),
                outcome,
            });
        }
        read_backs
    }

    async fn read_back(&self, name: &str, target: &Address, check: &CallCheck, expected: Option<Value>) -> CheckOutcome {
        let query = ReadQuery {
            target: target.clone(),
            method: check.method.clone(),
            args: Vec::new(),
        };
        let result = self.chain.query(&query).await;
        if let Err(e) = &result {
            warn!(step = name, method = %check.method, error = %e, "Check query failed");
        }
        let actual = result.unwrap_or(Value::Null);
        match expected {
            None => {
                info!(step = name, method = %check.method, value = %actual, "Read back");
                CheckOutcome::Observed { value: actual }
            }
            Some(expected) if values_match(&actual, &expected) => CheckOutcome::Matched,
            Some(expected) => {
                warn!(step = name, method = %check.method, expected = %expected, actual = %actual, "Check mismatch");
                CheckOutcome::Mismatch { expected, actual }
            }
        }
    }

    async fn deploy_contract(&self, context: &str, contract: &str, constructor_args: &[Value]) -> Result<(Address, Receipt)> {
        let request = DeployRequest {
            contract: contract.to_string(),
            constructor_args: constructor_args.to_vec(),
        };
        debug!(contract, "Submitting deployment");
        let pending = self
            .chain
            .deploy(&request)
            .await
            .map_err(|e| DeploymentError::submission(context, e))?;
        let receipt = confirm(self.chain.as_ref(), &pending, context).await?;
        let address = receipt
            .contract_address
            .clone()
            .ok_or_else(|| DeploymentError::MissingContractAddress {
                step: context.to_string(),
                tx_hash: receipt.tx_hash.clone(),
            })?;
        Ok((address, receipt))
    }

    async fn verify(&self, address: &Address, contract: &str, constructor_args: Vec<Value>) -> Option<VerificationOutcome> {
        let trigger = self.verification.as_ref()?;
        let request = VerificationRequest {
            address: address.clone(),
            contract: contract.to_string(),
            constructor_args,
        };
        Some(trigger.verify(&request).await)
    }

    fn single_address(&self, step: &str, key: ArtifactKey, ledger: &LedgerDocument) -> Result<Address> {
        match ledger.artifact(key) {
            Some(ArtifactRef::Single(address)) => Ok(address),
            Some(ArtifactRef::List(_)) => Err(DeploymentError::Configuration(format!(
                "step {} targets list artifact {}",
                step, key
            ))),
            None => Err(DeploymentError::MissingDependency {
                step: step.to_string(),
                artifact: key,
            }),
        }
    }
}

/// How a deploy step writes its artifact
enum ArtifactWrite<'a> {
    Record,
    /// Overwrite the artifact and drop the markers of calls reading it
    Replace { invalidates: &'a [String] },
}
