//! Deployment plan execution

use super::{confirm_start, invalid, print_account_header, Context};
use crate::error::CliResult;
use crate::output::{self, format_amount, print_error, print_info, print_success, print_warning};
use chainstep_deployment::{CheckOutcome, DeploymentError, PipelineReport, StepOutcome, StepReport, StepRunner};
use chainstep_state::LedgerStore;
use serde::Serialize;
use tabled::Tabled;
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Deploy command flags
pub struct DeployArgs {
    pub redeploy: Option<String>,
    pub skip_verify: bool,
    pub yes: bool,
}

/// Table row for step outcomes
#[derive(Debug, Serialize, Tabled)]
struct StepRow {
    step: String,
    outcome: String,
    reference: String,
    gas: u64,
}

impl From<&StepReport> for StepRow {
    fn from(report: &StepReport) -> Self {
        let (outcome, reference) = match &report.outcome {
            StepOutcome::Skipped { reference } => (
                "skipped",
                reference.as_ref().map(|r| r.to_string()).unwrap_or_default(),
            ),
            StepOutcome::Deployed { reference, .. } => ("deployed", reference.to_string()),
            StepOutcome::Called { receipt, .. } => ("called", receipt.tx_hash.to_string()),
        };
        Self {
            step: report.name.clone(),
            outcome: outcome.to_string(),
            reference,
            gas: report.outcome.receipts().iter().map(|r| r.gas_used).sum(),
        }
    }
}

/// Execute the deploy command
pub async fn execute(ctx: &Context, args: DeployArgs) -> CliResult<()> {
    let plan = ctx.config.plan()?;
    if plan.is_empty() {
        return Err(invalid("the configuration declares no [[steps]]"));
    }
    let (env, settings) = ctx.network()?;
    let store = ctx.store();
    let _lease = store.acquire_lease(&env)?;
    let ledger = store.load_or_default(&env).await?;

    let redeploy = match &args.redeploy {
        Some(name) => Some(
            plan.step(name)
                .ok_or_else(|| invalid(format!("no step named {}", name)))?,
        ),
        None => {
            plan.check_dependencies(&ledger)?;
            None
        }
    };

    let pending = plan.pending(&ledger).count();
    if redeploy.is_none() && pending == 0 {
        print_success(&format!(
            "Nothing to deploy: all {} steps are ledgered for {}",
            plan.len(),
            env.name
        ));
        return Ok(());
    }

    let chain = ctx.chain_client(settings)?;
    print_account_header(chain.as_ref(), &env, settings).await?;
    match redeploy {
        Some(step) => {
            print_warning(&format!(
                "Step {} will be deployed again and its ledgered address replaced",
                step.name()
            ));
            let dependents: Vec<&str> = step
                .produces()
                .into_iter()
                .flat_map(|key| plan.calls_reading(key))
                .filter(|s| ledger.has_call(s.name()))
                .map(|s| s.name())
                .collect();
            if !dependents.is_empty() {
                print_warning(&format!(
                    "Calls reading it will be applied again: {}",
                    dependents.join(", ")
                ));
            }
        }
        None => print_info(&format!("{} of {} steps pending", pending, plan.len())),
    }

    if !args.yes && !confirm_start("Start deployment?") {
        print_error("Aborted");
        return Ok(());
    }

    let trigger = if args.skip_verify {
        None
    } else {
        ctx.verification(&env, settings)?
    };
    let runner = StepRunner::new(env.clone(), chain, store).with_verification(trigger);

    let run_id = Uuid::new_v4();
    let span = info_span!("deploy", run_id = %run_id, environment = %env.name);
    let report = match redeploy {
        Some(step) => {
            async {
                let (mut ledger, outcome, invalidated) = runner.redeploy(&plan, step, ledger).await?;
                let mut report = PipelineReport {
                    steps: vec![StepReport {
                        name: step.name().to_string(),
                        outcome,
                    }],
                };
                for call in plan.steps().iter().filter(|s| invalidated.iter().any(|n| n == s.name())) {
                    let (next, outcome) = runner.run(call, ledger).await?;
                    ledger = next;
                    report.steps.push(StepReport {
                        name: call.name().to_string(),
                        outcome,
                    });
                }
                Ok::<_, DeploymentError>(report)
            }
            .instrument(span)
            .await?
        }
        None => runner.run_plan(&plan, ledger).instrument(span).await?.1,
    };

    let rows: Vec<StepRow> = report.steps.iter().map(StepRow::from).collect();
    output::print_output(rows, ctx.format)?;
    for line in observed_values(&report) {
        print_info(&line);
    }
    for warning in report.warnings() {
        print_warning(&warning);
    }
    let reference_price = ctx.config.migration.engine_config(None).reference_gas_price;
    print_success(&format!(
        "{} deployed, {} skipped, gas {}, cost {}",
        report.deployed_count(),
        report.skipped_count(),
        report.total_gas(),
        format_amount(report.total_cost(reference_price), &settings.currency)
    ));
    Ok(())
}

/// Report-only read-backs, one line each
fn observed_values(report: &PipelineReport) -> Vec<String> {
    let mut lines = Vec::new();
    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Deployed { checks, .. } => {
                for read_back in checks {
                    if let CheckOutcome::Observed { value } = &read_back.outcome {
                        lines.push(format!(
                            "{}: {} on {} = {}",
                            step.name, read_back.method, read_back.address, value
                        ));
                    }
                }
            }
            StepOutcome::Called {
                check: Some(CheckOutcome::Observed { value }),
                ..
            } => lines.push(format!("{}: read back {}", step.name, value)),
            _ => {}
        }
    }
    lines
}
