//! Explicit re-verification of a ledgered artifact

use super::{invalid, Context};
use crate::error::{CliError, CliResult};
use crate::output::{print_success, print_warning};
use chainstep_deployment::{StepAction, VerificationOutcome, VerificationRequest};
use chainstep_state::LedgerStore;
use chainstep_types::{ArtifactKey, ArtifactRef};
use std::str::FromStr;

/// Execute the verify command
pub async fn execute(ctx: &Context, artifact: &str) -> CliResult<()> {
    let key = ArtifactKey::from_str(artifact).map_err(|e| invalid(e.to_string()))?;
    let plan = ctx.config.plan()?;
    let step = plan
        .steps()
        .iter()
        .find(|s| s.produces() == Some(key))
        .ok_or_else(|| invalid(format!("no deploy step produces {}", key)))?;
    let StepAction::Deploy { contract, args, .. } = step.action() else {
        return Err(invalid(format!("{} is a list artifact; verify its entries individually", key)));
    };

    let (env, settings) = ctx.network()?;
    if env.is_local() {
        print_warning(&format!("{} is a local environment; nothing to verify", env.name));
        return Ok(());
    }
    let ledger = ctx.store().load_or_default(&env).await?;
    let address = match ledger.artifact(key) {
        Some(ArtifactRef::Single(address)) => address,
        _ => return Err(invalid(format!("{} is not in the ledger for {}", key, env.name))),
    };
    let constructor_args = args
        .iter()
        .map(|arg| arg.resolve(step.name(), &ledger))
        .collect::<Result<Vec<_>, _>>()?;

    let trigger = ctx.verification(&env, settings)?.ok_or_else(|| {
        CliError::Config(format!("no verifier configured for {}", env.name))
    })?;
    let outcome = trigger
        .verify(&VerificationRequest {
            address: address.clone(),
            contract: contract.clone(),
            constructor_args,
        })
        .await;

    match outcome {
        VerificationOutcome::Verified => print_success(&format!("{} ({}) verified", key, address)),
        VerificationOutcome::Mismatch { reason } => {
            print_warning(&format!("Verification of {} rejected: {}", address, reason))
        }
        VerificationOutcome::Unreachable { reason } => {
            print_warning(&format!("Verification of {} not completed: {}", address, reason))
        }
    }
    Ok(())
}
