//! Operator account and ledger summary

use super::Context;
use crate::error::CliResult;
use crate::output::{self, format_amount, print_info, OutputFormat};
use chainstep_deployment::ChainClient;
use chainstep_state::LedgerStore;
use serde::Serialize;

/// Status report
#[derive(Debug, Serialize)]
struct StatusView {
    environment: String,
    chain_id: u64,
    operator: String,
    balance: String,
    explorer: Option<String>,
    artifacts: usize,
    calls: usize,
    migrated_count: u64,
    revision: u64,
    updated_at: Option<String>,
}

/// Execute the status command
pub async fn execute(ctx: &Context) -> CliResult<()> {
    let (env, settings) = ctx.network()?;
    let chain = ctx.chain_client(settings)?;
    let account = chain.account().await?;
    let ledger = ctx.store().load_or_default(&env).await?;

    let view = StatusView {
        environment: env.name.clone(),
        chain_id: env.chain_id,
        operator: account.address.to_string(),
        balance: format_amount(account.balance, &settings.currency),
        explorer: env.explorer_name().map(str::to_string),
        artifacts: ledger.entries().len(),
        calls: ledger.calls().len(),
        migrated_count: ledger.migrated_count(),
        revision: ledger.revision(),
        updated_at: ledger.updated_at().map(|t| t.to_rfc3339()),
    };

    match ctx.format {
        OutputFormat::Table => {
            print_info(&format!("Environment: {} (chain {})", view.environment, view.chain_id));
            print_info(&format!("Operator: {}", view.operator));
            print_info(&format!("Balance: {}", view.balance));
            if let Some(explorer) = &view.explorer {
                print_info(&format!("Explorer: {}", explorer));
            }
            print_info(&format!(
                "Ledger: {} artifacts, {} calls, {} migrated records (revision {})",
                view.artifacts, view.calls, view.migrated_count, view.revision
            ));
            Ok(())
        }
        format => output::print_single(&view, format),
    }
}
