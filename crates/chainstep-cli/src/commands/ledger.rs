//! Ledger document inspection

use super::Context;
use crate::error::CliResult;
use crate::output::{self, print_info, print_warning, OutputFormat};
use chainstep_state::LedgerStore;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

/// Ledger subcommands
#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Show the ledger document of the environment
    Show,
}

/// Table row for ledger display
#[derive(Debug, Serialize, Tabled)]
struct ArtifactRow {
    artifact: String,
    reference: String,
}

/// Execute a ledger command
pub async fn execute(command: LedgerCommands, ctx: &Context) -> CliResult<()> {
    match command {
        LedgerCommands::Show => {
            let env = ctx.ledger_environment();
            let store = ctx.store();
            let Some(ledger) = store.load(&env).await? else {
                print_warning(&format!(
                    "No ledger for {} yet ({})",
                    env.name,
                    store.document_path(&env)?.display()
                ));
                return Ok(());
            };

            match ctx.format {
                OutputFormat::Table => {
                    let rows: Vec<ArtifactRow> = ledger
                        .entries()
                        .into_iter()
                        .map(|(key, reference)| ArtifactRow {
                            artifact: key.to_string(),
                            reference: reference.to_string(),
                        })
                        .collect();
                    output::print_output(rows, OutputFormat::Table)?;
                    if !ledger.calls().is_empty() {
                        print_info(&format!("Calls: {}", ledger.calls().join(", ")));
                    }
                    print_info(&format!("Migrated records: {}", ledger.migrated_count()));
                    print_info(&format!("Revision: {}", ledger.revision()));
                    Ok(())
                }
                format => output::print_single(&ledger, format),
            }
        }
    }
}
