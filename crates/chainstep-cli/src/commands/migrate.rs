//! Batch migration of a record dataset

use super::{confirm_start, invalid, load_dataset, print_account_header, Context};
use crate::error::CliResult;
use crate::gate::ConsoleGate;
use crate::output::{self, format_amount, print_error, print_info, print_success, print_warning};
use chainstep_deployment::{
    partition, validate_ordering, DeploymentError, MigrationEngine, MigrationTarget,
};
use chainstep_state::LedgerStore;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Migrate command flags
pub struct MigrateArgs {
    pub dataset: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub offset: Option<usize>,
    pub resume: bool,
    pub dry_run: bool,
}

/// Planned batch
#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    batch: usize,
    start: usize,
    records: usize,
    first_key: u64,
    last_key: u64,
}

/// Confirmed batch
#[derive(Debug, Serialize, Tabled)]
struct BatchRow {
    batch: usize,
    start: usize,
    records: usize,
    gas: u64,
    cost: String,
    tx_hash: String,
}

/// Execute the migrate command
pub async fn execute(ctx: &Context, args: MigrateArgs) -> CliResult<()> {
    let path = ctx.dataset_path(args.dataset.as_deref());
    let records = load_dataset(&path, &ctx.config.migration.categories)?;
    validate_ordering(&records)?;
    if records.is_empty() {
        print_success("Nothing to migrate");
        return Ok(());
    }

    let store = ctx.store();
    let lease = if args.dry_run {
        None
    } else {
        Some(store.acquire_lease(&ctx.ledger_environment())?)
    };
    let ledger = store.load_or_default(&ctx.ledger_environment()).await?;

    let offset = if args.resume {
        usize::try_from(ledger.migrated_count())
            .map_err(|_| invalid("ledgered migrated count does not fit in memory"))?
    } else {
        args.offset.unwrap_or(0)
    };
    if offset > records.len() {
        return Err(invalid(format!(
            "offset {} is past the end of the dataset ({} records)",
            offset,
            records.len()
        )));
    }
    let remaining = &records[offset..];

    let config = ctx.config.migration.engine_config(args.batch_size);
    if config.batch_size == 0 {
        return Err(invalid("batch size must be at least 1"));
    }
    print_info(&format!(
        "{}: {} records, {} already migrated, {} to submit",
        path.display(),
        records.len(),
        offset,
        remaining.len()
    ));
    let rows: Vec<PlanRow> = partition(remaining, config.batch_size)
        .iter()
        .map(|b| PlanRow {
            batch: b.index + 1,
            start: offset + b.start,
            records: b.len(),
            first_key: b.records.first().map_or(0, |r| r.key),
            last_key: b.records.last().map_or(0, |r| r.key),
        })
        .collect();
    let batches_total = rows.len();
    output::print_output(rows, ctx.format)?;

    if args.dry_run {
        print_success(&format!(
            "Dry run: {} records in {} batches of at most {}",
            remaining.len(),
            batches_total,
            config.batch_size
        ));
        return Ok(());
    }
    if remaining.is_empty() {
        print_success("Every record in the dataset is already migrated");
        return Ok(());
    }

    let (env, settings) = ctx.network()?;
    let settings_migration = &ctx.config.migration;
    let target = MigrationTarget::from_ledger(
        &ledger,
        settings_migration.target,
        settings_migration.submit_method.clone(),
        settings_migration.count_method.clone(),
    )?;
    let chain = ctx.chain_client(settings)?;
    print_account_header(chain.as_ref(), &env, settings).await?;
    print_info(&format!("Target: {} ({})", target.contract, settings_migration.target));

    if !confirm_start(&format!("Submit {} batches?", batches_total)) {
        print_error("Aborted");
        return Ok(());
    }

    let engine = MigrationEngine::new(env.clone(), chain, store, target, config)?;
    let gate = ConsoleGate::new(&settings.currency);
    let run_id = Uuid::new_v4();
    let span = info_span!("migrate", run_id = %run_id, environment = %env.name);
    let result = engine.migrate(&records, offset, ledger, &gate).instrument(span).await;
    drop(lease);

    let (_, report) = match result {
        Ok(done) => done,
        Err(e) => {
            match &e {
                DeploymentError::OperatorAborted {
                    confirmed_records,
                    resume_offset,
                } => print_info(&format!(
                    "{} records confirmed in this run; continue later with --resume (offset {})",
                    confirmed_records, resume_offset
                )),
                DeploymentError::BatchUnconfirmed {
                    tx_hash,
                    resume_offset,
                    included_offset,
                    ..
                } => print_warning(&format!(
                    "Check {} before resuming: rerun with --offset {} if it was included, --offset {} if not",
                    tx_hash, included_offset, resume_offset
                )),
                _ => {}
            }
            return Err(e.into());
        }
    };

    let rows: Vec<BatchRow> = report
        .batches
        .iter()
        .map(|b| BatchRow {
            batch: b.index + 1,
            start: b.start,
            records: b.records,
            gas: b.gas_used,
            cost: format_amount(b.cost, &settings.currency),
            tx_hash: b.tx_hash.to_string(),
        })
        .collect();
    output::print_output(rows, ctx.format)?;

    if let Some(warning) = &report.consistency_warning {
        print_warning(&format!(
            "Entity count is {} but {} was expected ({} pre-existing + {} submitted)",
            warning.reported, warning.expected, report.pre_existing, report.submitted_records
        ));
    }
    print_success(&format!(
        "Migrated {} records in {} batches; gas {}, cost {}; count now {}",
        report.submitted_records,
        report.batches.len(),
        report.total_gas,
        format_amount(report.total_cost, &settings.currency),
        report.reported_count
    ));
    Ok(())
}
