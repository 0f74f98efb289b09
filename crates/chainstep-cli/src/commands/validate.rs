//! Offline dataset validation

use super::Context;
use crate::error::CliResult;
use crate::output::print_success;
use chainstep_deployment::{partition, validate_ordering};
use std::path::PathBuf;

/// Execute the validate command
pub fn execute(ctx: &Context, dataset: Option<PathBuf>, batch_size: Option<usize>) -> CliResult<()> {
    let path = ctx.dataset_path(dataset.as_deref());
    let records = super::load_dataset(&path, &ctx.config.migration.categories)?;
    validate_ordering(&records)?;

    let batch_size = batch_size.unwrap_or(ctx.config.migration.batch_size);
    if batch_size == 0 {
        return Err(super::invalid("batch size must be at least 1"));
    }
    print_success(&format!(
        "{}: {} records ordered by key, {} batches of at most {}",
        path.display(),
        records.len(),
        partition(&records, batch_size).len(),
        batch_size
    ));
    Ok(())
}
