//! CLI command implementations

pub mod deploy;
pub mod ledger;
pub mod migrate;
pub mod status;
pub mod validate;
pub mod verify;

use crate::client::GatewayClient;
use crate::config::{CliConfig, EnvironmentConfig};
use crate::error::{CliError, CliResult};
use crate::output::{format_amount, print_info, print_warning, OutputFormat};
use crate::verifier::ExplorerVerifier;
use chainstep_deployment::{ChainClient, VerificationTrigger};
use chainstep_state::FileLedgerStore;
use chainstep_types::{CategoryTable, Environment, MigrationDataset, MigrationRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs from the global flags and config file
pub struct Context {
    pub config: CliConfig,
    pub environment: String,
    pub gateway: Option<String>,
    pub format: OutputFormat,
}

impl Context {
    /// Resolved environment and its network settings
    pub fn network(&self) -> CliResult<(Environment, &EnvironmentConfig)> {
        self.config.environment(&self.environment)
    }

    /// Environment used for ledger access only
    ///
    /// The chain id is 0 when the environment has no network settings.
    pub fn ledger_environment(&self) -> Environment {
        let chain_id = self
            .config
            .environments
            .get(&self.environment)
            .map_or(0, |s| s.chain_id);
        Environment::new(self.environment.clone(), chain_id)
    }

    pub fn store(&self) -> Arc<FileLedgerStore> {
        Arc::new(self.config.ledger_store())
    }

    pub fn chain_client(&self, settings: &EnvironmentConfig) -> CliResult<Arc<GatewayClient>> {
        let endpoint = self.gateway.as_deref().unwrap_or(&settings.gateway);
        Ok(Arc::new(GatewayClient::new(endpoint, settings)?))
    }

    /// Verification trigger for the environment, if one applies
    pub fn verification(
        &self,
        env: &Environment,
        settings: &EnvironmentConfig,
    ) -> CliResult<Option<VerificationTrigger>> {
        if env.is_local() {
            return Ok(None);
        }
        let Some(endpoint) = settings.verifier.as_deref() else {
            print_warning(&format!(
                "No verifier configured for {}; deployed contracts will not be verified",
                env.name
            ));
            return Ok(None);
        };
        let name = env.explorer_name().unwrap_or("explorer");
        let backend = ExplorerVerifier::new(
            endpoint,
            settings.verifier_api_key.clone(),
            name,
            settings.request_timeout_secs,
        )?;
        Ok(VerificationTrigger::for_environment(env, Arc::new(backend)))
    }

    pub fn dataset_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.dataset_path(&self.environment))
    }
}

/// Print the operator account header shown before state-changing commands
pub async fn print_account_header(
    chain: &dyn ChainClient,
    env: &Environment,
    settings: &EnvironmentConfig,
) -> CliResult<()> {
    let account = chain.account().await?;
    print_info(&format!("Environment: {} (chain {})", env.name, env.chain_id));
    print_info(&format!("Operator: {}", account.address));
    print_info(&format!(
        "Balance: {}",
        format_amount(account.balance, &settings.currency)
    ));
    if let Some(explorer) = env.explorer_name() {
        print_info(&format!("Explorer: {}", explorer));
    }
    Ok(())
}

/// Load a migration dataset; a missing file is an empty dataset
pub fn load_dataset(path: &Path, categories: &CategoryTable) -> CliResult<Vec<MigrationRecord>> {
    if !path.exists() {
        print_warning(&format!(
            "Dataset {} not found; nothing to migrate",
            path.display()
        ));
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(MigrationDataset::parse(&raw, categories)?)
}

/// Ask for confirmation before a state-changing run
pub fn confirm_start(prompt: &str) -> bool {
    match dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
    {
        Ok(confirmed) => confirmed,
        Err(e) => {
            debug!(error = %e, "Confirmation prompt failed; treating as declined");
            false
        }
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> CliError {
    CliError::InvalidInput(message.into())
}
