//! CLI configuration

use crate::error::{CliError, CliResult};
use chainstep_deployment::{MigrationConfig, Plan, StepDescriptor};
use chainstep_state::FileLedgerStore;
use chainstep_types::{ArtifactKey, CategoryTable, Environment, Wei};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "chainstep.toml";

/// Environment used when neither `--env` nor `default_environment` is set
pub const FALLBACK_ENVIRONMENT: &str = "localhost";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Directory holding one ledger document per environment
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,

    /// Environment used when `--env` is not given
    #[serde(default)]
    pub default_environment: Option<String>,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    #[serde(default)]
    pub migration: MigrationSettings,

    /// Deployment plan, in execution order
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

/// Per-environment network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub chain_id: u64,

    /// Transaction-signing gateway endpoint
    pub gateway: String,

    /// Source-verification service endpoint
    #[serde(default)]
    pub verifier: Option<String>,

    #[serde(default)]
    pub verifier_api_key: Option<String>,

    /// Native currency symbol for display
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Batch migration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationSettings {
    /// Dataset path; `{env}` is replaced by the environment name
    pub dataset: String,
    pub batch_size: usize,
    /// Ledger artifact holding the contract records are submitted to
    pub target: ArtifactKey,
    pub submit_method: String,
    pub count_method: String,
    pub reference_gas_price_gwei: u64,
    /// Category labels accepted in datasets
    pub categories: CategoryTable,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            dataset: "migrations/{env}.json".to_string(),
            batch_size: 100,
            target: ArtifactKey::Master,
            submit_method: "createBatchSeries".to_string(),
            count_method: "seriesCount".to_string(),
            reference_gas_price_gwei: 50,
            categories: CategoryTable::new(),
        }
    }
}

impl MigrationSettings {
    pub fn engine_config(&self, batch_size: Option<usize>) -> MigrationConfig {
        MigrationConfig {
            batch_size: batch_size.unwrap_or(self.batch_size),
            reference_gas_price: Wei::from_gwei(self.reference_gas_price_gwei),
        }
    }
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from("deploys")
}

fn default_currency() -> String {
    "ETH".to_string()
}

fn default_confirmation_timeout() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            ledger_dir: default_ledger_dir(),
            default_environment: None,
            environments: BTreeMap::new(),
            migration: MigrationSettings::default(),
            steps: Vec::new(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    ///
    /// Without an explicit path, `./chainstep.toml` is preferred over the
    /// user configuration directory. A missing file yields the defaults.
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => {
                let local = PathBuf::from(LOCAL_CONFIG_FILE);
                if local.exists() {
                    local
                } else {
                    Self::default_config_path()?
                }
            }
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            Self::parse(&contents)
        } else {
            Ok(CliConfig::default())
        }
    }

    pub fn parse(contents: &str) -> CliResult<Self> {
        toml::from_str(contents).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Get the default configuration file path
    fn default_config_path() -> CliResult<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("chainstep").join("config.toml"))
    }

    /// Name of the selected environment
    pub fn environment_name(&self, selected: Option<&str>) -> String {
        selected
            .map(str::to_string)
            .or_else(|| self.default_environment.clone())
            .unwrap_or_else(|| FALLBACK_ENVIRONMENT.to_string())
    }

    /// Resolve a configured environment
    pub fn environment(&self, name: &str) -> CliResult<(Environment, &EnvironmentConfig)> {
        let settings = self.environments.get(name).ok_or_else(|| {
            CliError::Config(format!(
                "environment {} is not configured; add an [environments.{}] table",
                name, name
            ))
        })?;
        Ok((Environment::new(name, settings.chain_id), settings))
    }

    pub fn ledger_store(&self) -> FileLedgerStore {
        FileLedgerStore::new(&self.ledger_dir)
    }

    pub fn dataset_path(&self, environment: &str) -> PathBuf {
        PathBuf::from(self.migration.dataset.replace("{env}", environment))
    }

    /// Validated deployment plan
    pub fn plan(&self) -> CliResult<Plan> {
        Ok(Plan::new(self.steps.clone())?)
    }

    pub fn ledger_dir(&self) -> &Path {
        &self.ledger_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstep_deployment::StepAction;

    const SAMPLE: &str = r#"
        ledger_dir = "state"
        default_environment = "polygon"

        [environments.polygon]
        chain_id = 137
        gateway = "http://127.0.0.1:8545"
        verifier = "https://verify.example.org"
        currency = "MATIC"

        [migration]
        dataset = "data/{env}-series.json"
        batch_size = 50

        [migration.categories]
        DAO = 0
        DELAWARE = 1
        WYOMING = 2

        [[steps]]
        name = "master"
        kind = "deploy"
        contract = "MasterRegistry"

        [[steps]]
        name = "uri"
        kind = "deploy"
        contract = "EntitiesURI"
        args = [{ artifact = "master" }, "https://example.org/entities/"]
    "#;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.ledger_dir, PathBuf::from("deploys"));
        assert!(config.default_environment.is_none());
        assert_eq!(config.migration.batch_size, 100);
        assert_eq!(config.migration.target, ArtifactKey::Master);
    }

    #[test]
    fn test_load_missing_config() {
        // Should return default config when file doesn't exist
        let config = CliConfig::load(Some("/nonexistent/path/config.toml")).unwrap();
        assert!(config.environments.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.environment_name(None), "polygon");
        assert_eq!(config.environment_name(Some("mainnet")), "mainnet");

        let (env, settings) = config.environment("polygon").unwrap();
        assert_eq!(env.chain_id, 137);
        assert_eq!(settings.currency, "MATIC");
        assert_eq!(settings.confirmation_timeout_secs, 600);
        assert_eq!(settings.poll_interval_ms, 2000);

        assert_eq!(config.migration.categories.get("WYOMING"), Some(&2));
        assert_eq!(config.migration.count_method, "seriesCount");
        assert_eq!(config.dataset_path("polygon"), PathBuf::from("data/polygon-series.json"));

        let plan = config.plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert!(matches!(plan.steps()[1].action(), StepAction::Deploy { args, .. } if args.len() == 2));
    }

    #[test]
    fn test_example_config_parses() {
        let config = CliConfig::parse(include_str!("../chainstep.example.toml")).unwrap();
        let plan = config.plan().unwrap();
        assert_eq!(plan.len(), 6);
        match plan.step("jurisdictions").unwrap().action() {
            StepAction::DeployEach { instances, checks, .. } => {
                assert_eq!(instances.len(), 3);
                assert_eq!(checks.len(), 5);
                assert!(checks.iter().all(|c| c.expect.is_none()));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_environment() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        assert!(matches!(config.environment("mainnet"), Err(CliError::Config(_))));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CliConfig::parse("ledger_directory = \"x\"").is_err());
        assert!(CliConfig::parse("[migration]\nbatch = 3").is_err());
    }

    #[test]
    fn test_engine_config_override() {
        let settings = MigrationSettings::default();
        assert_eq!(settings.engine_config(None).batch_size, 100);
        assert_eq!(settings.engine_config(Some(25)).batch_size, 25);
        assert_eq!(settings.engine_config(None).reference_gas_price, Wei::from_gwei(50));
    }
}
