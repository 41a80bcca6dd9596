//! Configuration for adc-oracle.

use crate::error::{ConfigError, Error, Result};
use crate::identity::Identity;
use crate::notary::{NotaryConfig, DEFAULT_NOTARY_TIMEOUT, DEFAULT_NOTARY_URL};
use crate::orchestrator::{FeeSchedule, OrchestratorConfig};
use crate::price::PriceConfig;
use crate::registry::BINDINGS_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where role balances are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerSource {
    /// Local in-process accounts.
    #[default]
    Memory,
    /// An external command per snapshot.
    Command,
}

/// Oracle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Directory for persisted state (trust-chain bindings).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Bound on blocking requests, in seconds.
    #[serde(default = "default_blocking_timeout")]
    pub blocking_timeout_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Notary connection.
    #[serde(default)]
    pub notary: NotarySection,

    /// Role identities.
    #[serde(default)]
    pub roles: RolesConfig,

    /// Processor behaviour.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Per-role charges.
    #[serde(default)]
    pub fees: FeeSchedule,

    /// Balance accounting.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Price feeds for currency pair requests.
    #[serde(default)]
    pub price: PriceConfig,
}

/// Notary connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotarySection {
    /// Base URL.
    #[serde(default = "default_notary_url")]
    pub url: String,

    /// Notarization timeout in seconds.
    #[serde(default = "default_notary_timeout")]
    pub timeout_secs: u64,

    /// Info endpoint timeout in seconds.
    #[serde(default = "default_info_timeout")]
    pub info_timeout_secs: u64,

    /// Expected notary public key (PEM). Unset trusts the key the notary
    /// advertises at startup.
    #[serde(default)]
    pub pinned_public_key: Option<String>,
}

/// Role identities.
///
/// Each value is either a text identity or a label to derive one from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Caller role.
    #[serde(default = "default_caller")]
    pub caller: String,
    /// Processor role.
    #[serde(default = "default_processor")]
    pub processor: String,
    /// Verifier role.
    #[serde(default = "default_verifier")]
    pub verifier: String,
    /// Owner allowed to reconfigure the processor.
    #[serde(default = "default_owner")]
    pub owner: String,
}

/// Balance accounting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Balance source.
    #[serde(default)]
    pub source: LedgerSource,

    /// Command template for [`LedgerSource::Command`]; `{id}` is replaced
    /// with the role's text identity.
    #[serde(default)]
    pub balance_command: Option<String>,

    /// Opening balance of each local account.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            notary: NotarySection::default(),
            roles: RolesConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            fees: FeeSchedule::default(),
            ledger: LedgerConfig::default(),
            price: PriceConfig::default(),
            blocking_timeout_secs: default_blocking_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NotarySection {
    fn default() -> Self {
        Self {
            url: default_notary_url(),
            timeout_secs: default_notary_timeout(),
            info_timeout_secs: default_info_timeout(),
            pinned_public_key: None,
        }
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            caller: default_caller(),
            processor: default_processor(),
            verifier: default_verifier(),
            owner: default_owner(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            source: LedgerSource::default(),
            balance_command: None,
            initial_balance: default_initial_balance(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "adc-oracle")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".adc-oracle"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_notary_url() -> String {
    DEFAULT_NOTARY_URL.to_string()
}

const fn default_notary_timeout() -> u64 {
    DEFAULT_NOTARY_TIMEOUT.as_secs()
}

const fn default_info_timeout() -> u64 {
    10
}

const fn default_blocking_timeout() -> u64 {
    60
}

fn default_caller() -> String {
    "adc-caller".to_string()
}

fn default_processor() -> String {
    "adc-processor".to_string()
}

fn default_verifier() -> String {
    "adc-verifier".to_string()
}

fn default_owner() -> String {
    "adc-owner".to_string()
}

const fn default_initial_balance() -> u64 {
    10_000_000_000_000 // 10T
}

impl RolesConfig {
    /// Resolve a configured role to an identity.
    ///
    /// Valid text identities are used as-is; anything else is a label.
    #[must_use]
    pub fn identity(value: &str) -> Identity {
        Identity::parse_text(value).unwrap_or_else(|_| Identity::derive(value))
    }
}

impl NotarySection {
    /// Client settings for this section.
    #[must_use]
    pub fn client_config(&self) -> NotaryConfig {
        NotaryConfig {
            base_url: self.url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            info_timeout: Duration::from_secs(self.info_timeout_secs),
        }
    }
}

impl OracleConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())).into())
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where trust-chain bindings are persisted.
    #[must_use]
    pub fn bindings_path(&self) -> PathBuf {
        self.state_dir.join(BINDINGS_FILE)
    }

    /// Bound on blocking requests.
    #[must_use]
    pub fn blocking_timeout(&self) -> Duration {
        Duration::from_secs(self.blocking_timeout_secs)
    }
}
