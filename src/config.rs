//! Lab configuration, read from TOML. Every field has a default, so an empty
//! file (or no file) runs the harness against the bundled validator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use plutus_escrow_sdk::Network;
use plutus_escrow_sdk::escrow::DEFAULT_MIN_OUTPUT;
use serde::{Deserialize, Serialize};

use crate::client::ClientSettings;
use crate::emulator::EmulatorConfig;
use crate::tx::DEFAULT_FEE;

/// Environment variable naming the config file when no argument is given.
pub const CONFIG_ENV: &str = "ESCROW_LAB_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabConfig {
    pub network: Network,
    pub min_output: u64,
    pub fee: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Emulator only: delay between acceptance and inclusion.
    pub block_delay_ms: u64,
    /// Blueprint artifact holding the validator.
    pub validator: PathBuf,
    /// Validator to pick from the blueprint; the first one when unset.
    pub validator_title: Option<String>,
    /// Hex secret key files. A fresh key is generated for a party without one.
    pub owner_key: Option<PathBuf>,
    pub other_key: Option<PathBuf>,
    /// Lovelace minted to each party's wallet before the run.
    pub initial_funds: u64,
    pub lock_amount: u64,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            network: Network::Preview,
            min_output: DEFAULT_MIN_OUTPUT,
            fee: DEFAULT_FEE,
            confirmation_timeout_secs: 60,
            poll_interval_ms: 500,
            block_delay_ms: 1_000,
            validator: PathBuf::from("fixtures/hello_world.plutus.json"),
            validator_title: None,
            owner_key: None,
            other_key: None,
            initial_funds: 10_000_000_000,
            lock_amount: 1_000_000,
        }
    }
}

impl LabConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_output == 0 {
            return Err(ConfigError::Invalid("min_output must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.lock_amount < self.min_output {
            return Err(ConfigError::Invalid(format!(
                "lock_amount {} is below min_output {}",
                self.lock_amount, self.min_output
            )));
        }
        let needed = self
            .lock_amount
            .checked_add(self.fee.saturating_mul(2))
            .ok_or_else(|| ConfigError::Invalid("lock_amount overflows".into()))?;
        if self.initial_funds < needed {
            return Err(ConfigError::Invalid(format!(
                "initial_funds {} cannot cover a lock of {} plus fees",
                self.initial_funds, self.lock_amount
            )));
        }
        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            fee: self.fee,
            min_output: self.min_output,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
        }
    }

    pub fn emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            network: self.network,
            min_output: self.min_output,
            block_delay: Duration::from_millis(self.block_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
