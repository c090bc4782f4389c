// Configuration module for the staking engine
// Network parameters, liveness parameters, governance identities and genesis validators

pub mod presets;
pub mod validation;

pub use presets::NetworkPreset;
pub use validation::{ConfigValidationError, ConfigValidator, ValidationResult, ValidationRule};

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::{Address, Amount};

/// Denominator for commission rates expressed in basis points
pub const COMMISSION_BASE: u64 = 10_000;

/// Description field limits in bytes
pub const MAX_MONIKER_LENGTH: usize = 70;
pub const MAX_WEBSITE_LENGTH: usize = 140;
pub const MAX_EMAIL_LENGTH: usize = 140;
pub const MAX_DETAILS_LENGTH: usize = 280;

/// Prefix for environment overrides, e.g. `STAKING__PARAMS__LOCK_PERIOD=60`
pub const ENV_PREFIX: &str = "STAKING";

/// Economic parameters of the staking ledger.
///
/// Amounts are configured as `u64` and widened to [`Amount`] by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingParams {
    /// Maximum size of the candidate set (and therefore the active set)
    pub max_validator_num: usize,
    /// Seconds between unstake and withdrawal
    pub lock_period: u64,
    /// Minimum total stake for a validator to be Staked
    pub min_validator_stake: u64,
    /// Minimum first-time delegation
    pub min_delegator_stake: u64,
    /// Commission applied at creation, in basis points
    pub default_commission_rate: u64,
    /// Upper bound for commission, in basis points
    pub max_commission_rate: u64,
    /// Blocks per epoch
    pub epoch_length: u64,
    /// Fixed penalty taken from a validator when it is slashed
    pub slash_penalty: u64,
    /// Remainder pool size that forces a flush
    pub remainder_flush_threshold: u64,
    /// Blocks after which the remainder pool is flushed regardless of size
    pub remainder_flush_interval: u64,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl StakingParams {
    pub fn min_validator_stake(&self) -> Amount {
        Amount::from(self.min_validator_stake)
    }

    pub fn min_delegator_stake(&self) -> Amount {
        Amount::from(self.min_delegator_stake)
    }

    pub fn slash_penalty(&self) -> Amount {
        Amount::from(self.slash_penalty)
    }

    pub fn remainder_flush_threshold(&self) -> Amount {
        Amount::from(self.remainder_flush_threshold)
    }
}

/// Parameters of the missed-block tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessParams {
    /// Missed blocks that trigger a slash
    pub slash_threshold: u64,
    /// Decay divisor: each decay removes `slash_threshold / decrease_rate` misses
    pub decrease_rate: u64,
    /// Decay runs on every N-th epoch boundary
    pub decay_interval_epochs: u64,
}

impl Default for LivenessParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl LivenessParams {
    /// Number of misses forgiven per decay
    pub fn decrease_step(&self) -> u64 {
        if self.decrease_rate == 0 {
            return 0;
        }
        self.slash_threshold / self.decrease_rate
    }
}

/// Privileged identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub admin: Address,
    pub emergency_admin: Address,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            admin: Address::system(0x2000),
            emergency_admin: Address::system(0x2001),
        }
    }
}

/// A validator created and staked when the engine starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    #[serde(default)]
    pub reward_addr: Option<Address>,
    #[serde(default)]
    pub commission_rate: Option<u64>,
    pub stake: u64,
    #[serde(default)]
    pub moniker: String,
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StakingConfig {
    pub params: StakingParams,
    pub liveness: LivenessParams,
    pub governance: GovernanceConfig,
    pub genesis: Vec<GenesisValidator>,
}

/// Errors raised while loading or writing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration is invalid:\n{0}")]
    Invalid(String),
}

impl StakingConfig {
    pub fn from_preset(preset: NetworkPreset) -> Self {
        Self {
            params: StakingParams::for_preset(preset),
            liveness: LivenessParams::for_preset(preset),
            governance: GovernanceConfig::default(),
            genesis: Vec::new(),
        }
    }

    /// Layer preset defaults, an optional TOML file and `STAKING__*` environment overrides
    pub fn load(preset: NetworkPreset, path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::from_preset(preset);
        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = path {
            debug!("Loading staking configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded: StakingConfig = builder.build()?.try_deserialize()?;
        loaded.validated()
    }

    /// Parse a TOML document on top of the preset defaults
    pub fn from_toml_str(preset: NetworkPreset, contents: &str) -> Result<Self, ConfigError> {
        let defaults = Self::from_preset(preset);
        let loaded: StakingConfig = Config::builder()
            .add_source(Config::try_from(&defaults)?)
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validated()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ValidationResult {
        ConfigValidator::new().validate(self)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let result = self.validate();
        if !result.is_valid {
            return Err(ConfigError::Invalid(result.get_summary()));
        }
        for warning in &result.warnings {
            info!("Configuration warning: {}", warning);
        }
        Ok(self)
    }
}
