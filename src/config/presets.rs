use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{LivenessParams, StakingParams};

/// Networks with predefined parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPreset {
    /// Production parameters
    Mainnet,
    /// Shorter epochs and locks for public testing
    Testnet,
    /// Tiny values for local development and simulation
    Devnet,
}

impl Default for NetworkPreset {
    fn default() -> Self {
        NetworkPreset::Mainnet
    }
}

impl fmt::Display for NetworkPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkPreset::Mainnet => write!(f, "mainnet"),
            NetworkPreset::Testnet => write!(f, "testnet"),
            NetworkPreset::Devnet => write!(f, "devnet"),
        }
    }
}

impl FromStr for NetworkPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkPreset::Mainnet),
            "testnet" => Ok(NetworkPreset::Testnet),
            "devnet" => Ok(NetworkPreset::Devnet),
            other => Err(format!("Unknown network preset: {}", other)),
        }
    }
}

impl StakingParams {
    pub fn for_preset(preset: NetworkPreset) -> Self {
        match preset {
            NetworkPreset::Mainnet => Self::mainnet(),
            NetworkPreset::Testnet => Self::testnet(),
            NetworkPreset::Devnet => Self::devnet(),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            max_validator_num: 21,
            lock_period: 7 * 24 * 60 * 60, // 7 days
            min_validator_stake: 10_000,
            min_delegator_stake: 1_000,
            default_commission_rate: 500, // 5%
            max_commission_rate: 2_000,   // 20%
            epoch_length: 200,
            slash_penalty: 1_000,
            remainder_flush_threshold: 1_000,
            remainder_flush_interval: 2_000,
        }
    }

    pub fn testnet() -> Self {
        Self {
            max_validator_num: 21,
            lock_period: 24 * 60 * 60, // 1 day
            epoch_length: 100,
            remainder_flush_interval: 1_000,
            ..Self::mainnet()
        }
    }

    pub fn devnet() -> Self {
        Self {
            max_validator_num: 5,
            lock_period: 60,
            min_validator_stake: 100,
            min_delegator_stake: 10,
            default_commission_rate: 1_000,
            max_commission_rate: 5_000,
            epoch_length: 10,
            slash_penalty: 50,
            remainder_flush_threshold: 10,
            remainder_flush_interval: 100,
        }
    }
}

impl LivenessParams {
    pub fn for_preset(preset: NetworkPreset) -> Self {
        match preset {
            NetworkPreset::Mainnet | NetworkPreset::Testnet => Self::mainnet(),
            NetworkPreset::Devnet => Self::devnet(),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            slash_threshold: 48,
            decrease_rate: 4,
            decay_interval_epochs: 1,
        }
    }

    pub fn devnet() -> Self {
        Self {
            slash_threshold: 6,
            decrease_rate: 2,
            decay_interval_epochs: 1,
        }
    }
}
