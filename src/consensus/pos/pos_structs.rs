use std::fmt;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::blockchain::{Address, Amount};
use crate::config::{MAX_DETAILS_LENGTH, MAX_EMAIL_LENGTH, MAX_MONIKER_LENGTH, MAX_WEBSITE_LENGTH};
use crate::errors::StakingError;

/// Fixed-point scale of the per-stake accumulators
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

pub fn precision() -> U256 {
    U256::from(PRECISION)
}

/// Lifecycle status of a validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValidatorStatus {
    #[default]
    NotExist,
    Created,
    Staked,
    Unstake,
    Jailed,
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorStatus::NotExist => write!(f, "NotExist"),
            ValidatorStatus::Created => write!(f, "Created"),
            ValidatorStatus::Staked => write!(f, "Staked"),
            ValidatorStatus::Unstake => write!(f, "Unstake"),
            ValidatorStatus::Jailed => write!(f, "Jailed"),
        }
    }
}

/// Public metadata of a validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub moniker: String,
    pub website: String,
    pub email: String,
    pub details: String,
}

impl Description {
    pub fn with_moniker(moniker: impl Into<String>) -> Self {
        Self {
            moniker: moniker.into(),
            ..Self::default()
        }
    }

    /// Check every field against its byte limit
    pub fn validate(&self) -> Result<(), StakingError> {
        let fields = [
            ("moniker", &self.moniker, MAX_MONIKER_LENGTH),
            ("website", &self.website, MAX_WEBSITE_LENGTH),
            ("email", &self.email, MAX_EMAIL_LENGTH),
            ("details", &self.details, MAX_DETAILS_LENGTH),
        ];
        for (field, value, max) in fields {
            if value.len() > max {
                return Err(StakingError::FieldTooLong {
                    field,
                    len: value.len(),
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Accumulator values recorded when a validator is slashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashCheckpoint {
    /// `acc_slash_per_stake` right after the slash
    pub acc_slash_per_stake: U256,
    /// Per-stake loss applied by this slash
    pub slash_per_stake: U256,
    /// `acc_reward_per_stake` at the moment of the slash
    pub acc_reward_per_stake: U256,
}

/// A validator and its delegation pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Address receiving commission income
    pub reward_addr: Address,
    /// Current lifecycle status
    pub status: ValidatorStatus,
    /// Sum of all active delegations, after slashes
    pub total_staked: Amount,
    /// Commission in basis points
    pub commission_rate: u64,
    /// Reward per unit of stake, scaled by PRECISION
    pub acc_reward_per_stake: U256,
    /// Slash per unit of stake, scaled by PRECISION
    pub acc_slash_per_stake: U256,
    /// Rewards owed to delegators and not yet claimed
    pub delegator_reward_pool: Amount,
    /// Commission owed to the validator
    pub reward_amount: Amount,
    /// Cumulative penalty taken from this validator
    pub slash_amount: Amount,
    /// Delegators with an active position
    pub delegators: Vec<Address>,
    pub description: Description,
    /// One entry per slash, ordered by `acc_slash_per_stake`
    pub slash_checkpoints: Vec<SlashCheckpoint>,
    /// Block in which the validator was created
    pub created_at: u64,
}

impl Validator {
    pub fn new(
        reward_addr: Address,
        commission_rate: u64,
        description: Description,
        created_at: u64,
    ) -> Self {
        Self {
            reward_addr,
            status: ValidatorStatus::Created,
            total_staked: 0,
            commission_rate,
            acc_reward_per_stake: U256::zero(),
            acc_slash_per_stake: U256::zero(),
            delegator_reward_pool: 0,
            reward_amount: 0,
            slash_amount: 0,
            delegators: Vec::new(),
            description,
            slash_checkpoints: Vec::new(),
            created_at,
        }
    }

    pub fn is_jailed(&self) -> bool {
        self.status == ValidatorStatus::Jailed
    }

    /// Whether `delegator` sits at `index` in the delegator list
    pub fn lists_delegator(&self, delegator: &Address, index: usize) -> bool {
        self.delegators.get(index) == Some(delegator)
    }
}

/// A delegator's stake with one validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorPosition {
    /// Principal, as of the last settlement
    pub delegated_amount: Amount,
    /// Set when the position is unstaked; the principal unlocks after the lock period
    pub unstake_timestamp: Option<u64>,
    /// `delegated_amount * acc_reward_per_stake / PRECISION` at the last settlement
    pub reward_debt: U256,
    /// `acc_slash_per_stake` at the last settlement
    pub slash_debt: U256,
    /// Settled rewards not yet claimed
    pub pending_rewards: Amount,
    /// Position in the validator's delegator list
    pub index: usize,
}

impl DelegatorPosition {
    pub fn is_unstaking(&self) -> bool {
        self.unstake_timestamp.is_some()
    }
}

/// Result of adding a validator to the candidate set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateAdmission {
    Added,
    AlreadyPresent,
    /// The contained validator was evicted to make room
    Replaced(Address),
}

/// Notifications emitted by successful operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingEvent {
    ValidatorCreated {
        validator: Address,
        reward_addr: Address,
        commission_rate: u64,
    },
    ValidatorEdited {
        validator: Address,
        reward_addr: Address,
    },
    CommissionRateUpdated {
        validator: Address,
        commission_rate: u64,
    },
    Staked {
        validator: Address,
        delegator: Address,
        amount: Amount,
    },
    Unstaked {
        validator: Address,
        delegator: Address,
        amount: Amount,
        unlock_at: u64,
    },
    /// Stake left on a validator after its last delegator unstaked, moved to the remainder pool
    StakeDustReclaimed {
        validator: Address,
        amount: Amount,
    },
    StakeWithdrawn {
        validator: Address,
        delegator: Address,
        amount: Amount,
    },
    DelegatorRewardsClaimed {
        validator: Address,
        delegator: Address,
        amount: Amount,
    },
    ValidatorRewardsWithdrawn {
        validator: Address,
        reward_addr: Address,
        amount: Amount,
    },
    BlockRewardDistributed {
        block: u64,
        amount: Amount,
        validators: usize,
    },
    RemainderFlushed {
        block: u64,
        amount: Amount,
    },
    ValidatorSlashed {
        validator: Address,
        penalty: Amount,
        block: u64,
    },
    ValidatorUnjailed {
        validator: Address,
        status: ValidatorStatus,
    },
    CandidateAdded {
        validator: Address,
    },
    CandidateEvicted {
        validator: Address,
        replaced_by: Address,
    },
    CandidateRejected {
        validator: Address,
        stake: Amount,
    },
    ActiveSetUpdated {
        block: u64,
        validators: Vec<Address>,
    },
    MissedBlockRecorded {
        validator: Address,
        missed_blocks: u64,
    },
    MissedBlocksDecreased {
        block: u64,
        step: u64,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    AdminTransferred {
        previous: Address,
        admin: Address,
    },
    EmergencyPauseSet {
        paused: bool,
    },
    SlashParamsUpdated {
        slash_threshold: u64,
        decrease_rate: u64,
    },
}
