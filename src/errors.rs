use std::fmt;
use thiserror::Error;

use crate::blockchain::{Address, Amount};
use crate::consensus::pos::ValidatorStatus;

/// Broad category of a rejected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong caller identity for a privileged or cross-component entry point
    Authorization,
    /// Wrong lifecycle status, lock not elapsed, nothing to withdraw or claim
    StatePrecondition,
    /// Amounts, rates or metadata outside the allowed range
    Bounds,
    /// The operation would break a system-wide guarantee
    InvariantGuard,
    /// A collaborator outside the ledger failed (value transfer)
    External,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::StatePrecondition => write!(f, "state-precondition"),
            ErrorKind::Bounds => write!(f, "bounds"),
            ErrorKind::InvariantGuard => write!(f, "invariant-guard"),
            ErrorKind::External => write!(f, "external"),
        }
    }
}

/// Every way a staking operation can be rejected.
///
/// A rejected operation never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakingError {
    // Authorization
    #[error("Caller {caller} is not the block producer")]
    NotBlockProducer { caller: Address },
    #[error("Caller {caller} is not the {role}")]
    Unauthorized { caller: Address, role: &'static str },

    // State preconditions
    #[error("Validator {0} already exists")]
    ValidatorAlreadyExists(Address),
    #[error("Validator {0} does not exist")]
    ValidatorNotFound(Address),
    #[error("Validator {validator} is {status}, expected {expected}")]
    InvalidValidatorStatus {
        validator: Address,
        status: ValidatorStatus,
        expected: &'static str,
    },
    #[error("Stake is already being withdrawn, withdraw it before staking again")]
    AlreadyUnstaking,
    #[error("No active stake with validator {0}")]
    NoActiveStake(Address),
    #[error("Stake has not been unstaked yet")]
    NotUnstaking,
    #[error("Stake is locked until {unlock_at}")]
    LockPeriodActive { unlock_at: u64 },
    #[error("Nothing to withdraw")]
    NothingToWithdraw,
    #[error("Nothing to claim")]
    NothingToClaim,
    #[error("Validator {0} is not in the active set")]
    NotActiveValidator(Address),
    #[error("Block {block} is not an epoch boundary")]
    NotEpochBoundary { block: u64 },
    #[error("Staking is paused")]
    Paused,
    #[error("Staking is not paused")]
    NotPaused,

    // Bounds
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Delegation of {amount} is below the minimum of {minimum}")]
    BelowMinimumDelegation { amount: Amount, minimum: Amount },
    #[error("Validator total stake {total} is below the minimum of {minimum}")]
    BelowMinimumValidatorStake { total: Amount, minimum: Amount },
    #[error("Commission rate {rate} exceeds the maximum of {max}")]
    CommissionTooHigh { rate: u64, max: u64 },
    #[error("Field {field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("Candidate set is full and stake {stake} does not exceed the minimum incumbent stake {minimum}")]
    CandidateSetFull { stake: Amount, minimum: Amount },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Invariant guards
    #[error("Unstaking would leave the network without an eligible validator")]
    LastValidator,
    #[error("Reentrant call detected")]
    ReentrantCall,
    #[error("{action} already executed in block {block}")]
    AlreadyExecutedInBlock { action: &'static str, block: u64 },
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
    #[error("Reward pool of validator {validator} holds {available}, cannot pay {requested}")]
    InsufficientRewardPool {
        validator: Address,
        available: Amount,
        requested: Amount,
    },

    // External
    #[error("Transfer of {amount} to {to} failed: {reason}")]
    TransferFailed {
        to: Address,
        amount: Amount,
        reason: String,
    },
    #[error("State snapshot error: {0}")]
    StateSnapshot(String),
}

impl StakingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StakingError::NotBlockProducer { .. } | StakingError::Unauthorized { .. } => {
                ErrorKind::Authorization
            }
            StakingError::ValidatorAlreadyExists(_)
            | StakingError::ValidatorNotFound(_)
            | StakingError::InvalidValidatorStatus { .. }
            | StakingError::AlreadyUnstaking
            | StakingError::NoActiveStake(_)
            | StakingError::NotUnstaking
            | StakingError::LockPeriodActive { .. }
            | StakingError::NothingToWithdraw
            | StakingError::NothingToClaim
            | StakingError::NotActiveValidator(_)
            | StakingError::NotEpochBoundary { .. }
            | StakingError::Paused
            | StakingError::NotPaused => ErrorKind::StatePrecondition,
            StakingError::ZeroAmount
            | StakingError::BelowMinimumDelegation { .. }
            | StakingError::BelowMinimumValidatorStake { .. }
            | StakingError::CommissionTooHigh { .. }
            | StakingError::FieldTooLong { .. }
            | StakingError::CandidateSetFull { .. }
            | StakingError::InvalidParameter(_) => ErrorKind::Bounds,
            StakingError::LastValidator
            | StakingError::ReentrantCall
            | StakingError::AlreadyExecutedInBlock { .. }
            | StakingError::ArithmeticOverflow(_)
            | StakingError::InsufficientRewardPool { .. } => ErrorKind::InvariantGuard,
            StakingError::TransferFailed { .. } | StakingError::StateSnapshot(_) => {
                ErrorKind::External
            }
        }
    }
}
