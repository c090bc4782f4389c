// Per-block and per-epoch scheduling for privileged actions.
// Every privileged action records the last block it ran in and refuses a
// second run in the same block. Epoch-bound actions additionally check that
// the block height falls on a boundary.

use serde::{Deserialize, Serialize};

use crate::errors::StakingError;

/// Epoch arithmetic over block heights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSchedule {
    /// Number of blocks per epoch
    pub epoch_length: u64,
}

impl EpochSchedule {
    pub fn new(epoch_length: u64) -> Self {
        Self { epoch_length }
    }

    pub fn epoch_of(&self, block: u64) -> u64 {
        if self.epoch_length == 0 {
            return 0;
        }
        block / self.epoch_length
    }

    pub fn is_boundary(&self, block: u64) -> bool {
        self.is_boundary_every(block, 1)
    }

    /// True when `block` starts an epoch whose index is a multiple of `every_epochs`
    pub fn is_boundary_every(&self, block: u64, every_epochs: u64) -> bool {
        let period = self.epoch_length.saturating_mul(every_epochs.max(1));
        period != 0 && block % period == 0
    }

    pub fn require_boundary(&self, block: u64) -> Result<(), StakingError> {
        if self.is_boundary(block) {
            Ok(())
        } else {
            Err(StakingError::NotEpochBoundary { block })
        }
    }

    /// First boundary strictly after `block`
    pub fn next_boundary(&self, block: u64) -> u64 {
        if self.epoch_length == 0 {
            return block + 1;
        }
        (self.epoch_of(block) + 1) * self.epoch_length
    }
}

/// At-most-once-per-block guard for a single privileged action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGate {
    last_block: Option<u64>,
}

impl BlockGate {
    pub fn new() -> Self {
        Self { last_block: None }
    }

    pub fn last_block(&self) -> Option<u64> {
        self.last_block
    }

    pub fn has_run_in(&self, block: u64) -> bool {
        self.last_block == Some(block)
    }

    /// Fail if the action already ran in `block`; records nothing
    pub fn check(&self, action: &'static str, block: u64) -> Result<(), StakingError> {
        if self.has_run_in(block) {
            return Err(StakingError::AlreadyExecutedInBlock { action, block });
        }
        Ok(())
    }

    pub fn record(&mut self, block: u64) {
        self.last_block = Some(block);
    }

    /// Mark the action as executed in `block`, failing if it already ran there
    pub fn enter(&mut self, action: &'static str, block: u64) -> Result<(), StakingError> {
        self.check(action, block)?;
        self.record(block);
        Ok(())
    }
}

/// One gate per privileged action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedGates {
    pub distribute_reward: BlockGate,
    pub update_active_set: BlockGate,
    pub report_missed_block: BlockGate,
    pub decrease_missed_blocks: BlockGate,
}
