// Outbound value transfers.
// Every payout is the last step of an operation and runs while the
// ReentrancyGuard is held, so a sink that calls back into the engine
// sees StakingError::ReentrantCall.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use super::pos_structs::DelegatorPosition;
use super::StakingState;
use crate::blockchain::{Address, Amount};
use crate::errors::StakingError;

/// Destination for value leaving the staking ledger
#[cfg_attr(test, mockall::automock)]
pub trait ValueSink {
    fn transfer(&mut self, to: Address, amount: Amount) -> Result<(), StakingError>;
}

/// A transfer owed by an operation, executed as its final step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub to: Address,
    pub amount: Amount,
}

impl Payout {
    pub fn new(to: Address, amount: Amount) -> Self {
        Self { to, amount }
    }

    /// Debit `custody` and hand the value to `sink`. Zero payouts are skipped.
    pub fn send<S: ValueSink + ?Sized>(self, sink: &mut S, custody: &mut Amount) -> Result<Amount, StakingError> {
        if self.amount == 0 {
            return Ok(0);
        }
        *custody = custody
            .checked_sub(self.amount)
            .ok_or(StakingError::ArithmeticOverflow("custody balance"))?;
        sink.transfer(self.to, self.amount)?;
        Ok(self.amount)
    }
}

/// The records a paying operation can touch, saved so a refused transfer can be undone
#[derive(Debug, Clone)]
pub(crate) struct PayoutCheckpoint {
    validator: Address,
    validator_rewards: Option<(Amount, Amount)>,
    position: Option<(Address, Option<DelegatorPosition>)>,
    total_unstaking: Amount,
    balance: Amount,
}

impl PayoutCheckpoint {
    pub(crate) fn capture(state: &StakingState, validator: Address, delegator: Option<Address>) -> Self {
        Self {
            validator,
            validator_rewards: state
                .validators
                .get(&validator)
                .map(|v| (v.reward_amount, v.delegator_reward_pool)),
            position: delegator.map(|d| {
                let position = state.positions.get(&validator).and_then(|p| p.get(&d)).cloned();
                (d, position)
            }),
            total_unstaking: state.total_unstaking,
            balance: state.balance,
        }
    }

    pub(crate) fn restore(self, state: &mut StakingState) {
        if let (Some((reward_amount, pool)), Some(validator)) =
            (self.validator_rewards, state.validators.get_mut(&self.validator))
        {
            validator.reward_amount = reward_amount;
            validator.delegator_reward_pool = pool;
        }
        if let Some((delegator, saved)) = self.position {
            match saved {
                Some(position) => state.store_position(self.validator, delegator, position),
                None => {
                    if let Some(positions) = state.positions.get_mut(&self.validator) {
                        positions.remove(&delegator);
                    }
                }
            }
        }
        state.total_unstaking = self.total_unstaking;
        state.balance = self.balance;
    }
}

/// In-memory sink that credits recipients, used by the simulator and tests
#[derive(Debug, Clone, Default)]
pub struct BalanceSink {
    balances: BTreeMap<Address, Amount>,
    transfers: usize,
}

impl BalanceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers
    }

    pub fn total_paid(&self) -> Amount {
        self.balances.values().sum()
    }
}

impl ValueSink for BalanceSink {
    fn transfer(&mut self, to: Address, amount: Amount) -> Result<(), StakingError> {
        let balance = self.balances.entry(to).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow("sink balance"))?;
        self.transfers += 1;
        debug!("Paid {} to {}", amount, to);
        Ok(())
    }
}

/// Rejects nested entry into payout paths
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// Take the guard; it is released when the token drops
    pub fn enter(&self) -> Result<ReentrancyToken, StakingError> {
        if self.entered.swap(true, Ordering::AcqRel) {
            return Err(StakingError::ReentrantCall);
        }
        Ok(ReentrancyToken {
            entered: Arc::clone(&self.entered),
        })
    }
}

#[must_use]
#[derive(Debug)]
pub struct ReentrancyToken {
    entered: Arc<AtomicBool>,
}

impl Drop for ReentrancyToken {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::Release);
    }
}
