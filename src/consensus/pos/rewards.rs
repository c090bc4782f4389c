// Reward engine.
// Block rewards are split across eligible active validators in proportion to
// their stake. Each validator keeps its commission and folds the rest into
// acc_reward_per_stake; delegators collect lazily through their reward_debt.
// Integer dust from the split lands in a global remainder pool that is
// flushed evenly once it is large or old enough.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use log::{debug, info};
use primitive_types::U256;

use super::payout::Payout;
use super::pos_structs::{precision, DelegatorPosition, StakingEvent, Validator};
use super::slashing::settle_position;
use super::StakingState;
use crate::blockchain::{Address, Amount, CallContext};
use crate::config::COMMISSION_BASE;
use crate::errors::StakingError;

pub(crate) fn to_amount(value: U256, what: &'static str) -> Result<Amount, StakingError> {
    if value.bits() > 128 {
        return Err(StakingError::ArithmeticOverflow(what));
    }
    Ok(value.low_u128())
}

/// `amount * acc / PRECISION`, rounded down
pub(crate) fn reward_debt_of(amount: Amount, acc_reward_per_stake: U256) -> Result<U256, StakingError> {
    U256::from(amount)
        .checked_mul(acc_reward_per_stake)
        .map(|product| product / precision())
        .ok_or(StakingError::ArithmeticOverflow("reward debt"))
}

/// Move rewards earned since the last settlement into `pending_rewards`
pub(crate) fn accrue_rewards(
    position: &mut DelegatorPosition,
    acc_reward_per_stake: U256,
) -> Result<(), StakingError> {
    let accrued = reward_debt_of(position.delegated_amount, acc_reward_per_stake)?;
    let earned = to_amount(accrued.saturating_sub(position.reward_debt), "pending rewards")?;
    position.pending_rewards = position
        .pending_rewards
        .checked_add(earned)
        .ok_or(StakingError::ArithmeticOverflow("pending rewards"))?;
    position.reward_debt = accrued;
    Ok(())
}

/// Reward-side balances of one validator, credited on a copy and written back in one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RewardBook {
    commission_rate: u64,
    total_staked: Amount,
    reward_amount: Amount,
    delegator_reward_pool: Amount,
    acc_reward_per_stake: U256,
}

impl RewardBook {
    pub(crate) fn of(validator: &Validator) -> Self {
        RewardBook {
            commission_rate: validator.commission_rate,
            total_staked: validator.total_staked,
            reward_amount: validator.reward_amount,
            delegator_reward_pool: validator.delegator_reward_pool,
            acc_reward_per_stake: validator.acc_reward_per_stake,
        }
    }

    /// Credit `reward`: commission first, the rest to the delegators.
    /// Leaves the book untouched on error.
    pub(crate) fn credit(&mut self, reward: Amount) -> Result<(), StakingError> {
        if reward == 0 {
            return Ok(());
        }
        if self.total_staked == 0 {
            self.reward_amount = self
                .reward_amount
                .checked_add(reward)
                .ok_or(StakingError::ArithmeticOverflow("commission"))?;
            return Ok(());
        }

        let commission = to_amount(
            U256::from(reward) * U256::from(self.commission_rate) / U256::from(COMMISSION_BASE),
            "commission",
        )?;
        let rest = reward - commission;
        let reward_amount = self
            .reward_amount
            .checked_add(commission)
            .ok_or(StakingError::ArithmeticOverflow("commission"))?;
        let delegator_reward_pool = self
            .delegator_reward_pool
            .checked_add(rest)
            .ok_or(StakingError::ArithmeticOverflow("delegator reward pool"))?;
        let per_stake = U256::from(rest) * precision() / U256::from(self.total_staked);
        let acc_reward_per_stake = self
            .acc_reward_per_stake
            .checked_add(per_stake)
            .ok_or(StakingError::ArithmeticOverflow("acc_reward_per_stake"))?;

        self.reward_amount = reward_amount;
        self.delegator_reward_pool = delegator_reward_pool;
        self.acc_reward_per_stake = acc_reward_per_stake;
        Ok(())
    }

    pub(crate) fn write_to(&self, validator: &mut Validator) {
        validator.reward_amount = self.reward_amount;
        validator.delegator_reward_pool = self.delegator_reward_pool;
        validator.acc_reward_per_stake = self.acc_reward_per_stake;
    }
}

/// Credits worked out against the current ledger, not yet applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RewardPlan {
    books: BTreeMap<Address, RewardBook>,
    remainder_pool: Amount,
    last_remainder_flush: u64,
    flushed: Option<(u64, Amount)>,
}

impl RewardPlan {
    fn add_to_remainder(&mut self, dust: Amount) -> Result<(), StakingError> {
        self.remainder_pool = self
            .remainder_pool
            .checked_add(dust)
            .ok_or(StakingError::ArithmeticOverflow("remainder pool"))?;
        Ok(())
    }
}

impl StakingState {
    /// Active, non-jailed validators other than `excluded`
    pub(crate) fn eligible_validators(&self, excluded: Option<Address>) -> Vec<Address> {
        self.validator_set
            .active()
            .iter()
            .filter(|addr| Some(**addr) != excluded)
            .filter(|addr| self.validators.get(*addr).map_or(false, |v| !v.is_jailed()))
            .copied()
            .collect()
    }

    pub(crate) fn reward_plan(&self) -> RewardPlan {
        RewardPlan {
            books: BTreeMap::new(),
            remainder_pool: self.remainder_pool,
            last_remainder_flush: self.last_remainder_flush,
            flushed: None,
        }
    }

    fn book<'a>(&self, plan: &'a mut RewardPlan, validator: &Address) -> Result<&'a mut RewardBook, StakingError> {
        match plan.books.entry(*validator) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(RewardBook::of(self.validator_ref(validator)?))),
        }
    }

    /// Split `amount` across eligible validators; returns how many were credited
    pub(crate) fn plan_split(
        &self,
        plan: &mut RewardPlan,
        amount: Amount,
        excluded: Option<Address>,
    ) -> Result<usize, StakingError> {
        let eligible = self.eligible_validators(excluded);
        if eligible.is_empty() {
            debug!("No eligible validator, {} goes to the remainder pool", amount);
            plan.add_to_remainder(amount)?;
            return Ok(0);
        }

        let total_stake: U256 = eligible
            .iter()
            .filter_map(|addr| self.validators.get(addr))
            .fold(U256::zero(), |acc, v| acc + U256::from(v.total_staked));
        let count = eligible.len() as u128;

        let mut distributed: Amount = 0;
        for addr in &eligible {
            let book = self.book(plan, addr)?;
            let share = if total_stake.is_zero() {
                amount / count
            } else {
                to_amount(
                    U256::from(amount) * U256::from(book.total_staked) / total_stake,
                    "reward share",
                )?
            };
            book.credit(share)?;
            distributed += share;
        }

        plan.add_to_remainder(amount - distributed)?;
        Ok(eligible.len())
    }

    /// Flush the remainder pool when it reached the threshold or has not been flushed for a while
    pub(crate) fn plan_flush(&self, plan: &mut RewardPlan, block: u64) -> Result<(), StakingError> {
        if plan.remainder_pool == 0 {
            return Ok(());
        }
        let due_by_size = plan.remainder_pool >= self.params.remainder_flush_threshold();
        let due_by_age = block >= plan.last_remainder_flush.saturating_add(self.params.remainder_flush_interval);
        if !due_by_size && !due_by_age {
            return Ok(());
        }

        let eligible = self.eligible_validators(None);
        if eligible.is_empty() {
            return Ok(());
        }

        let amount = plan.remainder_pool;
        let per_validator = amount / eligible.len() as u128;
        let excess = amount - per_validator * eligible.len() as u128;
        for (i, addr) in eligible.iter().enumerate() {
            let share = if i == 0 { per_validator + excess } else { per_validator };
            self.book(plan, addr)?.credit(share)?;
        }

        plan.remainder_pool = 0;
        plan.last_remainder_flush = block;
        plan.flushed = Some((block, amount));
        Ok(())
    }

    pub(crate) fn apply_rewards(&mut self, plan: RewardPlan, events: &mut Vec<StakingEvent>) {
        for (addr, book) in &plan.books {
            if let Some(validator) = self.validators.get_mut(addr) {
                book.write_to(validator);
            }
        }
        self.remainder_pool = plan.remainder_pool;
        self.last_remainder_flush = plan.last_remainder_flush;
        if let Some((block, amount)) = plan.flushed {
            debug!("Flushed {} from the remainder pool at block {}", amount, block);
            events.push(StakingEvent::RemainderFlushed { block, amount });
        }
    }

    /// Block producer pays `amount` into the validator set
    pub(crate) fn distribute_block_reward(
        &mut self,
        ctx: CallContext,
        amount: Amount,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        if !ctx.is_block_producer() {
            return Err(StakingError::NotBlockProducer { caller: ctx.caller });
        }
        self.governance.ensure_not_emergency()?;
        let block = ctx.block.number;
        self.schedule.require_boundary(block)?;
        self.gates.distribute_reward.check("distribute_block_reward", block)?;
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }

        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow("custody balance"))?;
        let mut plan = self.reward_plan();
        let validators = self.plan_split(&mut plan, amount, None)?;
        self.plan_flush(&mut plan, block)?;

        self.gates.distribute_reward.record(block);
        self.balance = balance;
        info!(
            "Distributed block reward {} across {} validators at block {}",
            amount, validators, block
        );
        events.push(StakingEvent::BlockRewardDistributed {
            block,
            amount,
            validators,
        });
        self.apply_rewards(plan, events);
        Ok(())
    }

    pub(crate) fn claim_delegator_rewards(
        &mut self,
        ctx: CallContext,
        validator_addr: Address,
        events: &mut Vec<StakingEvent>,
    ) -> Result<Payout, StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        let delegator = ctx.caller;
        let validator = self
            .validators
            .get(&validator_addr)
            .ok_or(StakingError::ValidatorNotFound(validator_addr))?;
        let mut position = self
            .positions
            .get(&validator_addr)
            .and_then(|positions| positions.get(&delegator))
            .cloned()
            .ok_or(StakingError::NothingToClaim)?;

        settle_position(validator, &mut position)?;
        let amount = position.pending_rewards;
        if amount == 0 {
            return Err(StakingError::NothingToClaim);
        }
        if amount > validator.delegator_reward_pool {
            return Err(StakingError::InsufficientRewardPool {
                validator: validator_addr,
                available: validator.delegator_reward_pool,
                requested: amount,
            });
        }
        let pool = validator.delegator_reward_pool - amount;
        position.pending_rewards = 0;

        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            validator.delegator_reward_pool = pool;
        }
        self.store_position(validator_addr, delegator, position);
        info!("{} claimed {} in rewards from {}", delegator, amount, validator_addr);
        events.push(StakingEvent::DelegatorRewardsClaimed {
            validator: validator_addr,
            delegator,
            amount,
        });
        Ok(Payout::new(delegator, amount))
    }

    /// Pay accumulated commission to the validator's reward address
    pub(crate) fn withdraw_rewards(
        &mut self,
        ctx: CallContext,
        events: &mut Vec<StakingEvent>,
    ) -> Result<Payout, StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        let validator = self.validator_mut(&ctx.caller)?;
        let amount = validator.reward_amount;
        if amount == 0 {
            return Err(StakingError::NothingToClaim);
        }
        validator.reward_amount = 0;
        let reward_addr = validator.reward_addr;

        info!("Validator {} withdrew {} commission to {}", ctx.caller, amount, reward_addr);
        events.push(StakingEvent::ValidatorRewardsWithdrawn {
            validator: ctx.caller,
            reward_addr,
            amount,
        });
        Ok(Payout::new(reward_addr, amount))
    }

    /// Rewards `delegator` could claim from `validator` right now
    pub(crate) fn pending_rewards(&self, validator_addr: &Address, delegator: &Address) -> Result<Amount, StakingError> {
        let validator = self.validator_ref(validator_addr)?;
        let mut position = match self.positions.get(validator_addr).and_then(|p| p.get(delegator)) {
            Some(position) => position.clone(),
            None => return Ok(0),
        };
        settle_position(validator, &mut position)?;
        Ok(position.pending_rewards)
    }
}
