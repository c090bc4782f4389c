// Slash propagation.
// A slash never touches delegator positions directly. It advances the
// validator's acc_slash_per_stake and appends a SlashCheckpoint; each position
// replays the checkpoints it has not seen the next time it is settled. Losses
// are rounded up, so the settled positions of a validator never add up to more
// than its total_staked.

use log::{debug, info, warn};
use primitive_types::U256;

use super::pos_structs::{precision, DelegatorPosition, SlashCheckpoint, StakingEvent, Validator, ValidatorStatus};
use super::rewards::{accrue_rewards, reward_debt_of, to_amount, RewardPlan};
use super::StakingState;
use crate::blockchain::{Address, Amount, CallContext, LIVENESS_TRACKER_ADDRESS, STAKING_ADDRESS};
use crate::errors::StakingError;

fn ceil_div(numerator: U256, denominator: U256) -> U256 {
    let (quotient, remainder) = numerator.div_mod(denominator);
    if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::one()
    }
}

/// Bring `position` up to date with every slash and reward of `validator`.
///
/// Unbonding positions already left the validator's stake and are not touched.
pub(crate) fn settle_position(validator: &Validator, position: &mut DelegatorPosition) -> Result<(), StakingError> {
    if position.is_unstaking() {
        return Ok(());
    }

    let start = validator
        .slash_checkpoints
        .partition_point(|cp| cp.acc_slash_per_stake <= position.slash_debt);
    for checkpoint in &validator.slash_checkpoints[start..] {
        accrue_rewards(position, checkpoint.acc_reward_per_stake)?;

        let scaled = U256::from(position.delegated_amount)
            .checked_mul(checkpoint.slash_per_stake)
            .ok_or(StakingError::ArithmeticOverflow("slash settlement"))?;
        let loss = to_amount(ceil_div(scaled, precision()), "slash settlement")?.min(position.delegated_amount);
        position.delegated_amount -= loss;
        position.reward_debt = reward_debt_of(position.delegated_amount, checkpoint.acc_reward_per_stake)?;
        position.slash_debt = checkpoint.acc_slash_per_stake;
    }

    accrue_rewards(position, validator.acc_reward_per_stake)?;
    position.slash_debt = validator.acc_slash_per_stake;
    Ok(())
}

/// Effect of one slash on a validator, computed before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlashEntry {
    penalty: Amount,
    checkpoint: Option<SlashCheckpoint>,
    slash_amount: Amount,
}

impl SlashEntry {
    /// Work out a slash of `penalty`, capped at the validator's stake
    pub(crate) fn compute(validator: &Validator, penalty: Amount) -> Result<Self, StakingError> {
        let penalty = penalty.min(validator.total_staked);
        let checkpoint = if penalty == 0 {
            None
        } else {
            let slash_per_stake = ceil_div(
                U256::from(penalty) * precision(),
                U256::from(validator.total_staked),
            );
            let acc_slash_per_stake = validator
                .acc_slash_per_stake
                .checked_add(slash_per_stake)
                .ok_or(StakingError::ArithmeticOverflow("acc_slash_per_stake"))?;
            Some(SlashCheckpoint {
                acc_slash_per_stake,
                slash_per_stake,
                acc_reward_per_stake: validator.acc_reward_per_stake,
            })
        };
        let slash_amount = validator
            .slash_amount
            .checked_add(penalty)
            .ok_or(StakingError::ArithmeticOverflow("slash amount"))?;
        Ok(Self {
            penalty,
            checkpoint,
            slash_amount,
        })
    }

    pub(crate) fn penalty(&self) -> Amount {
        self.penalty
    }

    /// Per-stake loss of this slash
    pub(crate) fn slash_per_stake(&self) -> U256 {
        self.checkpoint.as_ref().map_or(U256::zero(), |cp| cp.slash_per_stake)
    }

    pub(crate) fn write_to(self, validator: &mut Validator) {
        if let Some(checkpoint) = self.checkpoint {
            validator.acc_slash_per_stake = checkpoint.acc_slash_per_stake;
            validator.slash_checkpoints.push(checkpoint);
        }
        validator.total_staked -= self.penalty;
        validator.slash_amount = self.slash_amount;
    }
}

/// A jailing worked out against the current ledger
#[derive(Debug, Clone)]
pub(crate) struct SlashPlan {
    validator: Address,
    entry: SlashEntry,
    rewards: RewardPlan,
}

impl StakingState {
    /// Check that `validator_addr` can be jailed and work out the penalty and its redistribution
    pub(crate) fn plan_slash(&self, validator_addr: Address) -> Result<SlashPlan, StakingError> {
        let validator = self.validator_ref(&validator_addr)?;
        if validator.is_jailed() {
            return Err(StakingError::InvalidValidatorStatus {
                validator: validator_addr,
                status: validator.status,
                expected: "not jailed",
            });
        }

        let entry = SlashEntry::compute(validator, self.params.slash_penalty())?;
        let mut rewards = self.reward_plan();
        if entry.penalty() > 0 {
            self.plan_split(&mut rewards, entry.penalty(), Some(validator_addr))?;
        }
        Ok(SlashPlan {
            validator: validator_addr,
            entry,
            rewards,
        })
    }

    /// Jail the validator and hand its penalty to the rest of the active set
    pub(crate) fn apply_slash(&mut self, plan: SlashPlan, block: u64, events: &mut Vec<StakingEvent>) -> Amount {
        let SlashPlan {
            validator: validator_addr,
            entry,
            rewards,
        } = plan;
        let penalty = entry.penalty();
        debug!(
            "Slash of {} on {} advances acc_slash_per_stake by {}",
            penalty,
            validator_addr,
            entry.slash_per_stake()
        );
        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            validator.status = ValidatorStatus::Jailed;
            entry.write_to(validator);
        }

        self.validator_set.remove_active(&validator_addr);
        self.validator_set.remove_candidate(&validator_addr);
        self.total_network_staked = self.total_network_staked.saturating_sub(penalty);
        if self.validator_set.candidate_count() == 0 {
            warn!("Slashing {} left the candidate set empty", validator_addr);
        }

        info!(
            "Validator {} slashed by {} and jailed at block {}",
            validator_addr, penalty, block
        );
        events.push(StakingEvent::ValidatorSlashed {
            validator: validator_addr,
            penalty,
            block,
        });
        self.apply_rewards(rewards, events);
        penalty
    }

    /// Jail `validator_addr` and take the configured penalty from its stake
    pub(crate) fn slash_validator(
        &mut self,
        ctx: CallContext,
        validator_addr: Address,
        events: &mut Vec<StakingEvent>,
    ) -> Result<Amount, StakingError> {
        if ctx.caller != LIVENESS_TRACKER_ADDRESS {
            return Err(StakingError::Unauthorized {
                caller: ctx.caller,
                role: "liveness tracker",
            });
        }
        let plan = self.plan_slash(validator_addr)?;
        Ok(self.apply_slash(plan, ctx.block.number, events))
    }

    /// Caller leaves jail after its missed-block record is cleared
    pub(crate) fn unjail_validator(
        &mut self,
        ctx: CallContext,
        events: &mut Vec<StakingEvent>,
    ) -> Result<ValidatorStatus, StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        let validator_addr = ctx.caller;
        let validator = self.validator_ref(&validator_addr)?;
        if !validator.is_jailed() {
            return Err(StakingError::InvalidValidatorStatus {
                validator: validator_addr,
                status: validator.status,
                expected: "Jailed",
            });
        }

        let total = validator.total_staked;
        let status = if total >= self.params.min_validator_stake() {
            ValidatorStatus::Staked
        } else {
            ValidatorStatus::Unstake
        };

        self.clean(ctx.with_caller(STAKING_ADDRESS), validator_addr)?;
        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            validator.status = status;
        }

        info!("Validator {} unjailed as {}", validator_addr, status);
        events.push(StakingEvent::ValidatorUnjailed {
            validator: validator_addr,
            status,
        });
        if status == ValidatorStatus::Staked {
            self.offer_candidate(validator_addr, total, events);
        }
        Ok(status)
    }

    /// Stake `delegator` would lose to slashes not yet settled on its position
    pub(crate) fn pending_slash(&self, validator_addr: &Address, delegator: &Address) -> Result<Amount, StakingError> {
        let validator = self.validator_ref(validator_addr)?;
        let position = match self.positions.get(validator_addr).and_then(|p| p.get(delegator)) {
            Some(position) => position,
            None => return Ok(0),
        };
        let mut settled = position.clone();
        settle_position(validator, &mut settled)?;
        Ok(position.delegated_amount - settled.delegated_amount)
    }
}
