// Stake ledger: validator lifecycle and delegator positions

use log::{debug, info, warn};

use super::payout::Payout;
use super::pos_structs::{
    CandidateAdmission, DelegatorPosition, Description, StakingEvent, Validator, ValidatorStatus,
};
use super::rewards::reward_debt_of;
use super::slashing::settle_position;
use super::StakingState;
use crate::blockchain::{Address, Amount, CallContext};
use crate::errors::StakingError;

/// A delegation worked out against the current ledger, applied without further checks
#[derive(Debug, Clone)]
pub(crate) struct StakePlan {
    validator: Address,
    delegator: Address,
    amount: Amount,
    position: DelegatorPosition,
    list_delegator: bool,
    total_staked: Amount,
    status: ValidatorStatus,
    total_network_staked: Amount,
    balance: Amount,
}

impl StakingState {
    pub(crate) fn validator_ref(&self, validator: &Address) -> Result<&Validator, StakingError> {
        self.validators
            .get(validator)
            .filter(|v| v.status != ValidatorStatus::NotExist)
            .ok_or(StakingError::ValidatorNotFound(*validator))
    }

    pub(crate) fn validator_mut(&mut self, validator: &Address) -> Result<&mut Validator, StakingError> {
        self.validators
            .get_mut(validator)
            .filter(|v| v.status != ValidatorStatus::NotExist)
            .ok_or(StakingError::ValidatorNotFound(*validator))
    }

    /// Register the caller as a validator, optionally staking `stake` right away
    pub(crate) fn create_validator(
        &mut self,
        ctx: CallContext,
        reward_addr: Address,
        commission_rate: Option<u64>,
        description: Description,
        stake: Amount,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        let validator = ctx.caller;
        if self.validator_ref(&validator).is_ok() {
            return Err(StakingError::ValidatorAlreadyExists(validator));
        }

        let rate = commission_rate.unwrap_or(self.params.default_commission_rate);
        self.check_commission(rate)?;
        description.validate()?;

        let created = Validator::new(reward_addr, rate, description, ctx.block.number);
        let initial_stake = if stake > 0 {
            Some(self.plan_stake(&created, validator, validator, stake)?)
        } else {
            None
        };

        self.validators.insert(validator, created);
        info!(
            "Validator created: {} (reward address {}, commission {} bp)",
            validator, reward_addr, rate
        );
        events.push(StakingEvent::ValidatorCreated {
            validator,
            reward_addr,
            commission_rate: rate,
        });

        if let Some(plan) = initial_stake {
            self.apply_stake(plan, events);
        }
        Ok(())
    }

    pub(crate) fn edit_validator(
        &mut self,
        ctx: CallContext,
        reward_addr: Address,
        description: Description,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        description.validate()?;
        let validator = self.validator_mut(&ctx.caller)?;
        validator.reward_addr = reward_addr;
        validator.description = description;
        debug!("Validator {} edited", ctx.caller);
        events.push(StakingEvent::ValidatorEdited {
            validator: ctx.caller,
            reward_addr,
        });
        Ok(())
    }

    pub(crate) fn update_commission_rate(
        &mut self,
        ctx: CallContext,
        rate: u64,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        self.check_commission(rate)?;
        let validator = self.validator_mut(&ctx.caller)?;
        validator.commission_rate = rate;
        info!("Validator {} commission set to {} bp", ctx.caller, rate);
        events.push(StakingEvent::CommissionRateUpdated {
            validator: ctx.caller,
            commission_rate: rate,
        });
        Ok(())
    }

    pub(crate) fn store_position(&mut self, validator: Address, delegator: Address, position: DelegatorPosition) {
        self.positions.entry(validator).or_default().insert(delegator, position);
    }

    fn check_commission(&self, rate: u64) -> Result<(), StakingError> {
        if rate > self.params.max_commission_rate {
            return Err(StakingError::CommissionTooHigh {
                rate,
                max: self.params.max_commission_rate,
            });
        }
        Ok(())
    }

    /// Delegate `amount` from the caller to `validator`
    pub(crate) fn stake(
        &mut self,
        ctx: CallContext,
        validator_addr: Address,
        amount: Amount,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let validator = self.validator_ref(&validator_addr)?;
        let plan = self.plan_stake(validator, validator_addr, ctx.caller, amount)?;
        self.apply_stake(plan, events);
        Ok(())
    }

    /// Check a delegation of `amount` to `validator` and work out its effects
    fn plan_stake(
        &self,
        validator: &Validator,
        validator_addr: Address,
        delegator: Address,
        amount: Amount,
    ) -> Result<StakePlan, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let min_delegator = self.params.min_delegator_stake();
        let min_validator = self.params.min_validator_stake();

        let mut position = self
            .positions
            .get(&validator_addr)
            .and_then(|positions| positions.get(&delegator))
            .cloned()
            .unwrap_or_else(|| DelegatorPosition {
                slash_debt: validator.acc_slash_per_stake,
                ..DelegatorPosition::default()
            });
        if position.is_unstaking() {
            return Err(StakingError::AlreadyUnstaking);
        }

        settle_position(validator, &mut position)?;

        let first_delegation = position.delegated_amount == 0;
        let total_staked = validator
            .total_staked
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow("validator total stake"))?;
        if first_delegation {
            if amount < min_delegator {
                return Err(StakingError::BelowMinimumDelegation {
                    amount,
                    minimum: min_delegator,
                });
            }
            if total_staked < min_validator {
                return Err(StakingError::BelowMinimumValidatorStake {
                    total: total_staked,
                    minimum: min_validator,
                });
            }
        }

        let list_delegator = !validator.lists_delegator(&delegator, position.index);
        if list_delegator {
            position.index = validator.delegators.len();
        }
        position.delegated_amount = position
            .delegated_amount
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow("delegated amount"))?;
        position.reward_debt = reward_debt_of(position.delegated_amount, validator.acc_reward_per_stake)?;

        let status = if total_staked >= min_validator
            && matches!(validator.status, ValidatorStatus::Created | ValidatorStatus::Unstake)
        {
            ValidatorStatus::Staked
        } else {
            validator.status
        };

        Ok(StakePlan {
            validator: validator_addr,
            delegator,
            amount,
            position,
            list_delegator,
            total_staked,
            status,
            total_network_staked: self
                .total_network_staked
                .checked_add(amount)
                .ok_or(StakingError::ArithmeticOverflow("network stake"))?,
            balance: self
                .balance
                .checked_add(amount)
                .ok_or(StakingError::ArithmeticOverflow("custody balance"))?,
        })
    }

    fn apply_stake(&mut self, plan: StakePlan, events: &mut Vec<StakingEvent>) {
        let StakePlan {
            validator: validator_addr,
            delegator,
            amount,
            position,
            list_delegator,
            total_staked,
            status,
            total_network_staked,
            balance,
        } = plan;

        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            if list_delegator {
                validator.delegators.push(delegator);
            }
            validator.total_staked = total_staked;
            if validator.status != status {
                debug!("Validator {} is now {}", validator_addr, status);
                validator.status = status;
            }
        }
        self.store_position(validator_addr, delegator, position);
        self.total_network_staked = total_network_staked;
        self.balance = balance;

        info!("{} staked {} with validator {}", delegator, amount, validator_addr);
        events.push(StakingEvent::Staked {
            validator: validator_addr,
            delegator,
            amount,
        });

        if status == ValidatorStatus::Staked {
            self.offer_candidate(validator_addr, total_staked, events);
        }
    }

    /// Try to place a Staked validator in the candidate set. A full set is not an error here.
    pub(crate) fn offer_candidate(
        &mut self,
        validator: Address,
        stake: Amount,
        events: &mut Vec<StakingEvent>,
    ) {
        let validators = &self.validators;
        let admission = self.validator_set.add_candidate(validator, stake, |incumbent| {
            validators.get(incumbent).map_or(0, |v| v.total_staked)
        });
        match admission {
            Ok(CandidateAdmission::Added) => events.push(StakingEvent::CandidateAdded { validator }),
            Ok(CandidateAdmission::Replaced(evicted)) => {
                info!("Validator {} evicted from candidates by {}", evicted, validator);
                events.push(StakingEvent::CandidateEvicted {
                    validator: evicted,
                    replaced_by: validator,
                });
                events.push(StakingEvent::CandidateAdded { validator });
            }
            Ok(CandidateAdmission::AlreadyPresent) => {}
            Err(err) => {
                debug!("Validator {} not admitted as candidate: {}", validator, err);
                events.push(StakingEvent::CandidateRejected { validator, stake });
            }
        }
    }

    /// Move the caller's whole position with `validator` into the unbonding state.
    ///
    /// When the last listed delegator leaves, the rounding dust that slashes
    /// left in the validator's stake moves to the remainder pool.
    pub(crate) fn unstake(
        &mut self,
        ctx: CallContext,
        validator_addr: Address,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        let delegator = ctx.caller;
        let min_validator = self.params.min_validator_stake();
        let sole_candidate =
            self.validator_set.candidate_count() == 1 && self.validator_set.is_candidate(&validator_addr);

        let validator = self.validator_ref(&validator_addr)?;
        let mut position = self
            .positions
            .get(&validator_addr)
            .and_then(|positions| positions.get(&delegator))
            .filter(|p| !p.is_unstaking() && validator.lists_delegator(&delegator, p.index))
            .cloned()
            .ok_or(StakingError::NoActiveStake(validator_addr))?;

        settle_position(validator, &mut position)?;
        let amount = position.delegated_amount;
        let remaining = validator.total_staked.saturating_sub(amount);
        let dust = if validator.delegators.len() == 1 { remaining } else { 0 };
        let new_total = remaining - dust;
        if sole_candidate && new_total < min_validator {
            return Err(StakingError::LastValidator);
        }
        let demote = validator.status == ValidatorStatus::Staked && new_total < min_validator;

        let total_unstaking = self
            .total_unstaking
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow("unstaking total"))?;
        let remainder_pool = self
            .remainder_pool
            .checked_add(dust)
            .ok_or(StakingError::ArithmeticOverflow("remainder pool"))?;
        position.unstake_timestamp = Some(ctx.block.timestamp);
        let unlock_at = ctx.block.timestamp.saturating_add(self.params.lock_period);
        let index = position.index;

        // swap-and-pop, then fix the index of the delegator moved into the hole
        let mut still_staked = false;
        let mut moved = None;
        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            validator.delegators.swap_remove(index);
            moved = validator.delegators.get(index).copied();
            validator.total_staked = new_total;
            if demote {
                info!("Validator {} fell below the minimum stake", validator_addr);
                validator.status = ValidatorStatus::Unstake;
            }
            still_staked = validator.status == ValidatorStatus::Staked;
        }
        self.store_position(validator_addr, delegator, position);
        if let Some(moved_position) = moved.and_then(|moved| {
            self.positions
                .get_mut(&validator_addr)
                .and_then(|positions| positions.get_mut(&moved))
        }) {
            moved_position.index = index;
        }

        self.total_network_staked = self.total_network_staked.saturating_sub(amount + dust);
        self.total_unstaking = total_unstaking;
        self.remainder_pool = remainder_pool;
        if !still_staked && self.validator_set.remove_candidate(&validator_addr) {
            warn!("Validator {} removed from the candidate set", validator_addr);
        }

        info!(
            "{} unstaked {} from validator {}, unlocks at {}",
            delegator, amount, validator_addr, unlock_at
        );
        events.push(StakingEvent::Unstaked {
            validator: validator_addr,
            delegator,
            amount,
            unlock_at,
        });
        if dust > 0 {
            info!("Reclaimed {} of stake dust from validator {}", dust, validator_addr);
            events.push(StakingEvent::StakeDustReclaimed {
                validator: validator_addr,
                amount: dust,
            });
        }
        Ok(())
    }

    /// Release an unstaked principal once the lock period has elapsed
    pub(crate) fn withdraw_staking(
        &mut self,
        ctx: CallContext,
        validator_addr: Address,
        events: &mut Vec<StakingEvent>,
    ) -> Result<Payout, StakingError> {
        self.governance.ensure_user_ops_enabled()?;
        let delegator = ctx.caller;
        let lock_period = self.params.lock_period;
        let position = self
            .positions
            .get_mut(&validator_addr)
            .and_then(|positions| positions.get_mut(&delegator))
            .ok_or(StakingError::NothingToWithdraw)?;

        let unstaked_at = match position.unstake_timestamp {
            Some(ts) => ts,
            None if position.delegated_amount > 0 => return Err(StakingError::NotUnstaking),
            None => return Err(StakingError::NothingToWithdraw),
        };
        let unlock_at = unstaked_at.saturating_add(lock_period);
        if ctx.block.timestamp < unlock_at {
            return Err(StakingError::LockPeriodActive { unlock_at });
        }

        let amount = position.delegated_amount;
        position.delegated_amount = 0;
        position.unstake_timestamp = None;
        position.reward_debt = Default::default();
        self.total_unstaking = self.total_unstaking.saturating_sub(amount);

        info!("{} withdrew {} from validator {}", delegator, amount, validator_addr);
        events.push(StakingEvent::StakeWithdrawn {
            validator: validator_addr,
            delegator,
            amount,
        });
        Ok(Payout::new(delegator, amount))
    }
}
