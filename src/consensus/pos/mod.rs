// Delegated proof-of-stake engine
// StakingState owns all ledger data. Every operation checks its preconditions
// before the first write, so a rejected call leaves no trace.

pub mod governance;
pub mod ledger;
pub mod payout;
pub mod pos_structs;
pub mod rewards;
pub mod slashing;
pub mod validator_set;

pub use governance::Governance;
pub use payout::{BalanceSink, Payout, ReentrancyGuard, ReentrancyToken, ValueSink};

use payout::PayoutCheckpoint;
pub use pos_structs::*;
pub use validator_set::{BoundedAddressList, ValidatorSet};

#[cfg(test)]
pub use payout::MockValueSink;

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Address, Amount, BlockContext, CallContext};
use crate::config::{StakingConfig, StakingParams};
use crate::consensus::epoch::{EpochSchedule, PrivilegedGates};
use crate::consensus::liveness::{LivenessTracker, SlashRecord};
use crate::errors::StakingError;

/// Complete ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingState {
    pub(crate) params: StakingParams,
    pub(crate) validators: BTreeMap<Address, Validator>,
    /// validator -> delegator -> position
    pub(crate) positions: BTreeMap<Address, BTreeMap<Address, DelegatorPosition>>,
    pub(crate) validator_set: ValidatorSet,
    pub(crate) schedule: EpochSchedule,
    pub(crate) gates: PrivilegedGates,
    pub(crate) governance: Governance,
    pub(crate) liveness: LivenessTracker,
    pub(crate) total_network_staked: Amount,
    /// Principal of positions waiting out their lock period
    pub(crate) total_unstaking: Amount,
    pub(crate) remainder_pool: Amount,
    pub(crate) last_remainder_flush: u64,
    /// Value held in custody by the ledger
    pub(crate) balance: Amount,
}

impl StakingState {
    pub fn new(config: &StakingConfig) -> Self {
        Self {
            params: config.params.clone(),
            validators: BTreeMap::new(),
            positions: BTreeMap::new(),
            validator_set: ValidatorSet::new(config.params.max_validator_num),
            schedule: EpochSchedule::new(config.params.epoch_length),
            gates: PrivilegedGates::default(),
            governance: Governance::new(&config.governance),
            liveness: LivenessTracker::new(config.liveness.clone()),
            total_network_staked: 0,
            total_unstaking: 0,
            remainder_pool: 0,
            last_remainder_flush: 0,
            balance: 0,
        }
    }

    /// Everything the ledger owes to someone
    pub fn outstanding_liabilities(&self) -> Amount {
        let owed_by_validators: Amount = self
            .validators
            .values()
            .map(|v| v.delegator_reward_pool + v.reward_amount)
            .sum();
        self.total_network_staked + self.total_unstaking + owed_by_validators + self.remainder_pool
    }
}

/// Entry point for hosts: every operation is atomic and buffers its events
#[derive(Debug)]
pub struct StakingEngine<S: ValueSink = BalanceSink> {
    state: StakingState,
    events: Vec<StakingEvent>,
    sink: S,
    guard: ReentrancyGuard,
}

impl StakingEngine<BalanceSink> {
    pub fn from_config(config: &StakingConfig) -> Result<Self, StakingError> {
        Self::with_sink(config, BalanceSink::new())
    }
}

impl<S: ValueSink> StakingEngine<S> {
    /// Build an engine, creating and staking the genesis validators
    pub fn with_sink(config: &StakingConfig, sink: S) -> Result<Self, StakingError> {
        let validation = config.validate();
        if !validation.is_valid {
            return Err(StakingError::InvalidParameter(validation.get_summary()));
        }

        let mut engine = Self {
            state: StakingState::new(config),
            events: Vec::new(),
            sink,
            guard: ReentrancyGuard::new(),
        };

        let genesis_block = BlockContext::new(0, 0, Address::ZERO);
        for genesis in &config.genesis {
            let ctx = CallContext::new(genesis.address, genesis_block);
            let description = Description::with_moniker(genesis.moniker.clone());
            let reward_addr = genesis.reward_addr.unwrap_or(genesis.address);
            let stake = Amount::from(genesis.stake);
            engine.transact(|state, events| {
                state.create_validator(ctx, reward_addr, genesis.commission_rate, description, stake, events)
            })?;
        }
        if !config.genesis.is_empty() {
            let active = engine.state.validator_set.refresh_active().len();
            info!("Genesis complete with {} active validators", active);
        }
        Ok(engine)
    }

    /// Restore an engine from a JSON snapshot
    pub fn from_snapshot(json: &str, sink: S) -> Result<Self, StakingError> {
        let state: StakingState =
            serde_json::from_str(json).map_err(|e| StakingError::StateSnapshot(e.to_string()))?;
        Ok(Self {
            state,
            events: Vec::new(),
            sink,
            guard: ReentrancyGuard::new(),
        })
    }

    /// Run `op` against the state; on error the events it buffered are dropped.
    ///
    /// Operations do all their fallible work before the first write, so a
    /// rejected call has nothing to undo in the state.
    fn transact<T, F>(&mut self, op: F) -> Result<T, StakingError>
    where
        F: FnOnce(&mut StakingState, &mut Vec<StakingEvent>) -> Result<T, StakingError>,
    {
        #[cfg(test)]
        let before = self.state.clone();
        let mark = self.events.len();
        let result = op(&mut self.state, &mut self.events);
        if let Err(err) = &result {
            warn!("Operation rejected: {}", err);
            self.events.truncate(mark);
            #[cfg(test)]
            assert_eq!(self.state, before, "rejected operation wrote to the ledger");
        }
        result
    }

    /// Run a paying operation under the reentrancy guard, sending its payout last.
    /// A refused transfer restores the records the operation touched.
    fn transact_payout<F>(
        &mut self,
        validator: Address,
        delegator: Option<Address>,
        op: F,
    ) -> Result<Amount, StakingError>
    where
        F: FnOnce(&mut StakingState, &mut Vec<StakingEvent>) -> Result<Payout, StakingError>,
    {
        let _token = self.guard.enter()?;
        let checkpoint = PayoutCheckpoint::capture(&self.state, validator, delegator);
        let mark = self.events.len();
        let payout = self.transact(op)?;
        match payout.send(&mut self.sink, &mut self.state.balance) {
            Ok(amount) => Ok(amount),
            Err(err) => {
                warn!("Payout of {} to {} failed: {}", payout.amount, payout.to, err);
                checkpoint.restore(&mut self.state);
                self.events.truncate(mark);
                Err(err)
            }
        }
    }

    // Validator lifecycle

    pub fn create(
        &mut self,
        ctx: CallContext,
        reward_addr: Address,
        description: Description,
        stake: Amount,
    ) -> Result<(), StakingError> {
        self.transact(|state, events| {
            state.create_validator(ctx, reward_addr, None, description, stake, events)
        })
    }

    pub fn create_with_commission(
        &mut self,
        ctx: CallContext,
        reward_addr: Address,
        commission_rate: u64,
        description: Description,
        stake: Amount,
    ) -> Result<(), StakingError> {
        self.transact(|state, events| {
            state.create_validator(ctx, reward_addr, Some(commission_rate), description, stake, events)
        })
    }

    pub fn edit(&mut self, ctx: CallContext, reward_addr: Address, description: Description) -> Result<(), StakingError> {
        self.transact(|state, events| state.edit_validator(ctx, reward_addr, description, events))
    }

    pub fn update_commission_rate(&mut self, ctx: CallContext, rate: u64) -> Result<(), StakingError> {
        self.transact(|state, events| state.update_commission_rate(ctx, rate, events))
    }

    pub fn unjail_validator(&mut self, ctx: CallContext) -> Result<ValidatorStatus, StakingError> {
        self.transact(|state, events| state.unjail_validator(ctx, events))
    }

    // Delegation

    pub fn stake(&mut self, ctx: CallContext, validator: Address, amount: Amount) -> Result<(), StakingError> {
        self.transact(|state, events| state.stake(ctx, validator, amount, events))
    }

    pub fn unstake(&mut self, ctx: CallContext, validator: Address) -> Result<(), StakingError> {
        self.transact(|state, events| state.unstake(ctx, validator, events))
    }

    pub fn withdraw_staking(&mut self, ctx: CallContext, validator: Address) -> Result<Amount, StakingError> {
        self.transact_payout(validator, Some(ctx.caller), |state, events| {
            state.withdraw_staking(ctx, validator, events)
        })
    }

    pub fn claim_delegator_rewards(&mut self, ctx: CallContext, validator: Address) -> Result<Amount, StakingError> {
        self.transact_payout(validator, Some(ctx.caller), |state, events| {
            state.claim_delegator_rewards(ctx, validator, events)
        })
    }

    pub fn withdraw_rewards(&mut self, ctx: CallContext) -> Result<Amount, StakingError> {
        self.transact_payout(ctx.caller, None, |state, events| state.withdraw_rewards(ctx, events))
    }

    // Block producer

    pub fn distribute_block_reward(&mut self, ctx: CallContext, amount: Amount) -> Result<(), StakingError> {
        self.transact(|state, events| state.distribute_block_reward(ctx, amount, events))
    }

    pub fn update_activated_validators(&mut self, ctx: CallContext) -> Result<Vec<Address>, StakingError> {
        self.transact(|state, events| {
            if !ctx.is_block_producer() {
                return Err(StakingError::NotBlockProducer { caller: ctx.caller });
            }
            let block = ctx.block.number;
            state.schedule.require_boundary(block)?;
            state.gates.update_active_set.check("update_activated_validators", block)?;
            state.gates.update_active_set.record(block);
            let validators = state.validator_set.refresh_active().to_vec();
            info!("Active set updated at block {} with {} validators", block, validators.len());
            events.push(StakingEvent::ActiveSetUpdated {
                block,
                validators: validators.clone(),
            });
            Ok(validators)
        })
    }

    /// Report a missed block; returns true when the report slashed the validator
    pub fn slash(&mut self, ctx: CallContext, validator: Address) -> Result<bool, StakingError> {
        self.transact(|state, events| state.report_missed_block(ctx, validator, events))
    }

    pub fn decrease_missed_blocks_counter(&mut self, ctx: CallContext) -> Result<(), StakingError> {
        self.transact(|state, events| state.decrease_missed_blocks_counter(ctx, events))
    }

    // Cross-component

    pub fn slash_validator(&mut self, ctx: CallContext, validator: Address) -> Result<Amount, StakingError> {
        self.transact(|state, events| state.slash_validator(ctx, validator, events))
    }

    pub fn clean(&mut self, ctx: CallContext, validator: Address) -> Result<(), StakingError> {
        self.transact(|state, _| state.clean(ctx, validator))
    }

    // Administration

    pub fn pause(&mut self, ctx: CallContext) -> Result<(), StakingError> {
        self.transact(|state, events| {
            state.governance.pause(ctx.caller)?;
            events.push(StakingEvent::Paused { by: ctx.caller });
            Ok(())
        })
    }

    pub fn unpause(&mut self, ctx: CallContext) -> Result<(), StakingError> {
        self.transact(|state, events| {
            state.governance.unpause(ctx.caller)?;
            events.push(StakingEvent::Unpaused { by: ctx.caller });
            Ok(())
        })
    }

    pub fn transfer_admin(&mut self, ctx: CallContext, new_admin: Address) -> Result<(), StakingError> {
        self.transact(|state, events| {
            let previous = state.governance.transfer_admin(ctx.caller, new_admin)?;
            events.push(StakingEvent::AdminTransferred {
                previous,
                admin: new_admin,
            });
            Ok(())
        })
    }

    pub fn set_emergency_pause(&mut self, ctx: CallContext, paused: bool) -> Result<(), StakingError> {
        self.transact(|state, events| {
            state.governance.set_emergency_pause(ctx.caller, paused)?;
            events.push(StakingEvent::EmergencyPauseSet { paused });
            Ok(())
        })
    }

    pub fn update_slash_threshold(&mut self, ctx: CallContext, slash_threshold: u64) -> Result<(), StakingError> {
        self.transact(|state, events| state.update_slash_threshold(ctx, slash_threshold, events))
    }

    pub fn update_decrease_rate(&mut self, ctx: CallContext, decrease_rate: u64) -> Result<(), StakingError> {
        self.transact(|state, events| state.update_decrease_rate(ctx, decrease_rate, events))
    }

    // Views

    pub fn validator(&self, validator: &Address) -> Option<&Validator> {
        self.state.validators.get(validator)
    }

    /// All validators in address order
    pub fn validators(&self) -> impl Iterator<Item = (&Address, &Validator)> {
        self.state.validators.iter()
    }

    pub fn validator_status(&self, validator: &Address) -> ValidatorStatus {
        self.validator(validator).map_or(ValidatorStatus::NotExist, |v| v.status)
    }

    /// Stored position, not settled against pending slashes
    pub fn delegator_position(&self, validator: &Address, delegator: &Address) -> Option<&DelegatorPosition> {
        self.state.positions.get(validator).and_then(|p| p.get(delegator))
    }

    pub fn pending_rewards(&self, validator: &Address, delegator: &Address) -> Result<Amount, StakingError> {
        self.state.pending_rewards(validator, delegator)
    }

    pub fn pending_slash(&self, validator: &Address, delegator: &Address) -> Result<Amount, StakingError> {
        self.state.pending_slash(validator, delegator)
    }

    pub fn is_active_validator(&self, validator: &Address) -> bool {
        self.state.validator_set.is_active(validator)
    }

    pub fn is_candidate(&self, validator: &Address) -> bool {
        self.state.validator_set.is_candidate(validator)
    }

    pub fn active_validators(&self) -> &[Address] {
        self.state.validator_set.active()
    }

    pub fn candidate_validators(&self) -> &[Address] {
        self.state.validator_set.candidates()
    }

    pub fn total_network_staked(&self) -> Amount {
        self.state.total_network_staked
    }

    pub fn total_unstaking(&self) -> Amount {
        self.state.total_unstaking
    }

    pub fn remainder_pool(&self) -> Amount {
        self.state.remainder_pool
    }

    pub fn delegators_of(&self, validator: &Address) -> &[Address] {
        self.validator(validator).map_or(&[][..], |v| v.delegators.as_slice())
    }

    pub fn missed_blocks(&self, validator: &Address) -> u64 {
        self.state.liveness.missed_blocks(validator)
    }

    pub fn slash_record(&self, validator: &Address) -> Option<&SlashRecord> {
        self.state.liveness.record(validator)
    }

    pub fn tracked_validators(&self) -> &[Address] {
        self.state.liveness.tracked_validators()
    }

    pub fn balance(&self) -> Amount {
        self.state.balance
    }

    pub fn outstanding_liabilities(&self) -> Amount {
        self.state.outstanding_liabilities()
    }

    pub fn params(&self) -> &StakingParams {
        &self.state.params
    }

    pub fn governance(&self) -> &Governance {
        &self.state.governance
    }

    pub fn state(&self) -> &StakingState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Handle to the payout guard, for sinks that need to detect re-entry
    pub fn reentrancy_guard(&self) -> ReentrancyGuard {
        self.guard.clone()
    }

    pub fn drain_events(&mut self) -> Vec<StakingEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn export_state(&self) -> Result<String, StakingError> {
        serde_json::to_string_pretty(&self.state).map_err(|e| StakingError::StateSnapshot(e.to_string()))
    }

    /// Replace the state with a snapshot; pending events are discarded
    pub fn import_state(&mut self, json: &str) -> Result<(), StakingError> {
        let state: StakingState =
            serde_json::from_str(json).map_err(|e| StakingError::StateSnapshot(e.to_string()))?;
        self.state = state;
        self.events.clear();
        Ok(())
    }
}
