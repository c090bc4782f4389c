// Missed-block tracking.
// The block producer reports every active validator that missed its slot.
// Reaching the threshold resets the counter and slashes the validator through
// the slash engine. Counters decay on a fixed epoch cadence so that
// occasional misses are forgiven.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Address, CallContext, STAKING_ADDRESS};
use crate::config::LivenessParams;
use crate::consensus::pos::{StakingEvent, StakingState};
use crate::errors::StakingError;

/// Missed-block record of one validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub missed_blocks_counter: u64,
    /// Position in the tracked-validator list
    pub index: usize,
    /// Block of the last decay applied to this record
    pub decrease_prev_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessTracker {
    params: LivenessParams,
    records: BTreeMap<Address, SlashRecord>,
    tracked: Vec<Address>,
}

impl LivenessTracker {
    pub fn new(params: LivenessParams) -> Self {
        Self {
            params,
            records: BTreeMap::new(),
            tracked: Vec::new(),
        }
    }

    pub fn params(&self) -> &LivenessParams {
        &self.params
    }

    pub fn missed_blocks(&self, validator: &Address) -> u64 {
        self.records.get(validator).map_or(0, |r| r.missed_blocks_counter)
    }

    pub fn record(&self, validator: &Address) -> Option<&SlashRecord> {
        self.records.get(validator)
    }

    pub fn tracked_validators(&self) -> &[Address] {
        &self.tracked
    }

    /// Whether one more miss by `validator` reaches the threshold
    pub fn would_reach_threshold(&self, validator: &Address) -> bool {
        self.missed_blocks(validator) + 1 >= self.params.slash_threshold
    }

    /// Count a miss. Returns true when the threshold was reached; the counter is reset.
    pub fn record_miss(&mut self, validator: Address) -> bool {
        let record = match self.records.entry(validator) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let index = self.tracked.len();
                self.tracked.push(validator);
                entry.insert(SlashRecord {
                    index,
                    ..SlashRecord::default()
                })
            }
        };

        record.missed_blocks_counter += 1;
        if record.missed_blocks_counter >= self.params.slash_threshold {
            record.missed_blocks_counter = 0;
            return true;
        }
        false
    }

    /// Forgive `slash_threshold / decrease_rate` misses on every tracked validator
    pub fn decay(&mut self, block: u64) -> u64 {
        let step = self.params.decrease_step();
        for record in self.records.values_mut() {
            record.missed_blocks_counter = record.missed_blocks_counter.saturating_sub(step);
            record.decrease_prev_number = block;
        }
        step
    }

    /// Drop the record of `validator`; returns false when there was none
    pub fn remove(&mut self, validator: &Address) -> bool {
        let record = match self.records.remove(validator) {
            Some(record) => record,
            None => return false,
        };
        self.tracked.swap_remove(record.index);
        if let Some(moved) = self.tracked.get(record.index).copied() {
            if let Some(moved_record) = self.records.get_mut(&moved) {
                moved_record.index = record.index;
            }
        }
        true
    }

    pub fn set_slash_threshold(&mut self, slash_threshold: u64) -> Result<(), StakingError> {
        if slash_threshold == 0 || slash_threshold < self.params.decrease_rate {
            return Err(StakingError::InvalidParameter(format!(
                "slash threshold {} must be positive and at least the decrease rate {}",
                slash_threshold, self.params.decrease_rate
            )));
        }
        self.params.slash_threshold = slash_threshold;
        Ok(())
    }

    pub fn set_decrease_rate(&mut self, decrease_rate: u64) -> Result<(), StakingError> {
        if decrease_rate == 0 || decrease_rate > self.params.slash_threshold {
            return Err(StakingError::InvalidParameter(format!(
                "decrease rate {} must be in 1..={}",
                decrease_rate, self.params.slash_threshold
            )));
        }
        self.params.decrease_rate = decrease_rate;
        Ok(())
    }
}

impl StakingState {
    /// Block producer reports that `validator` missed its block
    pub(crate) fn report_missed_block(
        &mut self,
        ctx: CallContext,
        validator: Address,
        events: &mut Vec<StakingEvent>,
    ) -> Result<bool, StakingError> {
        if !ctx.is_block_producer() {
            return Err(StakingError::NotBlockProducer { caller: ctx.caller });
        }
        self.governance.ensure_not_emergency()?;
        let block = ctx.block.number;
        self.gates.report_missed_block.check("slash", block)?;
        if !self.validator_set.is_active(&validator) {
            return Err(StakingError::NotActiveValidator(validator));
        }
        let slash = if self.liveness.would_reach_threshold(&validator) {
            Some(self.plan_slash(validator)?)
        } else {
            None
        };

        self.gates.report_missed_block.record(block);
        let threshold_reached = self.liveness.record_miss(validator);
        let missed_blocks = self.liveness.missed_blocks(&validator);
        debug!("Validator {} missed a block ({} recorded)", validator, missed_blocks);
        events.push(StakingEvent::MissedBlockRecorded {
            validator,
            missed_blocks,
        });

        if let Some(plan) = slash {
            warn!(
                "Validator {} reached {} missed blocks",
                validator,
                self.liveness.params().slash_threshold
            );
            self.apply_slash(plan, block, events);
        }
        Ok(threshold_reached)
    }

    pub(crate) fn decrease_missed_blocks_counter(
        &mut self,
        ctx: CallContext,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        if !ctx.is_block_producer() {
            return Err(StakingError::NotBlockProducer { caller: ctx.caller });
        }
        let block = ctx.block.number;
        let every = self.liveness.params().decay_interval_epochs;
        if !self.schedule.is_boundary_every(block, every) {
            return Err(StakingError::NotEpochBoundary { block });
        }
        self.gates.decrease_missed_blocks.check("decrease_missed_blocks_counter", block)?;
        self.gates.decrease_missed_blocks.record(block);

        let step = self.liveness.decay(block);
        debug!(
            "Decreased missed-block counters of {} validators by {}",
            self.liveness.tracked_validators().len(),
            step
        );
        events.push(StakingEvent::MissedBlocksDecreased { block, step });
        Ok(())
    }

    /// Reset the missed-block record of `validator`; only the stake ledger may call this
    pub(crate) fn clean(&mut self, ctx: CallContext, validator: Address) -> Result<(), StakingError> {
        if ctx.caller != STAKING_ADDRESS {
            return Err(StakingError::Unauthorized {
                caller: ctx.caller,
                role: "staking ledger",
            });
        }
        if self.liveness.remove(&validator) {
            debug!("Cleared missed-block record of {}", validator);
        }
        Ok(())
    }

    pub(crate) fn update_slash_threshold(
        &mut self,
        ctx: CallContext,
        slash_threshold: u64,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.require_admin(ctx.caller)?;
        self.liveness.set_slash_threshold(slash_threshold)?;
        self.push_slash_params(events);
        Ok(())
    }

    pub(crate) fn update_decrease_rate(
        &mut self,
        ctx: CallContext,
        decrease_rate: u64,
        events: &mut Vec<StakingEvent>,
    ) -> Result<(), StakingError> {
        self.governance.require_admin(ctx.caller)?;
        self.liveness.set_decrease_rate(decrease_rate)?;
        self.push_slash_params(events);
        Ok(())
    }

    fn push_slash_params(&self, events: &mut Vec<StakingEvent>) {
        let params = self.liveness.params();
        info!(
            "Liveness parameters set: threshold {}, decrease rate {}",
            params.slash_threshold, params.decrease_rate
        );
        events.push(StakingEvent::SlashParamsUpdated {
            slash_threshold: params.slash_threshold,
            decrease_rate: params.decrease_rate,
        });
    }
}
