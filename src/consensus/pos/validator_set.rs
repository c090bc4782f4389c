// Candidate and active validator sets
// The candidate list is bounded; the active list is a snapshot taken at epoch boundaries.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use super::pos_structs::CandidateAdmission;
use crate::blockchain::{Address, Amount};
use crate::errors::StakingError;

/// Ordered address list with O(1) membership and swap-and-pop removal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedAddressList {
    items: Vec<Address>,
    positions: BTreeMap<Address, usize>,
    capacity: usize,
}

impl BoundedAddressList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            positions: BTreeMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.positions.contains_key(address)
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.items
    }

    /// Append when there is room. Returns false when full or already present.
    pub fn push(&mut self, address: Address) -> bool {
        if self.is_full() || self.contains(&address) {
            return false;
        }
        self.positions.insert(address, self.items.len());
        self.items.push(address);
        true
    }

    /// Overwrite the entry at `index`, returning the address it held
    pub fn replace_at(&mut self, index: usize, address: Address) -> Option<Address> {
        let slot = self.items.get_mut(index)?;
        let previous = std::mem::replace(slot, address);
        self.positions.remove(&previous);
        self.positions.insert(address, index);
        Some(previous)
    }

    pub fn remove(&mut self, address: &Address) -> bool {
        let index = match self.positions.remove(address) {
            Some(index) => index,
            None => return false,
        };
        self.items.swap_remove(index);
        if let Some(moved) = self.items.get(index) {
            self.positions.insert(*moved, index);
        }
        true
    }
}

/// Bounded candidate set plus the active snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    candidates: BoundedAddressList,
    active: Vec<Address>,
}

impl ValidatorSet {
    pub fn new(max_validator_num: usize) -> Self {
        Self {
            candidates: BoundedAddressList::with_capacity(max_validator_num),
            active: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[Address] {
        self.candidates.as_slice()
    }

    pub fn active(&self) -> &[Address] {
        &self.active
    }

    pub fn is_candidate(&self, validator: &Address) -> bool {
        self.candidates.contains(validator)
    }

    pub fn is_active(&self, validator: &Address) -> bool {
        self.active.contains(validator)
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Offer `validator` with `stake` to the candidate set.
    ///
    /// When the set is full the incumbent with the smallest stake (first one on
    /// ties) is replaced, but only if `stake` is strictly larger.
    pub fn add_candidate<F>(
        &mut self,
        validator: Address,
        stake: Amount,
        stake_of: F,
    ) -> Result<CandidateAdmission, StakingError>
    where
        F: Fn(&Address) -> Amount,
    {
        if self.candidates.contains(&validator) {
            return Ok(CandidateAdmission::AlreadyPresent);
        }
        if self.candidates.push(validator) {
            debug!("Validator {} joined the candidate set", validator);
            return Ok(CandidateAdmission::Added);
        }

        let mut lowest: Option<(usize, Amount)> = None;
        for (index, incumbent) in self.candidates.as_slice().iter().enumerate() {
            let incumbent_stake = stake_of(incumbent);
            if lowest.map_or(true, |(_, min)| incumbent_stake < min) {
                lowest = Some((index, incumbent_stake));
            }
        }

        match lowest {
            Some((index, minimum)) if stake > minimum => {
                let evicted = self
                    .candidates
                    .replace_at(index, validator)
                    .ok_or(StakingError::InvalidParameter("candidate index out of range".to_string()))?;
                debug!(
                    "Validator {} ({}) replaced {} ({}) in the candidate set",
                    validator, stake, evicted, minimum
                );
                Ok(CandidateAdmission::Replaced(evicted))
            }
            Some((_, minimum)) => Err(StakingError::CandidateSetFull { stake, minimum }),
            // zero capacity
            None => Err(StakingError::CandidateSetFull { stake, minimum: 0 }),
        }
    }

    pub fn remove_candidate(&mut self, validator: &Address) -> bool {
        self.candidates.remove(validator)
    }

    /// Drop `validator` from the active snapshot, keeping the order of the rest
    pub fn remove_active(&mut self, validator: &Address) -> bool {
        let before = self.active.len();
        self.active.retain(|v| v != validator);
        self.active.len() != before
    }

    /// Copy the candidate list into the active set
    pub fn refresh_active(&mut self) -> &[Address] {
        self.active = self.candidates.as_slice().to_vec();
        &self.active
    }
}
