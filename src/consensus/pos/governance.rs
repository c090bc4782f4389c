use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::Address;
use crate::config::GovernanceConfig;
use crate::errors::StakingError;

/// Privileged identities and pause switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Governance {
    admin: Address,
    emergency_admin: Address,
    paused: bool,
    emergency_paused: bool,
}

impl Governance {
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            admin: config.admin,
            emergency_admin: config.emergency_admin,
            paused: false,
            emergency_paused: false,
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn emergency_admin(&self) -> Address {
        self.emergency_admin
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_emergency_paused(&self) -> bool {
        self.emergency_paused
    }

    pub fn require_admin(&self, caller: Address) -> Result<(), StakingError> {
        if caller != self.admin {
            return Err(StakingError::Unauthorized { caller, role: "admin" });
        }
        Ok(())
    }

    pub fn require_emergency_admin(&self, caller: Address) -> Result<(), StakingError> {
        if caller != self.emergency_admin {
            return Err(StakingError::Unauthorized {
                caller,
                role: "emergency admin",
            });
        }
        Ok(())
    }

    /// Gate for validator and delegator operations
    pub fn ensure_user_ops_enabled(&self) -> Result<(), StakingError> {
        if self.paused || self.emergency_paused {
            return Err(StakingError::Paused);
        }
        Ok(())
    }

    /// Gate for reward distribution and liveness slashing
    pub fn ensure_not_emergency(&self) -> Result<(), StakingError> {
        if self.emergency_paused {
            return Err(StakingError::Paused);
        }
        Ok(())
    }

    pub fn pause(&mut self, caller: Address) -> Result<(), StakingError> {
        self.require_admin(caller)?;
        if self.paused {
            return Err(StakingError::Paused);
        }
        self.paused = true;
        info!("Staking paused by {}", caller);
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address) -> Result<(), StakingError> {
        self.require_admin(caller)?;
        if !self.paused {
            return Err(StakingError::NotPaused);
        }
        self.paused = false;
        info!("Staking unpaused by {}", caller);
        Ok(())
    }

    /// Hand the admin role to `new_admin`, returning the previous admin
    pub fn transfer_admin(&mut self, caller: Address, new_admin: Address) -> Result<Address, StakingError> {
        self.require_admin(caller)?;
        if new_admin.is_zero() {
            return Err(StakingError::InvalidParameter(
                "new admin must not be the zero address".to_string(),
            ));
        }
        let previous = std::mem::replace(&mut self.admin, new_admin);
        info!("Admin transferred from {} to {}", previous, new_admin);
        Ok(previous)
    }

    pub fn set_emergency_pause(&mut self, caller: Address, paused: bool) -> Result<(), StakingError> {
        self.require_emergency_admin(caller)?;
        self.emergency_paused = paused;
        if paused {
            warn!("Emergency pause enabled by {}", caller);
        } else {
            info!("Emergency pause lifted by {}", caller);
        }
        Ok(())
    }
}
