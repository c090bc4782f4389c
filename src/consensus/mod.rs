pub mod epoch;
pub mod liveness;
pub mod pos;

pub use epoch::{BlockGate, EpochSchedule, PrivilegedGates};
pub use liveness::{LivenessTracker, SlashRecord};
pub use pos::{StakingEngine, StakingEvent, StakingState, ValidatorStatus};

#[cfg(test)]
mod tests;
