pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod utils;

// Re-export commonly used items
pub use blockchain::{Address, Amount, BlockContext, CallContext, LIVENESS_TRACKER_ADDRESS, STAKING_ADDRESS};
pub use config::{NetworkPreset, StakingConfig};
pub use consensus::pos::{
    BalanceSink, DelegatorPosition, Description, StakingEngine, StakingEvent, Validator,
    ValidatorStatus, ValueSink,
};
pub use errors::{ErrorKind, StakingError};

// Re-export key types for convenience
pub use consensus::pos;
