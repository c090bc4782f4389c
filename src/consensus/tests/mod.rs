pub mod pos_security_tests;
pub mod slashing_tests;

use crate::blockchain::{Address, Amount, BlockContext, CallContext};
use crate::config::{NetworkPreset, StakingConfig};
use crate::consensus::pos::{Description, StakingEngine, ValueSink};

/// Block producer used throughout the tests
pub const PRODUCER: Address = Address::system(0x3000);
pub const BLOCK_TIME: u64 = 5;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn block(number: u64) -> BlockContext {
    BlockContext::new(number, number * BLOCK_TIME, PRODUCER)
}

/// `caller` acting in block `number`
pub fn ctx(caller: Address, number: u64) -> CallContext {
    CallContext::new(caller, block(number))
}

pub fn producer(number: u64) -> CallContext {
    ctx(PRODUCER, number)
}

/// Mainnet parameters without genesis validators
pub fn mainnet() -> StakingConfig {
    StakingConfig::from_preset(NetworkPreset::Mainnet)
}

pub fn engine(config: &StakingConfig) -> StakingEngine {
    StakingEngine::from_config(config).unwrap()
}

/// Create `validator` with a self-stake at block 1
pub fn create_validator<S: ValueSink>(engine: &mut StakingEngine<S>, validator: Address, stake: Amount) {
    engine
        .create(ctx(validator, 1), validator, Description::with_moniker("test"), stake)
        .unwrap();
}

/// Refresh the active set at the first epoch boundary after block 1
pub fn activate<S: ValueSink>(engine: &mut StakingEngine<S>, number: u64) {
    engine.update_activated_validators(producer(number)).unwrap();
}

pub fn assert_custody<S: ValueSink>(engine: &StakingEngine<S>) {
    assert_eq!(
        engine.balance(),
        engine.outstanding_liabilities(),
        "custody balance must match liabilities"
    );
}
