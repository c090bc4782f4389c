use staking_core::config::GenesisValidator;
use staking_core::{Address, Amount, BlockContext, CallContext, NetworkPreset, StakingConfig, StakingEngine, ValueSink};

pub const PRODUCER: Address = Address::system(0x3000);
pub const BLOCK_TIME: u64 = 5;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn ctx(caller: Address, number: u64) -> CallContext {
    CallContext::new(caller, BlockContext::new(number, number * BLOCK_TIME, PRODUCER))
}

pub fn producer(number: u64) -> CallContext {
    ctx(PRODUCER, number)
}

/// Devnet parameters with `count` genesis validators staking `stake` each
pub fn devnet_with_genesis(count: u64, stake: u64) -> StakingConfig {
    let mut config = StakingConfig::from_preset(NetworkPreset::Devnet);
    config.genesis = (1..=count)
        .map(|n| GenesisValidator {
            address: addr(n),
            reward_addr: None,
            commission_rate: None,
            stake,
            moniker: format!("genesis-{}", n),
        })
        .collect();
    config
}

#[allow(dead_code)]
pub fn assert_custody<S: ValueSink>(engine: &StakingEngine<S>) {
    assert_eq!(engine.balance(), engine.outstanding_liabilities());
}

/// Sum of everything a delegator could still take out of `validator`
#[allow(dead_code)]
pub fn claimable(engine: &StakingEngine, validator: &Address) -> Amount {
    engine
        .delegators_of(validator)
        .iter()
        .map(|d| engine.pending_rewards(validator, d).unwrap_or(0))
        .sum()
}
