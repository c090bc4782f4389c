mod common;

use common::*;
use staking_core::{
    Address, Amount, BalanceSink, ErrorKind, StakingEngine, StakingError, StakingEvent, ValidatorStatus, ValueSink,
};

#[test]
fn test_genesis_validators_are_active() {
    let engine = StakingEngine::from_config(&devnet_with_genesis(3, 200)).unwrap();
    assert_eq!(engine.active_validators(), &[addr(1), addr(2), addr(3)]);
    assert_eq!(engine.total_network_staked(), 600);
    for n in 1..=3 {
        let validator = engine.validator(&addr(n)).unwrap();
        assert_eq!(validator.status, ValidatorStatus::Staked);
        assert_eq!(validator.description.moniker, format!("genesis-{}", n));
    }
    assert_custody(&engine);
}

#[test]
fn test_invalid_genesis_is_rejected() {
    let config = devnet_with_genesis(1, 1);
    let err = StakingEngine::from_config(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bounds);
}

#[test]
fn test_epoch_lifecycle() {
    let mut engine = StakingEngine::from_config(&devnet_with_genesis(2, 200)).unwrap();
    let delegator = addr(10);
    engine.stake(ctx(delegator, 1), addr(1), 200).unwrap();

    // two epochs of rewards, then a refresh of the active set
    engine.distribute_block_reward(producer(10), 1_000).unwrap();
    engine.update_activated_validators(producer(10)).unwrap();
    engine.decrease_missed_blocks_counter(producer(10)).unwrap();
    engine.distribute_block_reward(producer(20), 1_000).unwrap();

    let pending = engine.pending_rewards(&addr(1), &delegator).unwrap();
    assert!(pending > 0);
    assert_eq!(engine.claim_delegator_rewards(ctx(delegator, 21), addr(1)), Ok(pending));
    assert_eq!(engine.sink().balance_of(&delegator), pending);

    let commission = engine.validator(&addr(1)).unwrap().reward_amount;
    assert_eq!(engine.withdraw_rewards(ctx(addr(1), 21)), Ok(commission));
    assert_custody(&engine);

    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, StakingEvent::BlockRewardDistributed { block: 20, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, StakingEvent::DelegatorRewardsClaimed { amount, .. } if *amount == pending)));
}

#[test]
fn test_missed_blocks_jail_and_recover() {
    let mut engine = StakingEngine::from_config(&devnet_with_genesis(3, 200)).unwrap();
    let slashed = addr(2);

    for number in 1..=6 {
        engine.slash(producer(number), slashed).unwrap();
    }
    assert_eq!(engine.validator_status(&slashed), ValidatorStatus::Jailed);
    assert_eq!(engine.validator(&slashed).unwrap().total_staked, 150);
    assert_eq!(engine.active_validators(), &[addr(1), addr(3)]);
    assert_custody(&engine);

    // not part of the next active set while jailed
    assert_eq!(engine.update_activated_validators(producer(10)), Ok(vec![addr(1), addr(3)]));

    assert_eq!(engine.unjail_validator(ctx(slashed, 11)), Ok(ValidatorStatus::Staked));
    assert_eq!(
        engine.update_activated_validators(producer(20)),
        Ok(vec![addr(1), addr(3), slashed])
    );
}

#[test]
fn test_delegator_exit_after_slash() {
    let mut engine = StakingEngine::from_config(&devnet_with_genesis(2, 100)).unwrap();
    let delegator = addr(10);
    engine.stake(ctx(delegator, 1), addr(1), 100).unwrap();
    for number in 2..=7 {
        engine.slash(producer(number), addr(1)).unwrap();
    }
    // 50 penalty over 200 staked
    assert_eq!(engine.pending_slash(&addr(1), &delegator), Ok(25));

    engine.unstake(ctx(delegator, 8), addr(1)).unwrap();
    assert_eq!(engine.total_unstaking(), 75);
    assert!(matches!(
        engine.withdraw_staking(ctx(delegator, 9), addr(1)),
        Err(StakingError::LockPeriodActive { .. })
    ));
    assert_eq!(engine.withdraw_staking(ctx(delegator, 20), addr(1)), Ok(75));
    assert_eq!(
        engine.withdraw_staking(ctx(delegator, 21), addr(1)),
        Err(StakingError::NothingToWithdraw)
    );
    assert_custody(&engine);
}

/// Sink that refuses payments to one address
struct RefusingSink {
    refused: Address,
    inner: BalanceSink,
}

impl ValueSink for RefusingSink {
    fn transfer(&mut self, to: Address, amount: Amount) -> Result<(), StakingError> {
        if to == self.refused {
            return Err(StakingError::TransferFailed {
                to,
                amount,
                reason: "refused".to_string(),
            });
        }
        self.inner.transfer(to, amount)
    }
}

#[test]
fn test_refused_payment_keeps_stake_withdrawable() {
    let sink = RefusingSink {
        refused: addr(10),
        inner: BalanceSink::default(),
    };
    let mut engine = StakingEngine::with_sink(&devnet_with_genesis(2, 100), sink).unwrap();
    engine.stake(ctx(addr(10), 1), addr(1), 50).unwrap();
    engine.unstake(ctx(addr(10), 2), addr(1)).unwrap();

    let err = engine.withdraw_staking(ctx(addr(10), 20), addr(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(engine.total_unstaking(), 50);
    assert!(engine.delegator_position(&addr(1), &addr(10)).unwrap().is_unstaking());
    assert_eq!(engine.balance(), engine.outstanding_liabilities());

    engine.sink_mut().refused = Address::ZERO;
    assert_eq!(engine.withdraw_staking(ctx(addr(10), 21), addr(1)), Ok(50));
    assert_eq!(engine.sink().inner.balance_of(&addr(10)), 50);
}

#[test]
fn test_snapshot_survives_restart() {
    let mut engine = StakingEngine::from_config(&devnet_with_genesis(2, 100)).unwrap();
    engine.stake(ctx(addr(10), 1), addr(2), 40).unwrap();
    engine.distribute_block_reward(producer(10), 333).unwrap();
    let json = engine.export_state().unwrap();

    let mut restored = StakingEngine::from_snapshot(&json, BalanceSink::default()).unwrap();
    assert_eq!(restored.total_network_staked(), 240);
    assert_eq!(restored.remainder_pool(), engine.remainder_pool());
    let expected = engine.pending_rewards(&addr(2), &addr(10)).unwrap();
    assert_eq!(restored.claim_delegator_rewards(ctx(addr(10), 11), addr(2)), Ok(expected));
}
