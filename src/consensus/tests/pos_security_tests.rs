use super::*;
use crate::blockchain::STAKING_ADDRESS;
use crate::config::MAX_MONIKER_LENGTH;
use crate::consensus::pos::{BalanceSink, MockValueSink, StakingEvent, ValidatorStatus};
use crate::errors::{ErrorKind, StakingError};

fn devnet() -> StakingConfig {
    StakingConfig::from_preset(NetworkPreset::Devnet)
}

#[test]
fn test_pause_blocks_user_operations() {
    let mut engine = engine(&devnet());
    let admin = engine.governance().admin();
    create_validator(&mut engine, addr(1), 100);
    activate(&mut engine, 10);

    assert!(matches!(
        engine.pause(ctx(addr(1), 2)),
        Err(StakingError::Unauthorized { role: "admin", .. })
    ));
    engine.pause(ctx(admin, 2)).unwrap();
    assert_eq!(engine.pause(ctx(admin, 2)), Err(StakingError::Paused));

    assert_eq!(engine.stake(ctx(addr(2), 3), addr(1), 50), Err(StakingError::Paused));
    assert_eq!(
        engine.create(ctx(addr(3), 3), addr(3), Description::default(), 100),
        Err(StakingError::Paused)
    );
    assert_eq!(engine.unstake(ctx(addr(1), 3), addr(1)), Err(StakingError::Paused));
    assert_eq!(engine.withdraw_rewards(ctx(addr(1), 3)), Err(StakingError::Paused));

    // consensus-driven operations keep running
    engine.distribute_block_reward(producer(20), 100).unwrap();
    engine.decrease_missed_blocks_counter(producer(20)).unwrap();

    engine.unpause(ctx(admin, 21)).unwrap();
    assert_eq!(engine.unpause(ctx(admin, 21)), Err(StakingError::NotPaused));
    engine.stake(ctx(addr(2), 22), addr(1), 50).unwrap();
}

#[test]
fn test_emergency_pause_blocks_distribution() {
    let mut engine = engine(&devnet());
    let emergency = engine.governance().emergency_admin();
    create_validator(&mut engine, addr(1), 100);
    activate(&mut engine, 10);

    let admin = engine.governance().admin();
    assert!(matches!(
        engine.set_emergency_pause(ctx(admin, 10), true),
        Err(StakingError::Unauthorized { role: "emergency admin", .. })
    ));

    engine.set_emergency_pause(ctx(emergency, 11), true).unwrap();
    assert!(engine.governance().is_emergency_paused());
    assert_eq!(engine.distribute_block_reward(producer(20), 100), Err(StakingError::Paused));
    assert_eq!(engine.stake(ctx(addr(2), 21), addr(1), 50), Err(StakingError::Paused));

    engine.set_emergency_pause(ctx(emergency, 22), false).unwrap();
    engine.distribute_block_reward(producer(30), 100).unwrap();
    assert_custody(&engine);
}

#[test]
fn test_transfer_admin() {
    let mut engine = engine(&devnet());
    let admin = engine.governance().admin();
    let successor = addr(77);

    assert!(matches!(
        engine.transfer_admin(ctx(successor, 1), successor),
        Err(StakingError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.transfer_admin(ctx(admin, 1), Address::ZERO),
        Err(StakingError::InvalidParameter(_))
    ));

    engine.transfer_admin(ctx(admin, 1), successor).unwrap();
    assert_eq!(engine.governance().admin(), successor);
    assert!(engine.drain_events().contains(&StakingEvent::AdminTransferred {
        previous: admin,
        admin: successor
    }));
    assert!(engine.pause(ctx(admin, 2)).is_err());
    engine.pause(ctx(successor, 2)).unwrap();
}

#[test]
fn test_failed_operation_leaves_no_trace() {
    let mut engine = engine(&devnet());
    create_validator(&mut engine, addr(1), 100);
    engine.drain_events();
    let before = engine.state().clone();

    let err = engine
        .create(ctx(addr(2), 2), addr(2), Description::with_moniker(&"x".repeat(MAX_MONIKER_LENGTH + 1)), 100)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bounds);
    assert!(matches!(
        engine.unstake(ctx(addr(1), 2), addr(1)),
        Err(StakingError::LastValidator)
    ));
    assert_eq!(engine.stake(ctx(addr(2), 2), addr(1), 0), Err(StakingError::ZeroAmount));

    assert_eq!(engine.state(), &before);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn test_rejections_on_busy_ledger_leave_no_trace() {
    let mut engine = engine(&devnet());
    let (v1, v2, d) = (addr(1), addr(2), addr(3));
    create_validator(&mut engine, v1, 100);
    create_validator(&mut engine, v2, 100);
    engine.stake(ctx(d, 2), v1, 40).unwrap();
    activate(&mut engine, 10);
    engine.distribute_block_reward(producer(10), 1_000).unwrap();
    engine.drain_events();
    let before = engine.state().clone();

    let rejected = [
        engine.distribute_block_reward(producer(10), 5),
        engine.distribute_block_reward(producer(20), 0),
        engine.slash(producer(12), addr(9)).map(|_| ()),
        engine.stake(ctx(addr(5), 12), v1, 5),
        engine.unstake(ctx(addr(5), 12), v1),
        engine.claim_delegator_rewards(ctx(addr(5), 12), v1).map(|_| ()),
        engine.unjail_validator(ctx(v1, 12)).map(|_| ()),
        engine.decrease_missed_blocks_counter(producer(15)),
    ];
    for result in rejected {
        assert!(result.is_err());
    }
    assert_eq!(engine.state(), &before);
    assert!(engine.drain_events().is_empty());

    // a rejected miss report does not use up the block
    assert_eq!(engine.slash(producer(12), v1), Ok(false));
    engine.distribute_block_reward(producer(20), 5).unwrap();
}

#[test]
fn test_refused_payouts_restore_touched_records() {
    let mut sink = MockValueSink::new();
    sink.expect_transfer().times(2).returning(|to, amount| {
        Err(StakingError::TransferFailed {
            to,
            amount,
            reason: "recipient rejected value".to_string(),
        })
    });
    let mut engine = StakingEngine::with_sink(&devnet(), sink).unwrap();
    let (v, d) = (addr(1), addr(2));
    create_validator(&mut engine, v, 100);
    engine.stake(ctx(d, 2), v, 40).unwrap();
    activate(&mut engine, 10);
    engine.distribute_block_reward(producer(10), 1_000).unwrap();
    engine.unstake(ctx(d, 11), v).unwrap();
    engine.drain_events();
    let before = engine.state().clone();

    // unlocked twelve blocks after the unstake
    let err = engine.withdraw_staking(ctx(d, 30), v).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    let err = engine.withdraw_rewards(ctx(v, 30)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    assert_eq!(engine.state(), &before);
    assert!(engine.drain_events().is_empty());
    assert!(!engine.reentrancy_guard().is_entered());
}

#[test]
fn test_error_kinds() {
    assert_eq!(StakingError::NotBlockProducer { caller: PRODUCER }.kind(), ErrorKind::Authorization);
    assert_eq!(StakingError::NothingToClaim.kind(), ErrorKind::StatePrecondition);
    assert_eq!(
        StakingError::CommissionTooHigh { rate: 9_000, max: 2_000 }.kind(),
        ErrorKind::Bounds
    );
    assert_eq!(StakingError::LastValidator.kind(), ErrorKind::InvariantGuard);
    assert_eq!(StakingError::ReentrantCall.kind(), ErrorKind::InvariantGuard);
    assert_eq!(
        StakingError::TransferFailed {
            to: PRODUCER,
            amount: 1,
            reason: String::new()
        }
        .kind(),
        ErrorKind::External
    );
}

#[test]
fn test_privileged_entry_points_reject_strangers() {
    let mut engine = engine(&devnet());
    create_validator(&mut engine, addr(1), 100);
    activate(&mut engine, 10);
    let stranger = addr(66);

    let results = [
        engine.slash_validator(ctx(stranger, 11), addr(1)).map(|_| ()),
        engine.clean(ctx(stranger, 11), addr(1)),
        engine.update_slash_threshold(ctx(stranger, 11), 8),
        engine.update_decrease_rate(ctx(stranger, 11), 1),
        engine.set_emergency_pause(ctx(stranger, 11), true),
        engine.distribute_block_reward(ctx(stranger, 20), 10),
        engine.slash(ctx(stranger, 12), addr(1)).map(|_| ()),
    ];
    for result in results {
        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::Authorization));
    }
    assert!(engine.clean(ctx(STAKING_ADDRESS, 11), addr(1)).is_ok());
}

#[test]
fn test_custody_across_lifecycle() {
    let mut engine = engine(&devnet());
    let (v1, v2, d) = (addr(1), addr(2), addr(3));
    create_validator(&mut engine, v1, 100);
    create_validator(&mut engine, v2, 150);
    engine.stake(ctx(d, 2), v1, 40).unwrap();
    assert_custody(&engine);
    activate(&mut engine, 10);

    engine.distribute_block_reward(producer(10), 997).unwrap();
    assert_custody(&engine);
    for number in 11..=16 {
        engine.slash(producer(number), v2).unwrap();
    }
    assert_eq!(engine.validator_status(&v2), ValidatorStatus::Jailed);
    assert_custody(&engine);

    engine.claim_delegator_rewards(ctx(d, 17), v1).unwrap();
    engine.withdraw_rewards(ctx(v1, 17)).unwrap();
    engine.unstake(ctx(d, 18), v1).unwrap();
    assert_custody(&engine);

    // devnet lock of 60 seconds is 12 blocks
    assert!(matches!(
        engine.withdraw_staking(ctx(d, 29), v1),
        Err(StakingError::LockPeriodActive { unlock_at: 150 })
    ));
    assert_eq!(engine.withdraw_staking(ctx(d, 30), v1), Ok(40));
    assert!(engine.sink().balance_of(&d) > 40);
    assert_custody(&engine);

    let paid = engine.sink().total_paid();
    assert_eq!(engine.balance() + paid, 100 + 150 + 40 + 997);
}

#[test]
fn test_snapshot_round_trip() {
    let mut engine = engine(&devnet());
    let (v1, d) = (addr(1), addr(2));
    create_validator(&mut engine, v1, 100);
    engine.stake(ctx(d, 2), v1, 30).unwrap();
    activate(&mut engine, 10);
    engine.distribute_block_reward(producer(10), 500).unwrap();
    engine.slash(producer(11), v1).unwrap();

    let json = engine.export_state().unwrap();
    let restored = StakingEngine::from_snapshot(&json, BalanceSink::default()).unwrap();
    assert_eq!(restored.state(), engine.state());
    assert_eq!(restored.pending_rewards(&v1, &d), engine.pending_rewards(&v1, &d));
    assert_eq!(restored.missed_blocks(&v1), 1);

    // block gates travel with the snapshot
    let mut restored = restored;
    assert!(matches!(
        restored.distribute_block_reward(producer(10), 500),
        Err(StakingError::AlreadyExecutedInBlock { .. })
    ));

    let mut other = StakingEngine::from_config(&devnet()).unwrap();
    other.import_state(&json).unwrap();
    assert_eq!(other.state(), engine.state());
    assert!(other.drain_events().is_empty());

    let err = other.import_state("{not json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(other.state(), engine.state());
}
