use super::*;
use crate::blockchain::{LIVENESS_TRACKER_ADDRESS, STAKING_ADDRESS};
use crate::consensus::pos::{StakingEvent, ValidatorStatus};
use crate::errors::{ErrorKind, StakingError};

fn tracker(number: u64) -> CallContext {
    ctx(LIVENESS_TRACKER_ADDRESS, number)
}

/// A with 10_000 of its own stake plus B with 2_000, active from block 200
fn scenario() -> (StakingEngine, Address, Address) {
    let mut engine = engine(&mainnet());
    let a = addr(1);
    let b = addr(2);
    create_validator(&mut engine, a, 10_000);
    engine.stake(ctx(b, 2), a, 2_000).unwrap();
    activate(&mut engine, 200);
    (engine, a, b)
}

#[test]
fn test_slash_scenario() {
    let (mut engine, a, b) = scenario();

    assert_eq!(engine.slash_validator(tracker(250), a), Ok(1_000));
    let validator = engine.validator(&a).unwrap();
    assert_eq!(validator.status, ValidatorStatus::Jailed);
    assert_eq!(validator.total_staked, 11_000);
    assert_eq!(validator.slash_amount, 1_000);
    assert!(!engine.is_active_validator(&a));
    assert!(!engine.is_candidate(&a));
    assert_eq!(engine.total_network_staked(), 11_000);

    // B carries 2_000 / 12_000 of the penalty, rounded up
    assert_eq!(engine.pending_slash(&a, &b), Ok(167));
    assert_eq!(engine.pending_slash(&a, &a), Ok(834));

    // the stored position only changes on B's next interaction
    assert_eq!(engine.delegator_position(&a, &b).unwrap().delegated_amount, 2_000);
    engine.unstake(ctx(b, 251), a).unwrap();
    assert_eq!(engine.delegator_position(&a, &b).unwrap().delegated_amount, 1_833);
    assert_eq!(engine.total_unstaking(), 1_833);
    assert_eq!(engine.validator(&a).unwrap().total_staked, 11_000 - 1_833);
    assert_custody(&engine);
}

#[test]
fn test_settled_positions_never_exceed_total() {
    let (mut engine, a, _) = scenario();
    engine.slash_validator(tracker(250), a).unwrap();

    let total = engine.validator(&a).unwrap().total_staked;
    let settled: Amount = engine
        .delegators_of(&a)
        .iter()
        .map(|d| engine.delegator_position(&a, d).unwrap().delegated_amount - engine.pending_slash(&a, d).unwrap())
        .sum();
    assert!(settled <= total);
    assert_eq!(total - settled, 1);
}

#[test]
fn test_last_delegator_exit_reclaims_stake_dust() {
    let (mut engine, a, b) = scenario();
    let c = addr(3);
    create_validator(&mut engine, c, 10_000);
    activate(&mut engine, 400);
    engine.slash_validator(tracker(450), a).unwrap();
    // the whole penalty goes to C
    assert_eq!(engine.remainder_pool(), 0);

    engine.unstake(ctx(b, 451), a).unwrap();
    engine.drain_events();
    engine.unstake(ctx(a, 452), a).unwrap();

    let validator = engine.validator(&a).unwrap();
    assert!(validator.delegators.is_empty());
    assert_eq!(validator.total_staked, 0);
    assert_eq!(engine.total_network_staked(), 10_000);
    assert_eq!(engine.total_unstaking(), 1_833 + 9_166);
    assert_eq!(engine.remainder_pool(), 1);
    assert!(engine
        .drain_events()
        .contains(&StakingEvent::StakeDustReclaimed { validator: a, amount: 1 }));
    assert_custody(&engine);

    // the dust is paid out with the next flush, due by age at block 2_000
    engine.distribute_block_reward(producer(2_000), 1_000).unwrap();
    assert_eq!(engine.remainder_pool(), 0);
    assert_custody(&engine);
}

#[test]
fn test_slash_requires_liveness_tracker() {
    let (mut engine, a, _) = scenario();
    let err = engine.slash_validator(ctx(PRODUCER, 250), a).unwrap_err();
    assert_eq!(
        err,
        StakingError::Unauthorized {
            caller: PRODUCER,
            role: "liveness tracker"
        }
    );
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(engine.validator_status(&a), ValidatorStatus::Staked);
}

#[test]
fn test_slash_twice_and_unknown() {
    let (mut engine, a, _) = scenario();
    engine.slash_validator(tracker(250), a).unwrap();
    assert!(matches!(
        engine.slash_validator(tracker(251), a),
        Err(StakingError::InvalidValidatorStatus { status: ValidatorStatus::Jailed, .. })
    ));
    assert_eq!(
        engine.slash_validator(tracker(251), addr(42)),
        Err(StakingError::ValidatorNotFound(addr(42)))
    );
}

#[test]
fn test_penalty_is_redistributed_to_others() {
    let mut engine = engine(&mainnet());
    let (v1, v2) = (addr(1), addr(2));
    create_validator(&mut engine, v1, 10_000);
    create_validator(&mut engine, v2, 10_000);
    activate(&mut engine, 200);

    engine.slash_validator(tracker(250), v1).unwrap();
    let other = engine.validator(&v2).unwrap();
    assert_eq!(other.reward_amount, 50);
    assert_eq!(other.delegator_reward_pool, 950);
    assert_eq!(engine.pending_rewards(&v2, &v2), Ok(950));
    assert_eq!(engine.validator(&v1).unwrap().reward_amount, 0);
    assert_eq!(engine.active_validators(), &[v2]);
    assert_custody(&engine);
}

#[test]
fn test_slash_of_last_validator_keeps_penalty_in_remainder() {
    let (mut engine, a, _) = scenario();
    engine.slash_validator(tracker(250), a).unwrap();
    assert!(engine.candidate_validators().is_empty());
    assert_eq!(engine.remainder_pool(), 1_000);
    assert_custody(&engine);
}

#[test]
fn test_rewards_before_slash_are_kept() {
    let (mut engine, a, b) = scenario();
    engine.distribute_block_reward(producer(200), 1_200).unwrap();
    engine.slash_validator(tracker(250), a).unwrap();

    // 1_140 to delegators, 2_000 / 12_000 of it for B
    assert_eq!(engine.pending_rewards(&a, &b), Ok(190));
    assert_eq!(engine.claim_delegator_rewards(ctx(b, 251), a), Ok(190));
    assert_eq!(engine.delegator_position(&a, &b).unwrap().delegated_amount, 1_833);
}

#[test]
fn test_unjail_returns_to_staked() {
    let (mut engine, a, _) = scenario();
    engine.slash_validator(tracker(250), a).unwrap();

    assert!(matches!(
        engine.unjail_validator(ctx(addr(2), 251)),
        Err(StakingError::ValidatorNotFound(_))
    ));
    assert_eq!(engine.unjail_validator(ctx(a, 251)), Ok(ValidatorStatus::Staked));
    assert!(engine.is_candidate(&a));
    assert!(!engine.is_active_validator(&a));
    assert!(engine
        .drain_events()
        .contains(&StakingEvent::ValidatorUnjailed { validator: a, status: ValidatorStatus::Staked }));

    assert!(matches!(
        engine.unjail_validator(ctx(a, 252)),
        Err(StakingError::InvalidValidatorStatus { expected: "Jailed", .. })
    ));
}

#[test]
fn test_unjail_below_floor_goes_to_unstake() {
    let mut engine = engine(&mainnet());
    let a = addr(1);
    create_validator(&mut engine, a, 10_000);
    activate(&mut engine, 200);
    engine.slash_validator(tracker(250), a).unwrap();

    assert_eq!(engine.unjail_validator(ctx(a, 251)), Ok(ValidatorStatus::Unstake));
    assert!(!engine.is_candidate(&a));
}

#[test]
fn test_clean_requires_staking_identity() {
    let (mut engine, a, _) = scenario();
    assert_eq!(
        engine.clean(ctx(a, 250), a),
        Err(StakingError::Unauthorized {
            caller: a,
            role: "staking ledger"
        })
    );
    assert!(engine.clean(ctx(STAKING_ADDRESS, 250), a).is_ok());
}

#[test]
fn test_jailed_validator_keeps_accepting_stake() {
    let (mut engine, a, _) = scenario();
    engine.slash_validator(tracker(250), a).unwrap();

    engine.stake(ctx(addr(3), 251), a, 1_000).unwrap();
    assert_eq!(engine.validator_status(&a), ValidatorStatus::Jailed);
    assert!(!engine.is_candidate(&a));
    // newcomers do not inherit the earlier slash
    assert_eq!(engine.pending_slash(&a, &addr(3)), Ok(0));
}
