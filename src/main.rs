use std::path::PathBuf;
use std::process;

use clap::Parser;
use colored::Colorize;
use log::{debug, error, info, warn};
use prettytable::{row, Table};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use staking_core::blockchain::{Address, Amount, BlockContext, CallContext};
use staking_core::config::{GenesisValidator, NetworkPreset, StakingConfig};
use staking_core::consensus::pos::{StakingEngine, StakingEvent, ValidatorStatus};
use staking_core::utils::{current_time, format_duration, format_timestamp};

/// Seconds between simulated blocks
const BLOCK_TIME: u64 = 5;

/// Block producer identity used by the simulator
const PRODUCER: Address = Address::system(0x3000);

#[derive(Parser, Debug)]
#[command(name = "staking-sim", version, about = "Simulate a delegated proof-of-stake validator set")]
struct Args {
    /// TOML configuration file layered over the preset
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parameter preset: mainnet, testnet or devnet
    #[arg(short, long, default_value = "devnet")]
    preset: NetworkPreset,

    /// Number of blocks to simulate
    #[arg(short, long, default_value_t = 1_000)]
    blocks: u64,

    /// Genesis validators to create when the config has none
    #[arg(long, default_value_t = 5)]
    validators: u64,

    /// Delegators staking at the first block
    #[arg(long, default_value_t = 20)]
    delegators: u64,

    /// Probability that a block reports a missed slot
    #[arg(long, default_value_t = 0.05)]
    miss_rate: f64,

    /// Block reward per block, paid out at epoch boundaries
    #[arg(long, default_value_t = 10)]
    reward: u64,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

// Load configuration and add generated genesis validators if none are configured
fn init_config(args: &Args, rng: &mut StdRng) -> StakingConfig {
    info!("Loading {} configuration...", args.preset);
    let mut config = match StakingConfig::load(args.preset, args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if config.genesis.is_empty() {
        let floor = config.params.min_validator_stake;
        config.genesis = (1..=args.validators)
            .map(|i| GenesisValidator {
                address: Address::from_low_u64_be(i),
                reward_addr: Some(Address::from_low_u64_be(i + 0x100)),
                commission_rate: None,
                stake: floor + rng.gen_range(0..=floor),
                moniker: format!("validator-{}", i),
            })
            .collect();
    }
    config
}

// Stake every delegator with a random genesis validator
fn init_delegators(
    engine: &mut StakingEngine,
    args: &Args,
    validators: &[Address],
    block: BlockContext,
    rng: &mut StdRng,
) -> Vec<(Address, Address)> {
    info!("Staking {} delegators...", args.delegators);
    let minimum = engine.params().min_delegator_stake();
    let mut delegations = Vec::new();
    for i in 0..args.delegators {
        let delegator = Address::from_low_u64_be(0x1_0000 + i);
        let Some(validator) = validators.choose(rng).copied() else {
            break;
        };
        let amount = minimum + rng.gen_range(0..=minimum * 4);
        match engine.stake(CallContext::new(delegator, block), validator, amount) {
            Ok(()) => delegations.push((delegator, validator)),
            Err(e) => warn!("Delegator {} could not stake: {}", delegator, e),
        }
    }
    delegations
}

// Run the privileged per-block actions and random user activity for one block
fn step_block(
    engine: &mut StakingEngine,
    args: &Args,
    block: BlockContext,
    delegations: &mut Vec<(Address, Address)>,
    rng: &mut StdRng,
) {
    let producer = CallContext::new(PRODUCER, block);
    let epoch_length = engine.params().epoch_length;

    if rng.gen_bool(args.miss_rate.clamp(0.0, 1.0)) {
        if let Some(validator) = engine.active_validators().choose(rng).copied() {
            match engine.slash(producer, validator) {
                Ok(true) => warn!("Block {}: {} slashed for missed blocks", block.number, validator),
                Ok(false) => debug!("Block {}: {} missed a block", block.number, validator),
                Err(e) => debug!("Block {}: miss report rejected: {}", block.number, e),
            }
        }
    }

    if epoch_length > 0 && block.number % epoch_length == 0 {
        let reward = Amount::from(args.reward) * Amount::from(epoch_length);
        if let Err(e) = engine.distribute_block_reward(producer, reward) {
            debug!("Block {}: reward not distributed: {}", block.number, e);
        }
        if let Err(e) = engine.update_activated_validators(producer) {
            debug!("Block {}: active set not updated: {}", block.number, e);
        }
        if let Err(e) = engine.decrease_missed_blocks_counter(producer) {
            debug!("Block {}: counters not decreased: {}", block.number, e);
        }

        let jailed: Vec<Address> = engine
            .validators()
            .filter(|(_, v)| v.status == ValidatorStatus::Jailed)
            .map(|(addr, _)| *addr)
            .collect();
        for validator in jailed {
            if rng.gen_bool(0.5) {
                if let Ok(status) = engine.unjail_validator(CallContext::new(validator, block)) {
                    info!("Block {}: {} unjailed as {}", block.number, validator, status);
                }
            }
        }
    }

    if delegations.is_empty() {
        return;
    }
    let index = rng.gen_range(0..delegations.len());
    let (delegator, validator) = delegations[index];
    let ctx = CallContext::new(delegator, block);
    match rng.gen_range(0..100) {
        0..=9 => {
            if let Ok(amount) = engine.claim_delegator_rewards(ctx, validator) {
                debug!("Block {}: {} claimed {}", block.number, delegator, amount);
            }
        }
        10 => {
            if engine.unstake(ctx, validator).is_ok() {
                debug!("Block {}: {} unstaked from {}", block.number, delegator, validator);
            }
        }
        11..=14 => {
            if let Ok(amount) = engine.withdraw_staking(ctx, validator) {
                debug!("Block {}: {} withdrew {}", block.number, delegator, amount);
                delegations.swap_remove(index);
            }
        }
        _ => {}
    }
}

fn print_report(engine: &StakingEngine, start_time: u64, end_time: u64) {
    let mut table = Table::new();
    table.add_row(row![
        "Validator", "Status", "Total staked", "Commission", "Delegator pool", "Slashed", "Missed", "Delegators"
    ]);

    for (address, validator) in engine.validators() {
        let status = match validator.status {
            ValidatorStatus::Staked => validator.status.to_string().green(),
            ValidatorStatus::Jailed => validator.status.to_string().red(),
            _ => validator.status.to_string().yellow(),
        };
        table.add_row(row![
            address.to_string(),
            status.to_string(),
            validator.total_staked,
            validator.reward_amount,
            validator.delegator_reward_pool,
            validator.slash_amount,
            engine.missed_blocks(address),
            validator.delegators.len()
        ]);
    }
    table.printstd();

    println!();
    println!("{}", "Network".bold());
    println!("  Simulated span:     {} ({} to {})", format_duration(end_time - start_time), format_timestamp(start_time), format_timestamp(end_time));
    println!("  Staked:             {}", engine.total_network_staked());
    println!("  Unstaking:          {}", engine.total_unstaking());
    println!("  Remainder pool:     {}", engine.remainder_pool());
    println!("  Active validators:  {}", engine.active_validators().len());
    println!("  Paid out:           {}", engine.sink().total_paid());

    let balance = engine.balance();
    let liabilities = engine.outstanding_liabilities();
    let custody = format!("balance {} / liabilities {}", balance, liabilities);
    if balance == liabilities {
        println!("  Custody:            {}", custody.green());
    } else {
        println!("  Custody:            {}", custody.red());
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let config = init_config(&args, &mut rng);
    if args.dump_config {
        match config.to_toml() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
        return;
    }

    info!("Initializing staking engine...");
    let mut engine = match StakingEngine::from_config(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start staking engine: {}", e);
            process::exit(1);
        }
    };
    info!(
        "Lock period {}, epoch length {} blocks",
        format_duration(config.params.lock_period),
        config.params.epoch_length
    );

    let start_time = current_time();
    let validators: Vec<Address> = config.genesis.iter().map(|g| g.address).collect();
    let first_block = BlockContext::new(1, start_time + BLOCK_TIME, PRODUCER);
    let mut delegations = init_delegators(&mut engine, &args, &validators, first_block, &mut rng);

    let mut end_time = start_time;
    for number in 1..=args.blocks {
        end_time = start_time + number * BLOCK_TIME;
        let block = BlockContext::new(number, end_time, PRODUCER);
        step_block(&mut engine, &args, block, &mut delegations, &mut rng);
    }

    let events = engine.drain_events();
    let slashes = events
        .iter()
        .filter(|e| matches!(e, StakingEvent::ValidatorSlashed { .. }))
        .count();
    info!("Simulation finished: {} events, {} slashes", events.len(), slashes);

    print_report(&engine, start_time, end_time);
}
