//! Briq - share-based liquidity ledger and yield router
//!
//! Run with: cargo run -- simulate | route | stress
//!
//! Pools stablecoin deposits against proportional shares, supplies the pool
//! into Aave V3 / Compound V3, and reroutes between them as rates move.

use alloy_primitives::{address, Address, U256};
use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod access;
mod bank;
mod config;
mod errors;
mod events;
mod ledger;
mod markets;
mod registry;
mod strategy;
mod tokens;

use config::Config;
use events::EventLog;
use ledger::{LedgerSnapshot, LiquidityManager, LiquidityService};
use markets::{AaveAdapter, CometAdapter, MarketAdapter, MarketType};
use registry::{push_rates, ApyRegistry, RateFeed};
use strategy::{Strategy, StrategyCoordinator, StrategyId};
use tokens::Protocol;

/// Local deployment addresses of the two contracts holding funds
const LEDGER_ADDRESS: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
const COORDINATOR_ADDRESS: Address = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");

#[derive(Parser)]
#[command(name = "briq")]
#[command(version, about = "Share-based liquidity ledger and yield router", long_about = None)]
struct Cli {
    /// TOML config file (defaults to environment / .env)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Deposit, supply, accrue and redeem against in-memory markets
    Simulate {
        /// Whole token units each user deposits
        #[arg(long, default_value = "1000")]
        amount: u64,

        /// Interest accrued on each market, in bps
        #[arg(long, default_value = "50")]
        yield_bps: u32,
    },
    /// Push a rate feed into the registry and reroute the coordinator
    Route {
        /// Rate feed JSON (defaults to RATE_FEED_PATH)
        #[arg(long)]
        feed: Option<PathBuf>,

        /// Whole token units to deploy through the coordinator
        #[arg(long, default_value = "10000")]
        amount: u64,

        /// Strategy currently holding the position (1 = aave, 2 = compound)
        #[arg(long, default_value = "1")]
        current: u8,

        /// Move the deployed position when the selection changes
        #[arg(long)]
        migrate: bool,
    },
    /// Concurrent random deposits and withdrawals through the shared ledger
    Stress {
        /// Operations per user
        #[arg(long, default_value = "50")]
        rounds: usize,

        /// Override SIMULATION_SEED
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🧱 BRIQ - Liquidity Ledger & Yield Router").cyan().bold()
    );
    println!(
        "{}",
        style("    Proportional shares | Aave V3 | Compound V3").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn symbol(address: &Address, symbols: &HashMap<Address, &str>) -> String {
    match symbols.get(address) {
        Some(symbol) => symbol.to_string(),
        None => format!("0x{}...", &format!("{:?}", address)[2..8]),
    }
}

/// Deterministic simulated depositor
fn user(index: usize) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xB1;
    bytes[12..].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    Address::from(bytes)
}

/// Aave receipt token for `token`, from the known market list
fn a_token_for(token: Address) -> Address {
    tokens::known_markets()
        .into_iter()
        .find(|m| m.protocol == Protocol::AaveV3 && m.asset == token)
        .and_then(|m| m.receipt)
        .unwrap_or(Address::ZERO)
}

fn primary_token(config: &Config) -> Result<Address> {
    config
        .supported_tokens
        .first()
        .copied()
        .ok_or_else(|| eyre!("No supported tokens configured"))
}

fn build_aave(config: &Config) -> AaveAdapter {
    config
        .supported_tokens
        .iter()
        .fold(AaveAdapter::new(config.aave_pool_address), |adapter, token| {
            adapter.with_reserve(*token, a_token_for(*token))
        })
}

fn build_ledger(config: &Config) -> Result<LiquidityManager> {
    let owner = config.owner_address;
    let mut manager = LiquidityManager::new(owner, LEDGER_ADDRESS);

    for token in &config.supported_tokens {
        manager.update_supported_tokens(owner, *token, true)?;
    }
    manager.register_market(owner, build_aave(config))?;
    manager.register_market(
        owner,
        CometAdapter::new(config.comet_market_address, primary_token(config)?),
    )?;
    manager.update_supported_aave_pools(owner, config.aave_pool_address, true)?;
    manager.update_supported_comet_markets(owner, config.comet_market_address, true)?;

    Ok(manager)
}

fn build_coordinator(config: &Config) -> Result<StrategyCoordinator> {
    let owner = config.owner_address;
    let base = primary_token(config)?;

    let mut aave = Strategy::new(build_aave(config), owner, COORDINATOR_ADDRESS);
    let mut compound = Strategy::new(
        CometAdapter::new(config.comet_market_address, base),
        owner,
        COORDINATOR_ADDRESS,
    );
    for token in &config.supported_tokens {
        aave.update_pool_support(owner, config.aave_pool_address, *token, true)?;
        aave.update_token_support(owner, *token, true)?;
    }
    compound.update_market_support(owner, config.comet_market_address, base, true)?;
    compound.update_token_support(owner, base, true)?;

    Ok(StrategyCoordinator::new(owner, COORDINATOR_ADDRESS, aave, compound)?)
}

fn print_snapshot(snapshot: &LedgerSnapshot, decimals: u8, symbols: &HashMap<Address, &str>) {
    println!(
        "   {} total {} | idle {} | markets {} | shares {} | holders {} {}",
        style(symbol(&snapshot.token, symbols)).bold(),
        tokens::format_units(snapshot.total_liquidity, decimals),
        tokens::format_units(snapshot.idle, decimals),
        tokens::format_units(snapshot.market_sum, decimals),
        snapshot.total_shares,
        snapshot.holders,
        if snapshot.holds() { style("✓").green() } else { style("✗").red() }
    );
}

fn flush_events(config: &Config, logs: &[(&str, &EventLog)]) {
    if !config.event_log {
        return;
    }
    for (name, log) in logs {
        match log.append_to_file(&config.event_log_path, 0) {
            Ok(written) => debug!("Wrote {} {} events to {}", written, name, config.event_log_path),
            Err(e) => warn!("⚠️ Failed to write {} events: {}", name, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("briq=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    config.print_summary();
    println!();

    if config.emergency_stop {
        warn!("🛑 EMERGENCY_STOP is set - positions will be unwound after the run");
    }

    let command = cli.command.unwrap_or(Command::Simulate {
        amount: 1_000,
        yield_bps: 50,
    });

    match command {
        Command::Simulate { amount, yield_bps } => run_simulation(&config, amount, yield_bps),
        Command::Route {
            feed,
            amount,
            current,
            migrate,
        } => run_route(&config, feed, amount, current, migrate || config.migrate_on_route),
        Command::Stress { rounds, seed } => {
            run_stress(&config, rounds, seed.unwrap_or(config.simulation_seed)).await
        }
    }
}

// ============================================
// SIMULATE
// ============================================

fn run_simulation(config: &Config, amount: u64, yield_bps: u32) -> Result<()> {
    let symbols = tokens::build_symbol_map();
    let owner = config.owner_address;
    let token = primary_token(config)?;
    let decimals = tokens::decimals_of(&token);
    let start = Instant::now();

    let mut manager = build_ledger(config)?;

    info!(
        "👥 {} users depositing {} {} each",
        config.simulation_users,
        amount,
        symbol(&token, &symbols)
    );
    for i in 0..config.simulation_users {
        let deposit = tokens::units(amount * (i as u64 + 1), decimals);
        manager.bank_mut().mint(token, user(i), deposit)?;
        let minted = manager.deposit(user(i), token, deposit)?;
        debug!("User {} minted {} shares", i, minted);
    }
    print_snapshot(&manager.snapshot(token), decimals, &symbols);

    // Half of the pool to Aave, a quarter to Comet, the rest stays idle
    let idle = manager.idle_balance(token);
    manager.supply_to_aave(owner, token, config.aave_pool_address, idle / U256::from(2u64))?;
    manager.supply_to_compound(owner, token, config.comet_market_address, idle / U256::from(4u64))?;
    print_snapshot(&manager.snapshot(token), decimals, &symbols);

    info!("⏳ Accruing {} bps on both markets", yield_bps);
    manager
        .venue_mut(config.aave_pool_address)?
        .accrue(token, yield_bps)?;
    manager
        .venue_mut(config.comet_market_address)?
        .accrue(token, yield_bps)?;
    manager.sync_market(owner, token, config.aave_pool_address)?;
    manager.sync_market(owner, token, config.comet_market_address)?;
    print_snapshot(&manager.snapshot(token), decimals, &symbols);
    info!("💹 Share price: {} (1e18 = par)", manager.share_price(token)?);

    // Largest holder exits; the shortfall comes out of Aave
    let whale = user(config.simulation_users - 1);
    let shares = manager.user_shares(whale, token);
    match manager.redeem_from_market(whale, token, config.aave_pool_address, shares, MarketType::Aave) {
        Ok(paid) => info!(
            "💸 Largest holder redeemed {} shares for {} {}",
            shares,
            tokens::format_units(paid, decimals),
            symbol(&token, &symbols)
        ),
        Err(e) if e.is_retryable() => warn!("⚠️ Largest holder cannot exit yet: {}", e),
        Err(e) => return Err(e.into()),
    }

    if config.emergency_stop {
        for (market, market_type) in [
            (config.aave_pool_address, MarketType::Aave),
            (config.comet_market_address, MarketType::Compound),
        ] {
            if manager.market_liquidity(token, market).is_zero() {
                continue;
            }
            let pulled = manager.withdraw_from_market(owner, token, market, U256::MAX, market_type)?;
            warn!("🚨 Pulled {} back from {} {:?}", pulled, market_type, market);
        }
    }

    let snapshot = manager.snapshot(token);
    print_snapshot(&snapshot, decimals, &symbols);
    flush_events(config, &[("ledger", manager.events())]);

    if !manager.check_invariants(token) {
        return Err(eyre!("Ledger invariants broken after simulation"));
    }
    println!(
        "\n   {} {} events in {:.2?}",
        style("✅ Simulation complete:").green().bold(),
        manager.events().len(),
        start.elapsed()
    );
    Ok(())
}

// ============================================
// ROUTE
// ============================================

fn run_route(
    config: &Config,
    feed: Option<PathBuf>,
    amount: u64,
    current: u8,
    migrate: bool,
) -> Result<()> {
    let symbols = tokens::build_symbol_map();
    let owner = config.owner_address;
    let token = primary_token(config)?;
    let decimals = tokens::decimals_of(&token);
    let now = Utc::now().timestamp().max(1) as u64;

    let feed_path = feed.unwrap_or_else(|| PathBuf::from(&config.rate_feed_path));
    let feed = RateFeed::load(&feed_path)?;

    let mut registry = ApyRegistry::new(owner);
    for account in &config.whitelisted_accounts {
        registry.whitelist_account(owner, *account)?;
    }
    let summary = push_rates(&mut registry, owner, &feed, now);
    info!(
        "📊 Rates pushed: {} updated, {} unchanged, {} failed",
        summary.updated, summary.unchanged, summary.failed
    );

    // Existing position in the incumbent strategy
    let mut coordinator = build_coordinator(config)?;
    coordinator.set_strategy_for_token_id(owner, token, current)?;
    let incumbent = coordinator.strategy_for_token(token);
    let deposit = tokens::units(amount, decimals);
    coordinator.bank_mut().mint(token, owner, deposit)?;
    coordinator.deposit(owner, token, deposit)?;
    info!(
        "🏦 {} {} deployed in {}",
        tokens::format_units(deposit, decimals),
        symbol(&token, &symbols),
        incumbent
    );

    let policy = config.routing_policy();
    let candidates = [
        (StrategyId::Aave, config.aave_pool_address),
        (StrategyId::Compound, config.comet_market_address),
    ];
    match policy.apply(&registry, &mut coordinator, owner, token, &candidates, now, migrate)? {
        Some(next) if migrate => info!("🔀 Position moved {} -> {}", incumbent, next),
        Some(next) => info!("🧭 New deposits go to {}; position stays in {}", next, incumbent),
        None => info!("✓ {} remains the best fresh rate", incumbent),
    }

    for (id, pool) in candidates {
        let (apy, at) = registry.get_apy(pool);
        println!(
            "   {:<10} {:>6.2}% (at {}) position {}",
            id.to_string(),
            apy as f64 / 100.0,
            at,
            tokens::format_units(coordinator.strategy_balance(token, id), decimals)
        );
    }

    if config.emergency_stop {
        match coordinator.emergency_withdraw(owner, token) {
            Ok(recovered) => warn!(
                "🚨 Emergency withdrawal recovered {} {}",
                tokens::format_units(recovered, decimals),
                symbol(&token, &symbols)
            ),
            Err(e) => error!("❌ Emergency withdrawal failed: {}", e),
        }
    }

    flush_events(
        config,
        &[
            ("registry", registry.events()),
            ("coordinator", coordinator.events()),
            ("aave strategy", coordinator.aave().events()),
            ("compound strategy", coordinator.compound().events()),
        ],
    );
    Ok(())
}

// ============================================
// STRESS
// ============================================

#[derive(Debug, Default)]
struct UserTally {
    deposits: usize,
    withdrawals: usize,
    rejected: usize,
}

async fn run_stress(config: &Config, rounds: usize, seed: u64) -> Result<()> {
    let owner = config.owner_address;
    let token = primary_token(config)?;
    let decimals = tokens::decimals_of(&token);
    let users = config.simulation_users;
    let start = Instant::now();

    let mut manager = build_ledger(config)?;
    for i in 0..users {
        manager
            .bank_mut()
            .mint(token, user(i), tokens::units(1_000_000, decimals))?;
    }
    let service = LiquidityService::new(manager);

    info!("🏋️ {} users x {} rounds (seed {})", users, rounds, seed);
    let tasks = (0..users).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut tally = UserTally::default();
            for _ in 0..rounds {
                let result = if rng.gen_bool(0.6) {
                    let amount = tokens::units(rng.gen_range(1..=5_000), decimals);
                    service.deposit(user(i), token, amount).await.map(|_| tally.deposits += 1)
                } else {
                    let held = service.user_shares(user(i), token).await;
                    let shares = held / U256::from(rng.gen_range(1u64..=4));
                    service.withdraw(user(i), token, shares).await.map(|_| tally.withdrawals += 1)
                };
                if let Err(e) = result {
                    debug!("User {} rejected: {}", i, e);
                    tally.rejected += 1;
                }
                tokio::task::yield_now().await;
            }
            tally
        })
    });

    let mut total = UserTally::default();
    for result in join_all(tasks).await {
        let tally = result?;
        total.deposits += tally.deposits;
        total.withdrawals += tally.withdrawals;
        total.rejected += tally.rejected;
    }
    info!(
        "📈 {} deposits, {} withdrawals, {} rejected",
        total.deposits, total.withdrawals, total.rejected
    );

    // Put half of the pool to work and accrue before everyone exits
    {
        let mut manager = service.lock().await;
        let idle = manager.idle_balance(token);
        if !idle.is_zero() {
            manager.supply_to_aave(owner, token, config.aave_pool_address, idle / U256::from(2u64))?;
            manager.venue_mut(config.aave_pool_address)?.accrue(token, 25)?;
            manager.sync_market(owner, token, config.aave_pool_address)?;
        }
    }

    for i in 0..users {
        let shares = service.user_shares(user(i), token).await;
        if shares.is_zero() {
            continue;
        }
        match service
            .redeem_from_market(user(i), token, config.aave_pool_address, shares, MarketType::Aave)
            .await
        {
            Ok(paid) => debug!("User {} exited with {}", i, paid),
            Err(e) if e.is_retryable() => warn!("⚠️ User {} could not exit yet: {}", i, e),
            Err(e) => return Err(e.into()),
        }
    }

    let manager = service.lock().await;
    let snapshot = manager.snapshot(token);
    print_snapshot(&snapshot, decimals, &tokens::build_symbol_map());
    flush_events(config, &[("ledger", manager.events())]);

    if !manager.check_invariants(token) {
        error!("❌ Invariants broken after stress run");
        return Err(eyre!("Ledger invariants broken after stress run"));
    }
    if !snapshot.total_shares.is_zero() {
        warn!(
            "⚠️ {} shares still outstanding against {}",
            snapshot.total_shares, snapshot.total_liquidity
        );
    }
    let aave_left = manager
        .venue(config.aave_pool_address)
        .map(|v| v.balance(token))
        .unwrap_or_default();
    println!(
        "\n   {} {} ops in {:.2?}, {} left on Aave as dust",
        style("✅ Stress run complete:").green().bold(),
        total.deposits + total.withdrawals + total.rejected,
        start.elapsed(),
        aave_left
    );
    Ok(())
}
