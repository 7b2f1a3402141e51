//! Router configuration
//!
//! Loaded from the environment (and `.env`) or from a TOML file. Covers who
//! owns the contracts, which tokens and markets are enabled, where rate feeds
//! and event logs live, and the thresholds the rate router uses.

use alloy_primitives::{address, Address};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::registry::RoutingPolicy;
use crate::tokens;

/// First Hardhat dev account; the vault in local deployments
const DEFAULT_OWNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network ==========
    /// Chain ID (1 = Ethereum, 8453 = Base)
    pub chain_id: u64,

    // ========== Access ==========
    /// Owner of the ledger, coordinator and registry (the vault)
    pub owner_address: Address,

    /// Accounts allowed to push APYs besides the owner
    pub whitelisted_accounts: Vec<Address>,

    // ========== Markets ==========
    /// Tokens enabled for deposits
    pub supported_tokens: Vec<Address>,

    /// Aave V3 pool to route into
    pub aave_pool_address: Address,

    /// Compound V3 (Comet) market to route into
    pub comet_market_address: Address,

    // ========== Rates ==========
    /// JSON rate feed written by the rate producer
    pub rate_feed_path: String,

    /// Minimum APY gain in bps before the router switches strategy
    pub min_apy_delta_bps: u64,

    /// Rates older than this are ignored
    pub max_rate_age_secs: u64,

    /// Move deployed funds when the router switches strategy
    pub migrate_on_route: bool,

    // ========== Events ==========
    /// Write observations to a JSON-lines file
    pub event_log: bool,

    pub event_log_path: String,

    // ========== Simulation ==========
    /// Simulated depositors for `stress`
    pub simulation_users: usize,

    /// RNG seed for `stress`
    pub simulation_seed: u64,

    // ========== Safety ==========
    /// Kill switch: pull everything out of the active strategies
    pub emergency_stop: bool,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            chain_id: env::var("CHAIN_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.chain_id),

            owner_address: env_address("OWNER_ADDRESS", defaults.owner_address)?,
            whitelisted_accounts: match env::var("WHITELISTED_ACCOUNTS") {
                Ok(s) => parse_address_list(&s)?,
                Err(_) => defaults.whitelisted_accounts,
            },

            supported_tokens: match env::var("SUPPORTED_TOKENS") {
                Ok(s) => parse_address_list(&s)?,
                Err(_) => defaults.supported_tokens,
            },
            aave_pool_address: env_address("AAVE_POOL_ADDRESS", defaults.aave_pool_address)?,
            comet_market_address: env_address("COMET_MARKET_ADDRESS", defaults.comet_market_address)?,

            rate_feed_path: env::var("RATE_FEED_PATH").unwrap_or(defaults.rate_feed_path),
            min_apy_delta_bps: env::var("MIN_APY_DELTA_BPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_apy_delta_bps),
            max_rate_age_secs: env::var("MAX_RATE_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_rate_age_secs),
            migrate_on_route: env::var("MIGRATE_ON_ROUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.migrate_on_route),

            event_log: env::var("EVENT_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_log),
            event_log_path: env::var("EVENT_LOG_PATH").unwrap_or(defaults.event_log_path),

            simulation_users: env::var("SIMULATION_USERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.simulation_users),
            simulation_seed: env::var("SIMULATION_SEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.simulation_seed),

            emergency_stop: env::var("EMERGENCY_STOP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.emergency_stop),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            min_apy_delta_bps: self.min_apy_delta_bps,
            max_rate_age_secs: self.max_rate_age_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner_address == Address::ZERO {
            return Err(eyre!("OWNER_ADDRESS must not be the zero address"));
        }
        if self.supported_tokens.is_empty() {
            return Err(eyre!("SUPPORTED_TOKENS is empty - nothing to deposit"));
        }
        if self.aave_pool_address == self.comet_market_address {
            return Err(eyre!(
                "AAVE_POOL_ADDRESS and COMET_MARKET_ADDRESS are the same ({:?})",
                self.aave_pool_address
            ));
        }
        if self.min_apy_delta_bps > 10_000 {
            return Err(eyre!(
                "MIN_APY_DELTA_BPS above 100% ({}) would never switch",
                self.min_apy_delta_bps
            ));
        }
        if self.max_rate_age_secs == 0 {
            return Err(eyre!("MAX_RATE_AGE_SECS must be > 0"));
        }
        if self.simulation_users == 0 {
            return Err(eyre!("SIMULATION_USERS must be > 0"));
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                BRIQ ROUTER - CONFIGURATION                 ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Owner:             {:^40} ║", short(&self.owner_address));
        println!("║ Whitelisted:       {:^40} ║", self.whitelisted_accounts.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ MARKETS                                                    ║");
        println!("║ • Tokens:          {:^40} ║", self.supported_tokens.len());
        println!("║ • Aave V3 Pool:    {:^40} ║", short(&self.aave_pool_address));
        println!("║ • Comet Market:    {:^40} ║", short(&self.comet_market_address));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ROUTING                                                    ║");
        println!("║ • Min APY Delta:   {:>36} bps ║", self.min_apy_delta_bps);
        println!("║ • Max Rate Age:    {:>38} s ║", self.max_rate_age_secs);
        println!("║ • Migrate:         {:^40} ║",
            if self.migrate_on_route { "✓ Move deployed funds" } else { "✗ New deposits only" }
        );
        println!("║ • Rate Feed:       {:^40} ║", self.rate_feed_path);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SAFETY                                                     ║");
        println!("║ • Emergency Stop:  {:^40} ║",
            if self.emergency_stop { "🛑 ACTIVE" } else { "✓ Inactive" }
        );
        println!("║ • Event Log:       {:^40} ║",
            if self.event_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: tokens::ETHEREUM,
            owner_address: DEFAULT_OWNER,
            whitelisted_accounts: vec![],
            supported_tokens: vec![tokens::USDC],
            aave_pool_address: tokens::AAVE_V3_POOL,
            comet_market_address: tokens::COMET_USDC,
            rate_feed_path: "./data/rates.json".to_string(),
            min_apy_delta_bps: 25,
            max_rate_age_secs: 3_600,
            migrate_on_route: false,
            event_log: true,
            event_log_path: "./logs/events.jsonl".to_string(),
            simulation_users: 8,
            simulation_seed: 42,
            emergency_stop: false,
        }
    }
}

/// `key` from the environment, or `default` when unset. A set but malformed
/// value is an error, never a silent fallback.
fn env_address(key: &str, default: Address) -> Result<Address> {
    match env::var(key) {
        Ok(raw) => parse_address(key, &raw),
        Err(_) => Ok(default),
    }
}

pub fn parse_address(key: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| eyre!("Invalid {} {:?}: {}", key, raw, e))
}

/// Comma-separated addresses; blanks are skipped
pub fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Address::from_str(s).map_err(|e| eyre!("Invalid address {:?}: {}", s, e)))
        .collect()
}

fn short(address: &Address) -> String {
    let hex = format!("{:?}", address);
    format!("{}…{}", &hex[..6], &hex[hex.len() - 4..])
}

// ============================================
// TESTS
// ============================================
