//! Diagnostic tool - Check router configuration
//!
//! Run with: cargo run --bin diagnose

use std::env;
use std::fs;
use std::path::Path;

fn looks_like_address(value: &str) -> bool {
    let hex = value.trim().trim_start_matches("0x");
    value.trim().starts_with("0x") && hex.len() == 40 && hex::decode(hex).is_ok()
}

fn main() {
    println!("🔍 BRIQ DIAGNOSTIC CHECK\n");

    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("CHAIN_ID", "1", "Which chain the addresses belong to"),
        ("MIN_APY_DELTA_BPS", "25", "APY gain needed before rerouting"),
        ("MAX_RATE_AGE_SECS", "3600", "Rates older than this are ignored"),
        ("MIGRATE_ON_ROUTE", "false", "Move deployed funds on reroute?"),
        ("EVENT_LOG", "true", "Write events to disk?"),
        ("SIMULATION_USERS", "8", "Depositors in simulate / stress"),
        ("EMERGENCY_STOP", "false", "Unwind positions after each run?"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    println!("═══════════════════════════════════════════════════");
    println!("                    ADDRESSES                       ");
    println!("═══════════════════════════════════════════════════\n");

    let mut problems = 0;
    for key in ["OWNER_ADDRESS", "AAVE_POOL_ADDRESS", "COMET_MARKET_ADDRESS"] {
        match env::var(key) {
            Ok(value) if looks_like_address(&value) => println!("  {:<22} ✅ {}", key, value.trim()),
            Ok(value) => {
                problems += 1;
                println!("  {:<22} ❌ Not an address: {}", key, value);
            }
            Err(_) => println!("  {:<22} ➖ Not set (built-in default)", key),
        }
    }
    for key in ["SUPPORTED_TOKENS", "WHITELISTED_ACCOUNTS"] {
        let Ok(list) = env::var(key) else {
            println!("  {:<22} ➖ Not set (built-in default)", key);
            continue;
        };
        let entries: Vec<&str> = list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        let bad = entries.iter().filter(|s| !looks_like_address(s)).count();
        if bad == 0 {
            println!("  {:<22} ✅ {} entries", key, entries.len());
        } else {
            problems += bad;
            println!("  {:<22} ❌ {} of {} entries are not addresses", key, bad, entries.len());
        }
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                      FILES                         ");
    println!("═══════════════════════════════════════════════════\n");

    let feed = env::var("RATE_FEED_PATH").unwrap_or_else(|_| "./data/rates.json".to_string());
    match fs::read_to_string(&feed) {
        Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(quotes)) => {
                println!("  RATE_FEED_PATH: ✅ {} ({} quotes)", feed, quotes.len())
            }
            Ok(_) => {
                problems += 1;
                println!("  RATE_FEED_PATH: ❌ {} is not a JSON array", feed);
            }
            Err(e) => {
                problems += 1;
                println!("  RATE_FEED_PATH: ❌ {} is not valid JSON: {}", feed, e);
            }
        },
        Err(_) => println!("  RATE_FEED_PATH: ⚠️  {} missing (`route` will fail)", feed),
    }

    let log = env::var("EVENT_LOG_PATH").unwrap_or_else(|_| "./logs/events.jsonl".to_string());
    let log_dir = Path::new(&log).parent().filter(|p| !p.as_os_str().is_empty());
    match log_dir {
        Some(dir) if !dir.exists() => println!("  EVENT_LOG_PATH: ➖ {} (directory will be created)", log),
        _ => println!("  EVENT_LOG_PATH: ✅ {}", log),
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    let stop = env::var("EMERGENCY_STOP")
        .ok()
        .and_then(|s| s.parse::<bool>().ok())
        .unwrap_or(false);
    if stop {
        println!("  🛑 EMERGENCY STOP ACTIVE");
        println!("     → Positions are pulled back after every run");
    } else {
        println!("  ✅ Normal operation");
    }

    if problems > 0 {
        println!("\n❌ Diagnostic found {} problem(s)\n", problems);
        std::process::exit(1);
    }
    println!("\n✅ Diagnostic complete!\n");
}
