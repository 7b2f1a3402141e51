//! Observations (events)
//!
//! Every committed state transition appends one `Event` to an append-only
//! `EventLog`. Records serialize to JSON lines for the off-chain indexer and
//! encode to EVM logs using the same Solidity event signatures the deployed
//! contracts emit.

use alloy_primitives::{Address, LogData, U256};
use alloy_sol_types::SolEvent;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::markets::MarketType;
use crate::strategy::StrategyId;

// ============================================
// SOLIDITY EVENT SIGNATURES
// ============================================

pub mod abi {
    alloy_sol_types::sol! {
        event SharesMinted(address indexed user, address indexed token, uint256 amountDeposited, uint256 sharesMinted);
        event Deposit(address indexed user, address indexed token, uint256 amount);
        event Withdraw(address indexed user, address indexed token, uint256 amount);
        event TokenSupportUpdated(address indexed token, bool supported);
        event MarketSupportUpdated(address indexed market, bool supported);
        event PoolSupportUpdated(address indexed pool, bool supported);
        event APYUpdated(address indexed pool, uint256 apy, uint256 timestamp);
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
        event AccountWhitelisted(address indexed account, bool whitelisted);
        event LiquiditySupplied(address indexed token, address indexed market, uint256 amount);
        event LiquidityWithdrawn(address indexed token, address indexed market, uint256 requested, uint256 received);
        event MarketSynced(address indexed token, address indexed market, uint256 booked, uint256 reported);
        event StrategyUpdated(address indexed token, uint8 previousStrategy, uint8 newStrategy);
        event EmergencyWithdrawal(address indexed token, uint8 strategy, uint256 recovered);
        event LiquidityMigrated(address indexed token, uint8 fromStrategy, uint8 toStrategy, uint256 amount);
    }
}

// ============================================
// EVENTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "args")]
pub enum Event {
    SharesMinted {
        user: Address,
        token: Address,
        amount_deposited: U256,
        shares_minted: U256,
    },
    Deposit {
        user: Address,
        token: Address,
        amount: U256,
    },
    Withdraw {
        user: Address,
        token: Address,
        amount: U256,
    },
    TokenSupportUpdated {
        token: Address,
        supported: bool,
    },
    /// Logged as `PoolSupportUpdated` for Aave pools
    MarketSupportUpdated {
        market: Address,
        market_type: MarketType,
        supported: bool,
    },
    #[serde(rename = "APYUpdated")]
    ApyUpdated {
        pool: Address,
        apy: u64,
        timestamp: u64,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    AccountWhitelisted {
        account: Address,
        whitelisted: bool,
    },
    LiquiditySupplied {
        token: Address,
        market: Address,
        amount: U256,
    },
    LiquidityWithdrawn {
        token: Address,
        market: Address,
        requested: U256,
        received: U256,
    },
    MarketSynced {
        token: Address,
        market: Address,
        booked: U256,
        reported: U256,
    },
    StrategyUpdated {
        token: Address,
        previous: StrategyId,
        current: StrategyId,
    },
    EmergencyWithdrawal {
        token: Address,
        strategy: StrategyId,
        recovered: U256,
    },
    LiquidityMigrated {
        token: Address,
        from: StrategyId,
        to: StrategyId,
        amount: U256,
    },
}

impl Event {
    /// Solidity signature, e.g. `Deposit(address,address,uint256)`
    pub fn signature(&self) -> &'static str {
        match self {
            Event::SharesMinted { .. } => abi::SharesMinted::SIGNATURE,
            Event::Deposit { .. } => abi::Deposit::SIGNATURE,
            Event::Withdraw { .. } => abi::Withdraw::SIGNATURE,
            Event::TokenSupportUpdated { .. } => abi::TokenSupportUpdated::SIGNATURE,
            Event::MarketSupportUpdated {
                market_type: MarketType::Aave,
                ..
            } => abi::PoolSupportUpdated::SIGNATURE,
            Event::MarketSupportUpdated { .. } => abi::MarketSupportUpdated::SIGNATURE,
            Event::ApyUpdated { .. } => abi::APYUpdated::SIGNATURE,
            Event::OwnershipTransferred { .. } => abi::OwnershipTransferred::SIGNATURE,
            Event::AccountWhitelisted { .. } => abi::AccountWhitelisted::SIGNATURE,
            Event::LiquiditySupplied { .. } => abi::LiquiditySupplied::SIGNATURE,
            Event::LiquidityWithdrawn { .. } => abi::LiquidityWithdrawn::SIGNATURE,
            Event::MarketSynced { .. } => abi::MarketSynced::SIGNATURE,
            Event::StrategyUpdated { .. } => abi::StrategyUpdated::SIGNATURE,
            Event::EmergencyWithdrawal { .. } => abi::EmergencyWithdrawal::SIGNATURE,
            Event::LiquidityMigrated { .. } => abi::LiquidityMigrated::SIGNATURE,
        }
    }

    /// ABI-encode as an EVM log (topics + data)
    pub fn to_log_data(&self) -> LogData {
        match self.clone() {
            Event::SharesMinted {
                user,
                token,
                amount_deposited,
                shares_minted,
            } => abi::SharesMinted {
                user,
                token,
                amountDeposited: amount_deposited,
                sharesMinted: shares_minted,
            }
            .encode_log_data(),
            Event::Deposit { user, token, amount } => {
                abi::Deposit { user, token, amount }.encode_log_data()
            }
            Event::Withdraw { user, token, amount } => {
                abi::Withdraw { user, token, amount }.encode_log_data()
            }
            Event::TokenSupportUpdated { token, supported } => {
                abi::TokenSupportUpdated { token, supported }.encode_log_data()
            }
            Event::MarketSupportUpdated {
                market,
                market_type: MarketType::Aave,
                supported,
            } => abi::PoolSupportUpdated {
                pool: market,
                supported,
            }
            .encode_log_data(),
            Event::MarketSupportUpdated {
                market, supported, ..
            } => abi::MarketSupportUpdated { market, supported }.encode_log_data(),
            Event::ApyUpdated {
                pool,
                apy,
                timestamp,
            } => abi::APYUpdated {
                pool,
                apy: U256::from(apy),
                timestamp: U256::from(timestamp),
            }
            .encode_log_data(),
            Event::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => abi::OwnershipTransferred {
                previousOwner: previous_owner,
                newOwner: new_owner,
            }
            .encode_log_data(),
            Event::AccountWhitelisted {
                account,
                whitelisted,
            } => abi::AccountWhitelisted {
                account,
                whitelisted,
            }
            .encode_log_data(),
            Event::LiquiditySupplied {
                token,
                market,
                amount,
            } => abi::LiquiditySupplied {
                token,
                market,
                amount,
            }
            .encode_log_data(),
            Event::LiquidityWithdrawn {
                token,
                market,
                requested,
                received,
            } => abi::LiquidityWithdrawn {
                token,
                market,
                requested,
                received,
            }
            .encode_log_data(),
            Event::MarketSynced {
                token,
                market,
                booked,
                reported,
            } => abi::MarketSynced {
                token,
                market,
                booked,
                reported,
            }
            .encode_log_data(),
            Event::StrategyUpdated {
                token,
                previous,
                current,
            } => abi::StrategyUpdated {
                token,
                previousStrategy: previous as u8,
                newStrategy: current as u8,
            }
            .encode_log_data(),
            Event::EmergencyWithdrawal {
                token,
                strategy,
                recovered,
            } => abi::EmergencyWithdrawal {
                token,
                strategy: strategy as u8,
                recovered,
            }
            .encode_log_data(),
            Event::LiquidityMigrated {
                token,
                from,
                to,
                amount,
            } => abi::LiquidityMigrated {
                token,
                fromStrategy: from as u8,
                toStrategy: to as u8,
                amount,
            }
            .encode_log_data(),
        }
    }
}

// ============================================
// EVENT LOG
// ============================================

/// One indexed observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log (log index)
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    /// keccak256 of the Solidity signature, hex
    pub topic0: String,
    #[serde(flatten)]
    pub event: Event,
}

/// Append-only observation log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        let topic0 = event
            .to_log_data()
            .topics()
            .first()
            .map(|t| format!("0x{}", hex::encode(t)))
            .unwrap_or_default();
        self.records.push(EventRecord {
            seq: self.records.len() as u64,
            timestamp: Utc::now(),
            topic0,
            event,
        });
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.records.iter().map(|r| &r.event)
    }

    pub fn last(&self) -> Option<&Event> {
        self.records.last().map(|r| &r.event)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with `seq >= from`, for incremental indexing
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = (from as usize).min(self.records.len());
        &self.records[start..]
    }

    /// Append records with `seq >= from` to a JSON-lines file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P, from: u64) -> Result<usize> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let records = self.since(from);
        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{}", json)?;
        }

        Ok(records.len())
    }
}
