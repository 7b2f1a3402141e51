//! External lending markets
//!
//! Capability interface over one lending venue plus the two concrete
//! adapters the router ships with:
//! - Aave V3 pool (aToken receipt balance, ray liquidity index)
//! - Compound V3 / Comet market (principal balance, 1e15 supply index)
//!
//! Adapters are in-process models of the venue: they own the position,
//! accrue interest, and can be paused or cash-capped to exercise the
//! failure paths of the ledger.

mod aave;
mod compound;

pub use aave::AaveAdapter;
pub use compound::CometAdapter;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================
// MARKET TYPE
// ============================================

/// Market type tag, numbered like the on-chain `marketType` argument
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    /// Aave V3 pool
    Aave = 0,
    /// Compound V3 (Comet) market
    Compound = 1,
}

impl TryFrom<u8> for MarketType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MarketType::Aave),
            1 => Ok(MarketType::Compound),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketType::Aave => write!(f, "Aave V3"),
            MarketType::Compound => write!(f, "Compound V3"),
        }
    }
}

// ============================================
// MARKET ERRORS
// ============================================

/// Failures raised by the external venue itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("market {0} is paused")]
    Paused(Address),
    #[error("amount must be greater than 0")]
    ZeroAmount,
    #[error("asset {0} not listed on this market")]
    UnsupportedAsset(Address),
    #[error("market cash too low: requested {requested}, available {available}")]
    InsufficientCash { requested: U256, available: U256 },
    #[error("position too small: requested {requested}, balance {balance}")]
    InsufficientPosition { requested: U256, balance: U256 },
    #[error("index overflow")]
    Overflow,
}

// ============================================
// ADAPTER CAPABILITY
// ============================================

/// The thin interface between the router and one lending market
pub trait MarketAdapter: Send + Sync {
    /// Address of the venue (pool / Comet proxy)
    fn market(&self) -> Address;

    /// Which protocol family this adapter speaks
    fn market_type(&self) -> MarketType;

    /// Supply `amount` of `token` to the venue
    fn supply(&mut self, token: Address, amount: U256) -> Result<(), MarketError>;

    /// Withdraw `amount` of `token`; `U256::MAX` withdraws the full position.
    /// Returns the amount actually handed back.
    fn withdraw(&mut self, token: Address, amount: U256) -> Result<U256, MarketError>;

    /// Current value of the position in `token`, interest included
    fn balance(&self, token: Address) -> U256;

    /// Upper bound on what a withdraw can return right now
    fn withdrawable(&self, token: Address) -> U256 {
        self.balance(token)
    }
}

// ============================================
// VENUE
// ============================================

/// A registered lending venue, tagged by protocol
#[derive(Debug, Clone)]
pub enum Venue {
    Aave(AaveAdapter),
    Compound(CometAdapter),
}

impl Venue {
    pub fn as_aave_mut(&mut self) -> Option<&mut AaveAdapter> {
        match self {
            Venue::Aave(aave) => Some(aave),
            Venue::Compound(_) => None,
        }
    }

    pub fn as_comet_mut(&mut self) -> Option<&mut CometAdapter> {
        match self {
            Venue::Compound(comet) => Some(comet),
            Venue::Aave(_) => None,
        }
    }

    /// Accrue `bps` of interest on the `token` position
    pub fn accrue(&mut self, token: Address, bps: u32) -> Result<(), MarketError> {
        match self {
            Venue::Aave(aave) => aave.accrue(token, bps),
            Venue::Compound(comet) => {
                if comet.base_token() != token {
                    return Err(MarketError::UnsupportedAsset(token));
                }
                comet.accrue(bps)
            }
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        match self {
            Venue::Aave(aave) => aave.set_paused(paused),
            Venue::Compound(comet) => comet.set_paused(paused),
        }
    }
}

impl From<AaveAdapter> for Venue {
    fn from(adapter: AaveAdapter) -> Self {
        Venue::Aave(adapter)
    }
}

impl From<CometAdapter> for Venue {
    fn from(adapter: CometAdapter) -> Self {
        Venue::Compound(adapter)
    }
}

impl MarketAdapter for Venue {
    fn market(&self) -> Address {
        match self {
            Venue::Aave(aave) => aave.market(),
            Venue::Compound(comet) => comet.market(),
        }
    }

    fn market_type(&self) -> MarketType {
        match self {
            Venue::Aave(_) => MarketType::Aave,
            Venue::Compound(_) => MarketType::Compound,
        }
    }

    fn supply(&mut self, token: Address, amount: U256) -> Result<(), MarketError> {
        match self {
            Venue::Aave(aave) => aave.supply(token, amount),
            Venue::Compound(comet) => comet.supply(token, amount),
        }
    }

    fn withdraw(&mut self, token: Address, amount: U256) -> Result<U256, MarketError> {
        match self {
            Venue::Aave(aave) => aave.withdraw(token, amount),
            Venue::Compound(comet) => comet.withdraw(token, amount),
        }
    }

    fn balance(&self, token: Address) -> U256 {
        match self {
            Venue::Aave(aave) => aave.balance(token),
            Venue::Compound(comet) => comet.balance(token),
        }
    }

    fn withdrawable(&self, token: Address) -> U256 {
        match self {
            Venue::Aave(aave) => aave.withdrawable(token),
            Venue::Compound(comet) => comet.withdrawable(token),
        }
    }
}

// ============================================
// MARKET CONDITIONS
// ============================================

/// Venue-side conditions shared by both adapters
#[derive(Debug, Clone, Default)]
pub(crate) struct MarketConditions {
    pub paused: bool,
    /// Withdrawable cash per token; absent means unlimited
    pub cash_caps: HashMap<Address, U256>,
}

impl MarketConditions {
    pub fn ensure_active(&self, market: Address) -> Result<(), MarketError> {
        if self.paused {
            return Err(MarketError::Paused(market));
        }
        Ok(())
    }

    pub fn cap(&self, token: Address, value: U256) -> U256 {
        match self.cash_caps.get(&token) {
            Some(cap) => value.min(*cap),
            None => value,
        }
    }

    /// Fail when the venue cannot hand back `requested`
    pub fn ensure_cash(&self, token: Address, requested: U256) -> Result<(), MarketError> {
        if let Some(cap) = self.cash_caps.get(&token) {
            if requested > *cap {
                return Err(MarketError::InsufficientCash {
                    requested,
                    available: *cap,
                });
            }
        }
        Ok(())
    }

    /// Paid-out cash leaves the venue
    pub fn consume_cash(&mut self, token: Address, amount: U256) {
        if let Some(cap) = self.cash_caps.get_mut(&token) {
            *cap = cap.saturating_sub(amount);
        }
    }
}

/// Interest growth factor: `index * (10_000 + bps) / 10_000`
pub(crate) fn grow_index(index: U256, bps: u32) -> Result<U256, MarketError> {
    index
        .checked_mul(U256::from(10_000u64 + bps as u64))
        .map(|v| v / U256::from(10_000u64))
        .ok_or(MarketError::Overflow)
}
