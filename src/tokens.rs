//! Known tokens and lending markets
//!
//! Stablecoins the router accepts plus the venues it can route them into, on
//! Ethereum mainnet and Base. Addresses are the production deployments the
//! rate producers quote for.

use alloy_primitives::{address, Address, U256};
use std::collections::HashMap;

use crate::markets::MarketType;

pub const ETHEREUM: u64 = 1;
pub const BASE: u64 = 8453;

/// Large USDC holder used to fund simulated wallets
pub const USDC_WHALE: Address = address!("aD354CfBAa4A8572DD6Df021514a3931A8329Ef5");

#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
    pub chain_id: u64,
}

/// Protocol family of a lending venue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    AaveV3,
    CompoundV3,
    /// Rate source only; no adapter
    MorphoBlue,
}

impl Protocol {
    /// Adapter flavour, if the router can supply to this protocol
    pub fn market_type(&self) -> Option<MarketType> {
        match self {
            Protocol::AaveV3 => Some(MarketType::Aave),
            Protocol::CompoundV3 => Some(MarketType::Compound),
            Protocol::MorphoBlue => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KnownMarket {
    pub name: &'static str,
    pub address: Address,
    pub protocol: Protocol,
    pub chain_id: u64,
    /// Asset the market lends (Comet base asset / Aave reserve)
    pub asset: Address,
    /// Aave receipt token
    pub receipt: Option<Address>,
}

// ============================================
// TOKENS
// ============================================

pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
pub const DAI: Address = address!("6B175474E89094C44Da98b954EedcdeCB5BE3830");
pub const BASE_USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

pub fn stablecoins() -> Vec<Token> {
    vec![
        Token {
            symbol: "USDC",
            address: USDC,
            decimals: 6,
            chain_id: ETHEREUM,
        },
        Token {
            symbol: "USDT",
            address: USDT,
            decimals: 6,
            chain_id: ETHEREUM,
        },
        Token {
            symbol: "DAI",
            address: DAI,
            decimals: 18,
            chain_id: ETHEREUM,
        },
        Token {
            symbol: "USDC",
            address: BASE_USDC,
            decimals: 6,
            chain_id: BASE,
        },
    ]
}

// ============================================
// MARKETS
// ============================================

pub const AAVE_V3_POOL: Address = address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2");
pub const A_ETH_USDC: Address = address!("98C23E9d8f34FEFb1B7BD6a91B7FF122F4e16F5c");
pub const COMET_USDC: Address = address!("c3d688B66703497DAA19211EEdff47f25384cdc3");
pub const BASE_AAVE_V3_POOL: Address = address!("A238Dd80C259a72e81d7e4664a9801593F98d1c5");
pub const BASE_COMET_USDC: Address = address!("b125E6687d4313864e53df431d5425969c15Eb2F");
pub const BASE_MORPHO_USDC: Address = address!("46415998764c29ab2a25cbea6254146d50d22687");

pub fn known_markets() -> Vec<KnownMarket> {
    vec![
        KnownMarket {
            name: "Aave V3 Ethereum",
            address: AAVE_V3_POOL,
            protocol: Protocol::AaveV3,
            chain_id: ETHEREUM,
            asset: USDC,
            receipt: Some(A_ETH_USDC),
        },
        KnownMarket {
            name: "Compound V3 cUSDCv3",
            address: COMET_USDC,
            protocol: Protocol::CompoundV3,
            chain_id: ETHEREUM,
            asset: USDC,
            receipt: None,
        },
        KnownMarket {
            name: "Aave V3 Base",
            address: BASE_AAVE_V3_POOL,
            protocol: Protocol::AaveV3,
            chain_id: BASE,
            asset: BASE_USDC,
            receipt: None,
        },
        KnownMarket {
            name: "Compound V3 Base cUSDCv3",
            address: BASE_COMET_USDC,
            protocol: Protocol::CompoundV3,
            chain_id: BASE,
            asset: BASE_USDC,
            receipt: None,
        },
        KnownMarket {
            name: "Morpho Blue Base USDC",
            address: BASE_MORPHO_USDC,
            protocol: Protocol::MorphoBlue,
            chain_id: BASE,
            asset: BASE_USDC,
            receipt: None,
        },
    ]
}

pub fn markets_on(chain_id: u64) -> Vec<KnownMarket> {
    known_markets()
        .into_iter()
        .filter(|m| m.chain_id == chain_id)
        .collect()
}

/// Symbol lookup for log output, tokens and markets alike
pub fn build_symbol_map() -> HashMap<Address, &'static str> {
    let mut map = HashMap::new();
    for token in stablecoins() {
        map.insert(token.address, token.symbol);
    }
    for market in known_markets() {
        map.insert(market.address, market.name);
    }
    map
}

pub fn get_token(address: &Address) -> Option<Token> {
    stablecoins().into_iter().find(|t| t.address == *address)
}

pub fn decimals_of(address: &Address) -> u8 {
    get_token(address).map(|t| t.decimals).unwrap_or(18)
}

// ============================================
// UNITS
// ============================================

/// `amount` in base units as a decimal string (`1500000`, 6 -> `1.500000`)
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let unit = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / unit;
    let frac = (amount % unit).to_string();
    format!("{}.{:0>width$}", whole, frac, width = decimals as usize)
}

/// Whole units to base units (`1000`, 6 -> `1000000000`)
pub fn units(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}
