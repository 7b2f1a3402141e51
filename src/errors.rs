use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::markets::{MarketError, MarketType};

/// Result alias used by every ledger / strategy / registry entry point
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors surfaced by the routing core.
///
/// Every variant aborts the requested operation with no partial state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    // === Authorization ===
    #[error("Not authorized.")]
    NotAuthorized,
    #[error("Invalid owner: {0}")]
    InvalidOwner(Address),
    #[error("Strategy controller {actual} is not {expected}")]
    ControllerMismatch { expected: Address, actual: Address },

    // === Validation ===
    #[error("Invalid token or amount.")]
    InvalidTokenOrAmount,
    #[error("Token status unchanged.")]
    TokenSupportUnchanged,
    #[error("Market status unchanged.")]
    MarketSupportUnchanged,
    #[error("Strategy unchanged.")]
    StrategyUnchanged,
    #[error("Whitelist status unchanged.")]
    WhitelistUnchanged,
    #[error("APY Has not changed.")]
    ApyUnchanged,
    #[error("Market not supported: {0}")]
    UnsupportedMarket(Address),
    #[error("Unknown market: {0}")]
    UnknownMarket(Address),
    #[error("Market already registered: {0}")]
    MarketAlreadyRegistered(Address),
    #[error("Market {market} is {actual}, not {expected}")]
    MarketTypeMismatch {
        market: Address,
        expected: MarketType,
        actual: MarketType,
    },
    #[error("No active strategy for token {0}")]
    NoActiveStrategy(Address),
    #[error("Invalid strategy id: {0}")]
    InvalidStrategyId(u8),

    // === Accounting ===
    #[error("Insufficient shares.")]
    InsufficientShares,
    #[error("Insufficient liquidity: need {needed}, available {available}")]
    InsufficientLiquidity { needed: U256, available: U256 },
    #[error("Insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: U256, available: U256 },
    #[error("Arithmetic error: {0}")]
    Arithmetic(&'static str),

    // === External market ===
    #[error("Market call failed: {0}")]
    Market(#[from] MarketError),
}

impl RouterError {
    /// Authorization and validation failures are caller mistakes; everything
    /// else depends on ledger or market state and may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::InsufficientLiquidity { .. }
                | RouterError::Market(MarketError::Paused(_))
                | RouterError::Market(MarketError::InsufficientCash { .. })
        )
    }
}

/// Checked-arithmetic helpers; overflow is reported, never wrapped.
pub(crate) fn add(a: U256, b: U256) -> RouterResult<U256> {
    a.checked_add(b).ok_or(RouterError::Arithmetic("addition overflow"))
}

pub(crate) fn sub(a: U256, b: U256) -> RouterResult<U256> {
    a.checked_sub(b).ok_or(RouterError::Arithmetic("subtraction underflow"))
}

/// `a * b / denominator`, rounded down
pub(crate) fn mul_div(a: U256, b: U256, denominator: U256) -> RouterResult<U256> {
    if denominator.is_zero() {
        return Err(RouterError::Arithmetic("division by zero"));
    }
    a.checked_mul(b)
        .map(|product| product / denominator)
        .ok_or(RouterError::Arithmetic("multiplication overflow"))
}
