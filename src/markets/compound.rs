//! Compound V3 (Comet) market adapter
//!
//! A Comet market lends exactly one base asset. Supplied value is stored as a
//! principal against `baseSupplyIndex`; present value = principal * index /
//! BASE_INDEX_SCALE.

use alloy_primitives::{Address, U256};
use tracing::debug;

use super::{grow_index, MarketAdapter, MarketConditions, MarketError, MarketType};

/// Comet's index scale (1e15)
pub const BASE_INDEX_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);

/// Adapter for one Comet market
#[derive(Debug, Clone)]
pub struct CometAdapter {
    comet: Address,
    base_token: Address,
    base_supply_index: U256,
    principal: U256,
    conditions: MarketConditions,
}

impl CometAdapter {
    pub fn new(comet: Address, base_token: Address) -> Self {
        Self {
            comet,
            base_token,
            base_supply_index: BASE_INDEX_SCALE,
            principal: U256::ZERO,
            conditions: MarketConditions::default(),
        }
    }

    /// The market's only lendable asset
    pub fn base_token(&self) -> Address {
        self.base_token
    }

    pub fn principal(&self) -> U256 {
        self.principal
    }

    /// Grow `baseSupplyIndex` by `bps` basis points
    pub fn accrue(&mut self, bps: u32) -> Result<(), MarketError> {
        self.base_supply_index = grow_index(self.base_supply_index, bps)?;
        debug!("Comet {:?} supply index -> {}", self.comet, self.base_supply_index);
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.conditions.paused = paused;
    }

    pub fn set_cash_cap(&mut self, cap: Option<U256>) {
        match cap {
            Some(cap) => self.conditions.cash_caps.insert(self.base_token, cap),
            None => self.conditions.cash_caps.remove(&self.base_token),
        };
    }

    fn ensure_base(&self, token: Address) -> Result<(), MarketError> {
        if token != self.base_token {
            return Err(MarketError::UnsupportedAsset(token));
        }
        Ok(())
    }

    fn present_value(&self) -> Option<U256> {
        self.principal
            .checked_mul(self.base_supply_index)
            .map(|v| v / BASE_INDEX_SCALE)
    }
}

impl MarketAdapter for CometAdapter {
    fn market(&self) -> Address {
        self.comet
    }

    fn market_type(&self) -> MarketType {
        MarketType::Compound
    }

    fn supply(&mut self, token: Address, amount: U256) -> Result<(), MarketError> {
        self.conditions.ensure_active(self.comet)?;
        self.ensure_base(token)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let principal = amount
            .checked_mul(BASE_INDEX_SCALE)
            .map(|v| v / self.base_supply_index)
            .and_then(|p| self.principal.checked_add(p))
            .ok_or(MarketError::Overflow)?;

        self.principal = principal;
        if let Some(cash) = self.conditions.cash_caps.get_mut(&token) {
            *cash = cash.saturating_add(amount);
        }
        Ok(())
    }

    fn withdraw(&mut self, token: Address, amount: U256) -> Result<U256, MarketError> {
        self.conditions.ensure_active(self.comet)?;
        self.ensure_base(token)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let balance = self.present_value().ok_or(MarketError::Overflow)?;
        let amount = if amount == U256::MAX { balance } else { amount };
        // Comet would open a borrow here; the router never borrows
        if amount > balance {
            return Err(MarketError::InsufficientPosition {
                requested: amount,
                balance,
            });
        }
        self.conditions.ensure_cash(token, amount)?;

        self.principal = if amount == balance {
            U256::ZERO
        } else {
            let index = self.base_supply_index;
            let burn = amount
                .checked_mul(BASE_INDEX_SCALE)
                .and_then(|v| v.checked_add(index - U256::from(1u64)))
                .map(|v| v / index)
                .ok_or(MarketError::Overflow)?;
            self.principal.saturating_sub(burn)
        };
        self.conditions.consume_cash(token, amount);
        Ok(amount)
    }

    fn balance(&self, token: Address) -> U256 {
        if token != self.base_token {
            return U256::ZERO;
        }
        self.present_value().unwrap_or_default()
    }

    fn withdrawable(&self, token: Address) -> U256 {
        self.conditions.cap(token, self.balance(token))
    }
}
