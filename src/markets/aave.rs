//! Aave V3 pool adapter
//!
//! Positions are held as aToken balances. Internally Aave stores a *scaled*
//! balance and multiplies by the reserve's liquidity index (ray, 1e27) to get
//! the current value, so interest shows up as index growth.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use tracing::debug;

use super::{grow_index, MarketAdapter, MarketConditions, MarketError, MarketType};

/// 1e27 - Aave's fixed-point unit
pub const RAY: U256 = U256::from_limbs([11515845246265065472, 54210108, 0, 0]);

/// One listed reserve of the pool
#[derive(Debug, Clone)]
struct Reserve {
    a_token: Address,
    liquidity_index: U256,
    scaled_balance: U256,
}

/// Adapter for one Aave V3 pool
#[derive(Debug, Clone)]
pub struct AaveAdapter {
    pool: Address,
    reserves: HashMap<Address, Reserve>,
    conditions: MarketConditions,
}

impl AaveAdapter {
    pub fn new(pool: Address) -> Self {
        Self {
            pool,
            reserves: HashMap::new(),
            conditions: MarketConditions::default(),
        }
    }

    /// List `token` on the pool with its aToken
    pub fn with_reserve(mut self, token: Address, a_token: Address) -> Self {
        self.reserves.insert(
            token,
            Reserve {
                a_token,
                liquidity_index: RAY,
                scaled_balance: U256::ZERO,
            },
        );
        self
    }

    /// aToken address for `token`
    pub fn a_token(&self, token: Address) -> Option<Address> {
        self.reserves.get(&token).map(|r| r.a_token)
    }

    pub fn scaled_balance(&self, token: Address) -> U256 {
        self.reserves
            .get(&token)
            .map(|r| r.scaled_balance)
            .unwrap_or_default()
    }

    /// Grow the reserve's liquidity index by `bps` basis points
    pub fn accrue(&mut self, token: Address, bps: u32) -> Result<(), MarketError> {
        let reserve = self
            .reserves
            .get_mut(&token)
            .ok_or(MarketError::UnsupportedAsset(token))?;
        reserve.liquidity_index = grow_index(reserve.liquidity_index, bps)?;
        debug!(
            "Aave reserve {:?} index -> {}",
            token, reserve.liquidity_index
        );
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.conditions.paused = paused;
    }

    /// Limit the cash the pool can hand back for `token` (`None` = unlimited)
    pub fn set_cash_cap(&mut self, token: Address, cap: Option<U256>) {
        match cap {
            Some(cap) => self.conditions.cash_caps.insert(token, cap),
            None => self.conditions.cash_caps.remove(&token),
        };
    }

    fn reserve(&self, token: Address) -> Result<&Reserve, MarketError> {
        self.reserves
            .get(&token)
            .ok_or(MarketError::UnsupportedAsset(token))
    }
}

impl MarketAdapter for AaveAdapter {
    fn market(&self) -> Address {
        self.pool
    }

    fn market_type(&self) -> MarketType {
        MarketType::Aave
    }

    fn supply(&mut self, token: Address, amount: U256) -> Result<(), MarketError> {
        self.conditions.ensure_active(self.pool)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let reserve = self.reserve(token)?;
        let scaled = amount
            .checked_mul(RAY)
            .map(|v| v / reserve.liquidity_index)
            .ok_or(MarketError::Overflow)?;
        let new_scaled = reserve
            .scaled_balance
            .checked_add(scaled)
            .ok_or(MarketError::Overflow)?;

        if let Some(reserve) = self.reserves.get_mut(&token) {
            reserve.scaled_balance = new_scaled;
        }
        if let Some(cash) = self.conditions.cash_caps.get_mut(&token) {
            *cash = cash.saturating_add(amount);
        }
        Ok(())
    }

    fn withdraw(&mut self, token: Address, amount: U256) -> Result<U256, MarketError> {
        self.conditions.ensure_active(self.pool)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let balance = self.balance(token);
        let reserve = self.reserve(token)?;
        let amount = if amount == U256::MAX { balance } else { amount };
        if amount > balance {
            return Err(MarketError::InsufficientPosition {
                requested: amount,
                balance,
            });
        }
        self.conditions.ensure_cash(token, amount)?;

        // Burn rounds up so the pool never pays out more than the position
        let new_scaled = if amount == balance {
            U256::ZERO
        } else {
            let index = reserve.liquidity_index;
            let numerator = amount
                .checked_mul(RAY)
                .and_then(|v| v.checked_add(index - U256::from(1u64)))
                .ok_or(MarketError::Overflow)?;
            let burn = numerator / index;
            reserve.scaled_balance.saturating_sub(burn)
        };

        if let Some(reserve) = self.reserves.get_mut(&token) {
            reserve.scaled_balance = new_scaled;
        }
        self.conditions.consume_cash(token, amount);
        Ok(amount)
    }

    fn balance(&self, token: Address) -> U256 {
        self.reserves
            .get(&token)
            .and_then(|r| r.scaled_balance.checked_mul(r.liquidity_index))
            .map(|v| v / RAY)
            .unwrap_or_default()
    }

    fn withdrawable(&self, token: Address) -> U256 {
        self.conditions.cap(token, self.balance(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> Address {
        Address::repeat_byte(0xA0)
    }

    fn pool() -> AaveAdapter {
        AaveAdapter::new(Address::repeat_byte(0x87)).with_reserve(usdc(), Address::repeat_byte(0x98))
    }

    #[test]
    fn test_ray_constant() {
        assert_eq!(RAY, U256::from(10u64).pow(U256::from(27u64)));
    }

    #[test]
    fn test_supply_and_withdraw() {
        let mut aave = pool();
        aave.supply(usdc(), U256::from(100_000_000u64)).unwrap();
        assert_eq!(aave.balance(usdc()), U256::from(100_000_000u64));

        let out = aave.withdraw(usdc(), U256::from(40_000_000u64)).unwrap();
        assert_eq!(out, U256::from(40_000_000u64));
        assert_eq!(aave.balance(usdc()), U256::from(60_000_000u64));
    }

    #[test]
    fn test_interest_accrues_through_index() {
        let mut aave = pool();
        aave.supply(usdc(), U256::from(1_000_000u64)).unwrap();
        aave.accrue(usdc(), 500).unwrap();
        assert_eq!(aave.balance(usdc()), U256::from(1_050_000u64));

        // MAX withdraws everything, interest included
        let out = aave.withdraw(usdc(), U256::MAX).unwrap();
        assert_eq!(out, U256::from(1_050_000u64));
        assert_eq!(aave.scaled_balance(usdc()), U256::ZERO);
    }

    #[test]
    fn test_paused_pool_rejects_calls() {
        let mut aave = pool();
        aave.set_paused(true);
        assert_eq!(
            aave.supply(usdc(), U256::from(1u64)),
            Err(MarketError::Paused(aave.market()))
        );
    }

    #[test]
    fn test_unlisted_asset() {
        let mut aave = pool();
        let dai = Address::repeat_byte(0x6B);
        assert_eq!(
            aave.supply(dai, U256::from(1u64)),
            Err(MarketError::UnsupportedAsset(dai))
        );
        assert_eq!(aave.a_token(dai), None);
    }

    #[test]
    fn test_cash_cap_limits_withdrawable() {
        let mut aave = pool();
        aave.supply(usdc(), U256::from(1_000u64)).unwrap();
        aave.set_cash_cap(usdc(), Some(U256::from(300u64)));
        assert_eq!(aave.withdrawable(usdc()), U256::from(300u64));
        assert!(matches!(
            aave.withdraw(usdc(), U256::from(500u64)),
            Err(MarketError::InsufficientCash { .. })
        ));
        assert_eq!(aave.withdraw(usdc(), U256::from(300u64)).unwrap(), U256::from(300u64));
        assert_eq!(aave.balance(usdc()), U256::from(700u64));
    }
}
