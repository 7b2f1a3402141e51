//! Share book: (user, token) -> shares plus per-token totals
//!
//! The only place shares are minted or burned. Mutations are planned first
//! (every fallible check done) and applied afterwards, so the ledger can run
//! its external call between the two steps.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;

use crate::errors::{add, mul_div, sub, RouterError, RouterResult};

/// 1e18, fixed-point unit of `share_price`
pub const PRICE_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Precomputed post-state of one mint or burn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharePlan {
    pub user: Address,
    pub token: Address,
    pub user_shares: U256,
    pub total_shares: U256,
}

#[derive(Debug, Clone, Default)]
pub struct ShareBook {
    /// (user, token) -> shares; no zero entries
    records: HashMap<(Address, Address), U256>,
    totals: HashMap<Address, U256>,
}

impl ShareBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_shares(&self, user: Address, token: Address) -> U256 {
        self.records.get(&(user, token)).copied().unwrap_or_default()
    }

    pub fn total_shares(&self, token: Address) -> U256 {
        self.totals.get(&token).copied().unwrap_or_default()
    }

    /// Literal sum of every holder's record for `token`
    pub fn sum_of_records(&self, token: Address) -> U256 {
        self.records
            .iter()
            .filter(|((_, t), _)| *t == token)
            .fold(U256::ZERO, |acc, (_, shares)| acc.saturating_add(*shares))
    }

    pub fn holders(&self, token: Address) -> usize {
        self.records.keys().filter(|(_, t)| *t == token).count()
    }

    /// Shares minted for depositing `amount` against `total_liquidity`.
    ///
    /// Bootstrap mints 1:1. A deposit that would round down to zero shares is
    /// rejected, as is a deposit into a pool whose liquidity has been wiped out.
    pub fn shares_for_deposit(
        &self,
        token: Address,
        amount: U256,
        total_liquidity: U256,
    ) -> RouterResult<U256> {
        let total_shares = self.total_shares(token);
        if total_shares.is_zero() {
            return Ok(amount);
        }
        if total_liquidity.is_zero() {
            return Err(RouterError::InsufficientLiquidity {
                needed: amount,
                available: U256::ZERO,
            });
        }
        let minted = mul_div(amount, total_shares, total_liquidity)?;
        if minted.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        Ok(minted)
    }

    /// Token value redeemable for `shares`, rounded down
    pub fn value_of_shares(
        &self,
        token: Address,
        shares: U256,
        total_liquidity: U256,
    ) -> RouterResult<U256> {
        let total_shares = self.total_shares(token);
        if shares > total_shares {
            return Err(RouterError::InsufficientShares);
        }
        mul_div(shares, total_liquidity, total_shares)
    }

    pub fn plan_mint(&self, user: Address, token: Address, shares: U256) -> RouterResult<SharePlan> {
        Ok(SharePlan {
            user,
            token,
            user_shares: add(self.user_shares(user, token), shares)?,
            total_shares: add(self.total_shares(token), shares)?,
        })
    }

    pub fn plan_burn(&self, user: Address, token: Address, shares: U256) -> RouterResult<SharePlan> {
        let owned = self.user_shares(user, token);
        if owned < shares {
            return Err(RouterError::InsufficientShares);
        }
        Ok(SharePlan {
            user,
            token,
            user_shares: owned - shares,
            total_shares: sub(self.total_shares(token), shares)?,
        })
    }

    pub fn apply(&mut self, plan: SharePlan) {
        let key = (plan.user, plan.token);
        if plan.user_shares.is_zero() {
            self.records.remove(&key);
        } else {
            self.records.insert(key, plan.user_shares);
        }
        self.totals.insert(plan.token, plan.total_shares);
    }
}
