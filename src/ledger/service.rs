//! Async front door to the ledger
//!
//! One `tokio::sync::Mutex` serializes every request, so independent callers
//! see the same one-transaction-at-a-time ordering a chain would give them.

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use super::{LedgerSnapshot, LiquidityManager};
use crate::errors::RouterResult;
use crate::markets::MarketType;

#[derive(Clone)]
pub struct LiquidityService {
    inner: Arc<Mutex<LiquidityManager>>,
}

impl LiquidityService {
    pub fn new(manager: LiquidityManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Exclusive access for multi-step admin work
    pub async fn lock(&self) -> MutexGuard<'_, LiquidityManager> {
        self.inner.lock().await
    }

    pub async fn deposit(&self, caller: Address, token: Address, amount: U256) -> RouterResult<U256> {
        self.inner.lock().await.deposit(caller, token, amount)
    }

    pub async fn withdraw(&self, caller: Address, token: Address, shares: U256) -> RouterResult<U256> {
        self.inner.lock().await.withdraw(caller, token, shares)
    }

    pub async fn redeem_from_market(
        &self,
        caller: Address,
        token: Address,
        market: Address,
        shares: U256,
        market_type: MarketType,
    ) -> RouterResult<U256> {
        self.inner
            .lock()
            .await
            .redeem_from_market(caller, token, market, shares, market_type)
    }

    pub async fn supply(
        &self,
        caller: Address,
        token: Address,
        market: Address,
        amount: U256,
        market_type: MarketType,
    ) -> RouterResult<()> {
        self.inner
            .lock()
            .await
            .supply(caller, token, market, amount, market_type)
    }

    pub async fn withdraw_from_market(
        &self,
        caller: Address,
        token: Address,
        market: Address,
        amount: U256,
        market_type: MarketType,
    ) -> RouterResult<U256> {
        self.inner
            .lock()
            .await
            .withdraw_from_market(caller, token, market, amount, market_type)
    }

    pub async fn user_shares(&self, user: Address, token: Address) -> U256 {
        self.inner.lock().await.user_shares(user, token)
    }

    pub async fn snapshot(&self, token: Address) -> LedgerSnapshot {
        self.inner.lock().await.snapshot(token)
    }
}
