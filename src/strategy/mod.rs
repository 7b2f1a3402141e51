//! Strategies: one wrapped lending market each
//!
//! A strategy keeps the token / market enablement flags, forwards deposits and
//! withdrawals from its controller to the adapter, and reports the position's
//! current value. It keeps no share accounting.

pub mod coordinator;

pub use coordinator::StrategyCoordinator;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::access::AccessPolicy;
use crate::errors::{RouterError, RouterResult};
use crate::events::{Event, EventLog};
use crate::markets::{AaveAdapter, CometAdapter, MarketAdapter, MarketError};

/// Routing target selected per token, numbered like the on-chain `uint8`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StrategyId {
    #[default]
    None = 0,
    Aave = 1,
    Compound = 2,
}

impl TryFrom<u8> for StrategyId {
    type Error = RouterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StrategyId::None),
            1 => Ok(StrategyId::Aave),
            2 => Ok(StrategyId::Compound),
            other => Err(RouterError::InvalidStrategyId(other)),
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyId::None => write!(f, "none"),
            StrategyId::Aave => write!(f, "aave"),
            StrategyId::Compound => write!(f, "compound"),
        }
    }
}

pub type StrategyAave = Strategy<AaveAdapter>;
pub type StrategyCompoundComet = Strategy<CometAdapter>;

pub struct Strategy<A: MarketAdapter> {
    access: AccessPolicy,
    /// Only caller allowed to move funds
    controller: Address,
    adapter: A,
    supported_tokens: HashMap<Address, bool>,
    supported_markets: HashMap<Address, bool>,
    token_to_market: HashMap<Address, Address>,
    events: EventLog,
}

impl<A: MarketAdapter> Strategy<A> {
    pub fn new(adapter: A, owner: Address, controller: Address) -> Self {
        Self {
            access: AccessPolicy::new(owner),
            controller,
            adapter,
            supported_tokens: HashMap::new(),
            supported_markets: HashMap::new(),
            token_to_market: HashMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn market(&self) -> Address {
        self.adapter.market()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn is_token_supported(&self, token: Address) -> bool {
        self.supported_tokens.get(&token).copied().unwrap_or(false)
    }

    pub fn is_market_supported(&self, market: Address) -> bool {
        self.supported_markets.get(&market).copied().unwrap_or(false)
    }

    pub fn token_to_market(&self, token: Address) -> Option<Address> {
        self.token_to_market.get(&token).copied()
    }

    pub fn update_token_support(
        &mut self,
        caller: Address,
        token: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        if self.is_token_supported(token) == supported {
            return Err(RouterError::TokenSupportUnchanged);
        }
        self.supported_tokens.insert(token, supported);
        self.events.emit(Event::TokenSupportUpdated { token, supported });
        Ok(())
    }

    /// Enable `market` for `token`; the market must be the wrapped one.
    ///
    /// Support is tracked per token: the market stays supported while any
    /// token is still routed to it.
    pub fn update_market_support(
        &mut self,
        caller: Address,
        market: Address,
        token: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        if market != self.adapter.market() {
            return Err(RouterError::UnknownMarket(market));
        }
        let current =
            self.is_market_supported(market) && self.token_to_market(token) == Some(market);
        if current == supported {
            return Err(RouterError::MarketSupportUnchanged);
        }
        if supported {
            self.token_to_market.insert(token, market);
            self.supported_markets.insert(market, true);
        } else {
            self.token_to_market.remove(&token);
            let still_routed = self.token_to_market.values().any(|routed| *routed == market);
            self.supported_markets.insert(market, still_routed);
        }
        self.events.emit(Event::MarketSupportUpdated {
            market,
            market_type: self.adapter.market_type(),
            supported,
        });
        Ok(())
    }

    pub fn deposit(&mut self, caller: Address, token: Address, amount: U256) -> RouterResult<()> {
        self.require_controller(caller)?;
        if amount.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        self.routed_market(token)?;
        self.adapter.supply(token, amount)?;
        debug!("{} strategy supplied {} of {:?}", self.adapter.market_type(), amount, token);
        Ok(())
    }

    /// Returns what the market actually handed back
    pub fn withdraw(&mut self, caller: Address, token: Address, amount: U256) -> RouterResult<U256> {
        self.require_controller(caller)?;
        if amount.is_zero() {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        self.routed_market(token)?;
        let received = self.adapter.withdraw(token, amount)?;
        debug!("{} strategy returned {} of {:?}", self.adapter.market_type(), received, token);
        Ok(received)
    }

    pub fn balance_of(&self, token: Address) -> U256 {
        self.adapter.balance(token)
    }

    /// Pull everything recoverable, ignoring support flags.
    ///
    /// When the market cannot pay the full reported balance the call retries
    /// with what it can pay.
    pub fn emergency_withdraw(&mut self, caller: Address, token: Address) -> RouterResult<U256> {
        self.require_controller(caller)?;
        let reported = self.adapter.balance(token);
        if reported.is_zero() {
            return Ok(U256::ZERO);
        }
        match self.adapter.withdraw(token, U256::MAX) {
            Ok(received) => Ok(received),
            Err(MarketError::InsufficientCash { available, .. }) => {
                let recoverable = self.adapter.withdrawable(token).min(available);
                warn!(
                    "⚠️ {} market short on cash: reported {}, recovering {}",
                    self.adapter.market_type(),
                    reported,
                    recoverable
                );
                if recoverable.is_zero() {
                    return Ok(U256::ZERO);
                }
                Ok(self.adapter.withdraw(token, recoverable)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn require_controller(&self, caller: Address) -> RouterResult<()> {
        if caller != self.controller {
            return Err(RouterError::NotAuthorized);
        }
        Ok(())
    }

    fn routed_market(&self, token: Address) -> RouterResult<Address> {
        if !self.is_token_supported(token) {
            return Err(RouterError::InvalidTokenOrAmount);
        }
        match self.token_to_market(token) {
            Some(market) if self.is_market_supported(market) => Ok(market),
            Some(market) => Err(RouterError::UnsupportedMarket(market)),
            None => Err(RouterError::UnsupportedMarket(self.adapter.market())),
        }
    }
}

impl Strategy<AaveAdapter> {
    /// Aave naming of `update_market_support`
    pub fn update_pool_support(
        &mut self,
        caller: Address,
        pool: Address,
        token: Address,
        supported: bool,
    ) -> RouterResult<()> {
        self.update_market_support(caller, pool, token, supported)?;
        info!("🏦 Aave pool {:?} for {:?} supported = {}", pool, token, supported);
        Ok(())
    }

    pub fn token_to_a_token(&self, token: Address) -> Option<Address> {
        self.token_to_market(token)
            .and_then(|_| self.adapter.a_token(token))
    }
}

impl Strategy<CometAdapter> {
    pub fn token_to_comet(&self, token: Address) -> Option<Address> {
        self.token_to_market(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const CONTROLLER: Address = Address::repeat_byte(0xCC);
    const USDC: Address = Address::repeat_byte(0xA0);
    const A_USDC: Address = Address::repeat_byte(0x98);
    const POOL: Address = Address::repeat_byte(0x87);
    const COMET: Address = Address::repeat_byte(0xC3);

    fn aave_strategy() -> StrategyAave {
        let mut s = Strategy::new(AaveAdapter::new(POOL).with_reserve(USDC, A_USDC), OWNER, CONTROLLER);
        s.update_pool_support(OWNER, POOL, USDC, true).unwrap();
        s.update_token_support(OWNER, USDC, true).unwrap();
        s
    }

    #[test]
    fn test_strategy_id_from_u8() {
        assert_eq!(StrategyId::try_from(1u8), Ok(StrategyId::Aave));
        assert_eq!(StrategyId::try_from(2u8), Ok(StrategyId::Compound));
        assert_eq!(
            StrategyId::try_from(7u8),
            Err(RouterError::InvalidStrategyId(7))
        );
        assert_eq!(StrategyId::default() as u8, 0);
    }

    #[test]
    fn test_configuration_flow() {
        let mut s = aave_strategy();
        assert_eq!(s.token_to_market(USDC), Some(POOL));
        assert_eq!(s.token_to_a_token(USDC), Some(A_USDC));

        assert_eq!(
            s.update_token_support(OWNER, USDC, true),
            Err(RouterError::TokenSupportUnchanged)
        );
        s.update_token_support(OWNER, USDC, false).unwrap();
        s.update_pool_support(OWNER, POOL, USDC, false).unwrap();
        assert_eq!(s.token_to_market(USDC), None);
        assert_eq!(
            s.update_pool_support(OWNER, POOL, USDC, false),
            Err(RouterError::MarketSupportUnchanged)
        );
        assert_eq!(
            s.update_pool_support(CONTROLLER, POOL, USDC, true),
            Err(RouterError::NotAuthorized)
        );
        assert_eq!(s.events().len(), 4);
    }

    #[test]
    fn test_one_pool_serves_several_tokens() {
        const DAI: Address = Address::repeat_byte(0x6B);
        let adapter = AaveAdapter::new(POOL)
            .with_reserve(USDC, A_USDC)
            .with_reserve(DAI, Address::repeat_byte(0x99));
        let mut s = Strategy::new(adapter, OWNER, CONTROLLER);
        for token in [USDC, DAI] {
            s.update_token_support(OWNER, token, true).unwrap();
            s.update_pool_support(OWNER, POOL, token, true).unwrap();
        }
        assert_eq!(s.token_to_market(DAI), Some(POOL));
        assert_eq!(
            s.update_pool_support(OWNER, POOL, DAI, true),
            Err(RouterError::MarketSupportUnchanged)
        );

        s.deposit(CONTROLLER, USDC, U256::from(1_000u64)).unwrap();
        s.deposit(CONTROLLER, DAI, U256::from(2_000u64)).unwrap();
        assert_eq!(s.balance_of(DAI), U256::from(2_000u64));

        // dropping one token leaves the pool live for the other
        s.update_pool_support(OWNER, POOL, USDC, false).unwrap();
        assert!(s.is_market_supported(POOL));
        assert_eq!(
            s.deposit(CONTROLLER, USDC, U256::from(1u64)),
            Err(RouterError::UnsupportedMarket(POOL))
        );
        s.deposit(CONTROLLER, DAI, U256::from(1u64)).unwrap();

        s.update_pool_support(OWNER, POOL, DAI, false).unwrap();
        assert!(!s.is_market_supported(POOL));
    }

    #[test]
    fn test_deposit_and_withdraw_flow() {
        let mut s = aave_strategy();
        s.deposit(CONTROLLER, USDC, U256::from(100_000_000u64)).unwrap();
        assert_eq!(s.balance_of(USDC), U256::from(100_000_000u64));

        assert_eq!(
            s.deposit(OWNER, USDC, U256::from(1u64)),
            Err(RouterError::NotAuthorized)
        );
        let out = s.withdraw(CONTROLLER, USDC, U256::from(100_000_000u64)).unwrap();
        assert_eq!(out, U256::from(100_000_000u64));
        assert_eq!(s.balance_of(USDC), U256::ZERO);
    }

    #[test]
    fn test_disabled_token_rejected() {
        let mut s = Strategy::new(CometAdapter::new(COMET, USDC), OWNER, CONTROLLER);
        assert_eq!(
            s.deposit(CONTROLLER, USDC, U256::from(1u64)),
            Err(RouterError::InvalidTokenOrAmount)
        );
        s.update_token_support(OWNER, USDC, true).unwrap();
        assert_eq!(
            s.deposit(CONTROLLER, USDC, U256::from(1u64)),
            Err(RouterError::UnsupportedMarket(COMET))
        );
        s.update_market_support(OWNER, COMET, USDC, true).unwrap();
        assert_eq!(s.token_to_comet(USDC), Some(COMET));
        s.deposit(CONTROLLER, USDC, U256::from(1u64)).unwrap();
    }

    #[test]
    fn test_foreign_market_rejected() {
        let mut s = Strategy::new(CometAdapter::new(COMET, USDC), OWNER, CONTROLLER);
        assert_eq!(
            s.update_market_support(OWNER, POOL, USDC, true),
            Err(RouterError::UnknownMarket(POOL))
        );
    }

    #[test]
    fn test_emergency_withdraw_recovers_what_it_can() {
        let mut s = aave_strategy();
        s.deposit(CONTROLLER, USDC, U256::from(1_000u64)).unwrap();
        s.adapter_mut().accrue(USDC, 1_000).unwrap();
        s.adapter_mut().set_cash_cap(USDC, Some(U256::from(550u64)));

        let recovered = s.emergency_withdraw(CONTROLLER, USDC).unwrap();
        assert_eq!(recovered, U256::from(550u64));
        assert_eq!(s.balance_of(USDC), U256::from(550u64));

        s.adapter_mut().set_cash_cap(USDC, None);
        assert_eq!(
            s.emergency_withdraw(CONTROLLER, USDC).unwrap(),
            U256::from(550u64)
        );
        assert_eq!(s.emergency_withdraw(CONTROLLER, USDC).unwrap(), U256::ZERO);
    }
}
