//! Strategy coordinator
//!
//! Selects exactly one active strategy per token and routes the vault's
//! deposits / withdrawals to it. The coordinator is the controller of both
//! strategies. Switching the selection never moves funds; `migrate` does that
//! explicitly.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::{StrategyAave, StrategyCompoundComet, StrategyId};
use crate::access::AccessPolicy;
use crate::bank::TokenBank;
use crate::errors::{add, RouterError, RouterResult};
use crate::events::{Event, EventLog};

pub struct StrategyCoordinator {
    /// Controller address the strategies expect
    address: Address,
    access: AccessPolicy,
    bank: TokenBank,
    aave: StrategyAave,
    compound: StrategyCompoundComet,
    token_to_strategy: HashMap<Address, StrategyId>,
    /// (token, strategy) -> amount routed in and not yet withdrawn
    deployed: HashMap<(Address, StrategyId), U256>,
    events: EventLog,
}

impl StrategyCoordinator {
    /// Both strategies must have `address` as their controller
    pub fn new(
        owner: Address,
        address: Address,
        aave: StrategyAave,
        compound: StrategyCompoundComet,
    ) -> RouterResult<Self> {
        for actual in [aave.controller(), compound.controller()] {
            if actual != address {
                return Err(RouterError::ControllerMismatch {
                    expected: address,
                    actual,
                });
            }
        }
        Ok(Self {
            address,
            access: AccessPolicy::new(owner),
            bank: TokenBank::new(),
            aave,
            compound,
            token_to_strategy: HashMap::new(),
            deployed: HashMap::new(),
            events: EventLog::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn bank(&self) -> &TokenBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut TokenBank {
        &mut self.bank
    }

    pub fn aave(&self) -> &StrategyAave {
        &self.aave
    }

    pub fn aave_mut(&mut self) -> &mut StrategyAave {
        &mut self.aave
    }

    pub fn compound(&self) -> &StrategyCompoundComet {
        &self.compound
    }

    pub fn compound_mut(&mut self) -> &mut StrategyCompoundComet {
        &mut self.compound
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn strategy_for_token(&self, token: Address) -> StrategyId {
        self.token_to_strategy.get(&token).copied().unwrap_or_default()
    }

    pub fn deployed(&self, token: Address, strategy: StrategyId) -> U256 {
        self.deployed.get(&(token, strategy)).copied().unwrap_or_default()
    }

    /// Current value held by one particular strategy (active or not)
    pub fn strategy_balance(&self, token: Address, strategy: StrategyId) -> U256 {
        match strategy {
            StrategyId::Aave => self.aave.balance_of(token),
            StrategyId::Compound => self.compound.balance_of(token),
            StrategyId::None => U256::ZERO,
        }
    }

    // ============================================
    // SELECTION
    // ============================================

    pub fn set_strategy_for_token(
        &mut self,
        caller: Address,
        token: Address,
        strategy: StrategyId,
    ) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        let previous = self.strategy_for_token(token);
        if previous == strategy {
            return Err(RouterError::StrategyUnchanged);
        }
        self.select(token, strategy);
        info!("🧭 Strategy for {:?}: {} -> {}", token, previous, strategy);
        self.events.emit(Event::StrategyUpdated {
            token,
            previous,
            current: strategy,
        });
        Ok(())
    }

    /// Raw `uint8` form of `set_strategy_for_token`
    pub fn set_strategy_for_token_id(&mut self, caller: Address, token: Address, id: u8) -> RouterResult<()> {
        let strategy = StrategyId::try_from(id)?;
        self.set_strategy_for_token(caller, token, strategy)
    }

    // ============================================
    // ROUTING
    // ============================================

    /// Move `amount` from the caller's balance into the active strategy
    pub fn deposit(&mut self, caller: Address, token: Address, amount: U256) -> RouterResult<()> {
        self.access.require_owner(caller)?;
        let strategy = self.active(token)?;
        let available = self.bank.balance_of(token, caller);
        if available < amount {
            return Err(RouterError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        let booked = add(self.deployed(token, strategy), amount)?;

        self.strategy_deposit(strategy, token, amount)?;
        self.bank.debit(token, caller, amount)?;
        self.deployed.insert((token, strategy), booked);

        info!("📤 Routed {} of {:?} into {}", amount, token, strategy);
        Ok(())
    }

    pub fn withdraw(&mut self, caller: Address, token: Address, amount: U256) -> RouterResult<U256> {
        self.access.require_owner(caller)?;
        let strategy = self.active(token)?;

        let received = self.strategy_withdraw(strategy, token, amount)?;
        if let Err(e) = self.bank.mint(token, caller, received) {
            self.restore(strategy, token, received);
            return Err(e);
        }
        self.unbook(token, strategy, received);

        info!("📥 Pulled {} of {:?} out of {}", received, token, strategy);
        Ok(received)
    }

    pub fn balance_of(&self, token: Address) -> RouterResult<U256> {
        let strategy = self.active(token)?;
        Ok(self.strategy_balance(token, strategy))
    }

    /// Circuit breaker: recover everything the active strategy holds for
    /// `token`, whatever the booking says
    pub fn emergency_withdraw(&mut self, caller: Address, token: Address) -> RouterResult<U256> {
        self.access.require_owner(caller)?;
        let strategy = self.active(token)?;
        let booked = self.deployed(token, strategy);

        let recovered = match strategy {
            StrategyId::Aave => self.aave.emergency_withdraw(self.address, token)?,
            StrategyId::Compound => self.compound.emergency_withdraw(self.address, token)?,
            StrategyId::None => return Err(RouterError::NoActiveStrategy(token)),
        };
        if let Err(e) = self.bank.mint(token, caller, recovered) {
            self.restore(strategy, token, recovered);
            return Err(e);
        }
        self.deployed.remove(&(token, strategy));

        warn!(
            "🚨 Emergency withdrawal of {:?} from {}: booked {}, recovered {}",
            token, strategy, booked, recovered
        );
        self.events.emit(Event::EmergencyWithdrawal {
            token,
            strategy,
            recovered,
        });
        Ok(recovered)
    }

    /// Move the whole position of the active strategy into `to` and select it
    pub fn migrate(&mut self, caller: Address, token: Address, to: StrategyId) -> RouterResult<U256> {
        self.access.require_owner(caller)?;
        let from = self.active(token)?;
        if to == from {
            return Err(RouterError::StrategyUnchanged);
        }
        if to == StrategyId::None {
            return Err(RouterError::InvalidStrategyId(to as u8));
        }

        let amount = if self.strategy_balance(token, from).is_zero() {
            U256::ZERO
        } else {
            self.strategy_withdraw(from, token, U256::MAX)?
        };
        if !amount.is_zero() {
            if let Err(e) = self.strategy_deposit(to, token, amount) {
                self.restore(from, token, amount);
                return Err(e);
            }
        }

        self.deployed.remove(&(token, from));
        let booked = self.deployed(token, to).saturating_add(amount);
        self.deployed.insert((token, to), booked);
        self.select(token, to);

        info!("🔀 Migrated {} of {:?}: {} -> {}", amount, token, from, to);
        self.events.emit(Event::StrategyUpdated {
            token,
            previous: from,
            current: to,
        });
        self.events.emit(Event::LiquidityMigrated {
            token,
            from,
            to,
            amount,
        });
        Ok(amount)
    }

    // ============================================
    // INTERNALS
    // ============================================

    fn active(&self, token: Address) -> RouterResult<StrategyId> {
        match self.strategy_for_token(token) {
            StrategyId::None => Err(RouterError::NoActiveStrategy(token)),
            strategy => Ok(strategy),
        }
    }

    fn select(&mut self, token: Address, strategy: StrategyId) {
        if strategy == StrategyId::None {
            self.token_to_strategy.remove(&token);
        } else {
            self.token_to_strategy.insert(token, strategy);
        }
    }

    fn strategy_deposit(&mut self, strategy: StrategyId, token: Address, amount: U256) -> RouterResult<()> {
        match strategy {
            StrategyId::Aave => self.aave.deposit(self.address, token, amount),
            StrategyId::Compound => self.compound.deposit(self.address, token, amount),
            StrategyId::None => Err(RouterError::NoActiveStrategy(token)),
        }
    }

    fn strategy_withdraw(&mut self, strategy: StrategyId, token: Address, amount: U256) -> RouterResult<U256> {
        match strategy {
            StrategyId::Aave => self.aave.withdraw(self.address, token, amount),
            StrategyId::Compound => self.compound.withdraw(self.address, token, amount),
            StrategyId::None => Err(RouterError::NoActiveStrategy(token)),
        }
    }

    fn unbook(&mut self, token: Address, strategy: StrategyId, amount: U256) {
        let remaining = self.deployed(token, strategy).saturating_sub(amount);
        if remaining.is_zero() {
            self.deployed.remove(&(token, strategy));
        } else {
            self.deployed.insert((token, strategy), remaining);
        }
    }

    /// Compensation: put pulled funds back where they came from
    fn restore(&mut self, strategy: StrategyId, token: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        if let Err(e) = self.strategy_deposit(strategy, token, amount) {
            error!(
                "❌ Could not restore {} of {:?} into {}: {}",
                amount, token, strategy, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::{AaveAdapter, CometAdapter};
    use crate::strategy::Strategy;

    const VAULT: Address = Address::repeat_byte(0x7A);
    const COORDINATOR: Address = Address::repeat_byte(0xC0);
    const USDC: Address = Address::repeat_byte(0xA0);
    const POOL: Address = Address::repeat_byte(0x87);
    const COMET: Address = Address::repeat_byte(0xC3);

    fn usdc(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000u64)
    }

    fn coordinator() -> StrategyCoordinator {
        let mut aave = Strategy::new(
            AaveAdapter::new(POOL).with_reserve(USDC, Address::repeat_byte(0x98)),
            VAULT,
            COORDINATOR,
        );
        aave.update_pool_support(VAULT, POOL, USDC, true).unwrap();
        aave.update_token_support(VAULT, USDC, true).unwrap();

        let mut compound = Strategy::new(CometAdapter::new(COMET, USDC), VAULT, COORDINATOR);
        compound.update_market_support(VAULT, COMET, USDC, true).unwrap();
        compound.update_token_support(VAULT, USDC, true).unwrap();

        let mut c = StrategyCoordinator::new(VAULT, COORDINATOR, aave, compound).unwrap();
        c.bank_mut().mint(USDC, VAULT, usdc(10_000)).unwrap();
        c
    }

    #[test]
    fn test_selection_flow() {
        let mut c = coordinator();
        assert_eq!(c.strategy_for_token(USDC), StrategyId::None);
        assert_eq!(
            c.deposit(VAULT, USDC, usdc(1)),
            Err(RouterError::NoActiveStrategy(USDC))
        );

        c.set_strategy_for_token_id(VAULT, USDC, 1).unwrap();
        assert_eq!(c.strategy_for_token(USDC), StrategyId::Aave);
        assert_eq!(
            c.set_strategy_for_token(VAULT, USDC, StrategyId::Aave),
            Err(RouterError::StrategyUnchanged)
        );
        assert_eq!(
            c.set_strategy_for_token_id(VAULT, USDC, 9),
            Err(RouterError::InvalidStrategyId(9))
        );
        assert_eq!(
            c.set_strategy_for_token(COORDINATOR, USDC, StrategyId::Compound),
            Err(RouterError::NotAuthorized)
        );

        c.set_strategy_for_token_id(VAULT, USDC, 0).unwrap();
        assert_eq!(c.strategy_for_token(USDC), StrategyId::None);
        assert_eq!(c.events().len(), 2);
    }

    #[test]
    fn test_deposit_withdraw_delegate() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Compound).unwrap();
        c.deposit(VAULT, USDC, usdc(1_000)).unwrap();

        assert_eq!(c.balance_of(USDC).unwrap(), usdc(1_000));
        assert_eq!(c.deployed(USDC, StrategyId::Compound), usdc(1_000));
        assert_eq!(c.bank().balance_of(USDC, VAULT), usdc(9_000));

        let got = c.withdraw(VAULT, USDC, usdc(400)).unwrap();
        assert_eq!(got, usdc(400));
        assert_eq!(c.deployed(USDC, StrategyId::Compound), usdc(600));
        assert_eq!(c.bank().balance_of(USDC, VAULT), usdc(9_400));
    }

    #[test]
    fn test_failed_deposit_keeps_vault_balance() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Aave).unwrap();
        c.aave_mut().adapter_mut().set_paused(true);

        assert!(c.deposit(VAULT, USDC, usdc(100)).unwrap_err().is_retryable());
        assert_eq!(c.bank().balance_of(USDC, VAULT), usdc(10_000));
        assert_eq!(c.deployed(USDC, StrategyId::Aave), U256::ZERO);
    }

    #[test]
    fn test_switching_leaves_old_strategy_untouched() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Aave).unwrap();
        c.deposit(VAULT, USDC, usdc(700)).unwrap();

        c.set_strategy_for_token(VAULT, USDC, StrategyId::Compound).unwrap();
        assert_eq!(c.strategy_balance(USDC, StrategyId::Aave), usdc(700));
        assert_eq!(c.deployed(USDC, StrategyId::Aave), usdc(700));
        assert_eq!(c.balance_of(USDC).unwrap(), U256::ZERO);

        c.deposit(VAULT, USDC, usdc(100)).unwrap();
        assert_eq!(c.strategy_balance(USDC, StrategyId::Aave), usdc(700));
        assert_eq!(c.strategy_balance(USDC, StrategyId::Compound), usdc(100));
    }

    #[test]
    fn test_emergency_withdraw_ignores_booking_mismatch() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Aave).unwrap();
        c.deposit(VAULT, USDC, usdc(1_000)).unwrap();

        // Booking says 1000; the pool reports 1100 after interest
        c.aave_mut().adapter_mut().accrue(USDC, 1_000).unwrap();
        assert_eq!(c.deployed(USDC, StrategyId::Aave), usdc(1_000));

        let recovered = c.emergency_withdraw(VAULT, USDC).unwrap();
        assert_eq!(recovered, usdc(1_100));
        assert_eq!(c.bank().balance_of(USDC, VAULT), usdc(10_100));
        assert_eq!(c.deployed(USDC, StrategyId::Aave), U256::ZERO);
        assert_eq!(c.strategy_balance(USDC, StrategyId::Aave), U256::ZERO);
        assert_eq!(
            c.events().last(),
            Some(&Event::EmergencyWithdrawal {
                token: USDC,
                strategy: StrategyId::Aave,
                recovered: usdc(1_100),
            })
        );
    }

    #[test]
    fn test_emergency_withdraw_survives_disabled_token() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Compound).unwrap();
        c.deposit(VAULT, USDC, usdc(500)).unwrap();
        c.compound_mut().update_token_support(VAULT, USDC, false).unwrap();

        assert!(c.withdraw(VAULT, USDC, usdc(1)).is_err());
        assert_eq!(c.emergency_withdraw(VAULT, USDC).unwrap(), usdc(500));
    }

    #[test]
    fn test_migrate_moves_position() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Aave).unwrap();
        c.deposit(VAULT, USDC, usdc(800)).unwrap();

        let moved = c.migrate(VAULT, USDC, StrategyId::Compound).unwrap();
        assert_eq!(moved, usdc(800));
        assert_eq!(c.strategy_for_token(USDC), StrategyId::Compound);
        assert_eq!(c.strategy_balance(USDC, StrategyId::Aave), U256::ZERO);
        assert_eq!(c.strategy_balance(USDC, StrategyId::Compound), usdc(800));
        assert_eq!(c.deployed(USDC, StrategyId::Compound), usdc(800));
        assert_eq!(c.deployed(USDC, StrategyId::Aave), U256::ZERO);
    }

    #[test]
    fn test_migrate_compensates_failed_deposit_leg() {
        let mut c = coordinator();
        c.set_strategy_for_token(VAULT, USDC, StrategyId::Aave).unwrap();
        c.deposit(VAULT, USDC, usdc(800)).unwrap();
        c.compound_mut().adapter_mut().set_paused(true);

        assert!(c.migrate(VAULT, USDC, StrategyId::Compound).is_err());
        assert_eq!(c.strategy_for_token(USDC), StrategyId::Aave);
        assert_eq!(c.strategy_balance(USDC, StrategyId::Aave), usdc(800));
        assert_eq!(c.deployed(USDC, StrategyId::Aave), usdc(800));
    }

    #[test]
    fn test_new_rejects_foreign_controller() {
        const STRANGER: Address = Address::repeat_byte(0x5E);
        let aave = Strategy::new(AaveAdapter::new(POOL), VAULT, COORDINATOR);
        let compound = Strategy::new(CometAdapter::new(COMET, USDC), VAULT, STRANGER);

        assert_eq!(
            StrategyCoordinator::new(VAULT, COORDINATOR, aave, compound).err(),
            Some(RouterError::ControllerMismatch {
                expected: COORDINATOR,
                actual: STRANGER,
            })
        );
    }

    #[test]
    fn test_two_tokens_share_one_pool() {
        const DAI: Address = Address::repeat_byte(0x6B);
        let adapter = AaveAdapter::new(POOL)
            .with_reserve(USDC, Address::repeat_byte(0x98))
            .with_reserve(DAI, Address::repeat_byte(0x99));
        let mut aave = Strategy::new(adapter, VAULT, COORDINATOR);
        for token in [USDC, DAI] {
            aave.update_pool_support(VAULT, POOL, token, true).unwrap();
            aave.update_token_support(VAULT, token, true).unwrap();
        }
        let compound = Strategy::new(CometAdapter::new(COMET, USDC), VAULT, COORDINATOR);
        let mut c = StrategyCoordinator::new(VAULT, COORDINATOR, aave, compound).unwrap();
        c.bank_mut().mint(USDC, VAULT, usdc(1_000)).unwrap();
        c.bank_mut().mint(DAI, VAULT, usdc(1_000)).unwrap();

        for token in [USDC, DAI] {
            c.set_strategy_for_token(VAULT, token, StrategyId::Aave).unwrap();
            c.deposit(VAULT, token, usdc(600)).unwrap();
        }
        assert_eq!(c.balance_of(USDC).unwrap(), usdc(600));
        assert_eq!(c.balance_of(DAI).unwrap(), usdc(600));
        assert_eq!(c.bank().balance_of(DAI, VAULT), usdc(400));
    }
}
