//! Token balances outside the ledger
//!
//! Models the ERC-20 side of custody: wallets hold balances per token, the
//! ledger pulls deposits from them and pays withdrawals back. A failed
//! transfer leaves both sides untouched.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;

use crate::errors::{RouterError, RouterResult};

#[derive(Debug, Clone, Default)]
pub struct TokenBank {
    /// (token, holder) -> balance
    balances: HashMap<(Address, Address), U256>,
}

impl TokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    /// Credit `holder` out of thin air (faucet / whale funding)
    pub fn mint(&mut self, token: Address, holder: Address, amount: U256) -> RouterResult<()> {
        let balance = crate::errors::add(self.balance_of(token, holder), amount)?;
        self.balances.insert((token, holder), balance);
        Ok(())
    }

    /// Remove value from `holder` (it leaves for an external market)
    pub fn debit(&mut self, token: Address, holder: Address, amount: U256) -> RouterResult<()> {
        let available = self.balance_of(token, holder);
        if available < amount {
            return Err(RouterError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.balances.insert((token, holder), available - amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> RouterResult<()> {
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(RouterError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        let credited = crate::errors::add(self.balance_of(token, to), amount)?;
        if from != to {
            self.balances.insert((token, from), available - amount);
            self.balances.insert((token, to), credited);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: Address = Address::repeat_byte(0xA0);
    const WHALE: Address = Address::repeat_byte(0xAD);
    const VAULT: Address = Address::repeat_byte(0x7A);

    #[test]
    fn test_transfer_moves_balance() {
        let mut bank = TokenBank::new();
        bank.mint(USDC, WHALE, U256::from(1_000u64)).unwrap();
        bank.transfer(USDC, WHALE, VAULT, U256::from(400u64)).unwrap();

        assert_eq!(bank.balance_of(USDC, WHALE), U256::from(600u64));
        assert_eq!(bank.balance_of(USDC, VAULT), U256::from(400u64));
    }

    #[test]
    fn test_failed_transfer_changes_nothing() {
        let mut bank = TokenBank::new();
        bank.mint(USDC, WHALE, U256::from(10u64)).unwrap();

        let err = bank.transfer(USDC, WHALE, VAULT, U256::from(11u64)).unwrap_err();
        assert_eq!(
            err,
            RouterError::InsufficientBalance {
                needed: U256::from(11u64),
                available: U256::from(10u64),
            }
        );
        assert_eq!(bank.balance_of(USDC, WHALE), U256::from(10u64));
        assert_eq!(bank.balance_of(USDC, VAULT), U256::ZERO);
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let mut bank = TokenBank::new();
        bank.mint(USDC, WHALE, U256::from(10u64)).unwrap();
        bank.transfer(USDC, WHALE, WHALE, U256::from(10u64)).unwrap();
        assert_eq!(bank.balance_of(USDC, WHALE), U256::from(10u64));
    }

    #[test]
    fn test_debit() {
        let mut bank = TokenBank::new();
        bank.mint(USDC, VAULT, U256::from(10u64)).unwrap();
        bank.debit(USDC, VAULT, U256::from(4u64)).unwrap();
        assert_eq!(bank.balance_of(USDC, VAULT), U256::from(6u64));
        assert!(bank.debit(USDC, VAULT, U256::from(7u64)).is_err());
    }
}
