//! Owner / whitelist access policy
//!
//! A single owner plus an optional whitelist of accounts allowed to perform
//! privileged updates (APY pushes) without being the owner. Held by value in
//! every component; no ambient authority.

use alloy_primitives::Address;
use std::collections::HashSet;
use tracing::info;

use crate::errors::{RouterError, RouterResult};
use crate::events::Event;

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    owner: Address,
    whitelist: HashSet<Address>,
}

impl AccessPolicy {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            whitelist: HashSet::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, account: Address) -> bool {
        account == self.owner
    }

    pub fn is_whitelisted(&self, account: Address) -> bool {
        self.whitelist.contains(&account)
    }

    /// Owner or whitelisted
    pub fn is_authorized(&self, account: Address) -> bool {
        self.is_owner(account) || self.is_whitelisted(account)
    }

    pub fn require_owner(&self, caller: Address) -> RouterResult<()> {
        if !self.is_owner(caller) {
            return Err(RouterError::NotAuthorized);
        }
        Ok(())
    }

    pub fn require_authorized(&self, caller: Address) -> RouterResult<()> {
        if !self.is_authorized(caller) {
            return Err(RouterError::NotAuthorized);
        }
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> RouterResult<Event> {
        self.require_owner(caller)?;
        if new_owner == Address::ZERO {
            return Err(RouterError::InvalidOwner(new_owner));
        }
        let previous_owner = self.owner;
        self.owner = new_owner;
        info!("🔑 Ownership {:?} -> {:?}", previous_owner, new_owner);
        Ok(Event::OwnershipTransferred {
            previous_owner,
            new_owner,
        })
    }

    /// Add or remove `account`; rejects a no-op
    pub fn update_whitelist(
        &mut self,
        caller: Address,
        account: Address,
        whitelisted: bool,
    ) -> RouterResult<Event> {
        self.require_owner(caller)?;
        if self.is_whitelisted(account) == whitelisted {
            return Err(RouterError::WhitelistUnchanged);
        }
        if whitelisted {
            self.whitelist.insert(account);
        } else {
            self.whitelist.remove(&account);
        }
        Ok(Event::AccountWhitelisted {
            account,
            whitelisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const ALICE: Address = Address::repeat_byte(0x0A);

    #[test]
    fn test_owner_predicates() {
        let policy = AccessPolicy::new(OWNER);
        assert!(policy.is_owner(OWNER));
        assert!(policy.is_authorized(OWNER));
        assert!(!policy.is_authorized(ALICE));
        assert_eq!(policy.require_owner(ALICE), Err(RouterError::NotAuthorized));
    }

    #[test]
    fn test_whitelist_grants_authorization_not_ownership() {
        let mut policy = AccessPolicy::new(OWNER);
        policy.update_whitelist(OWNER, ALICE, true).unwrap();
        assert!(policy.is_authorized(ALICE));
        assert!(!policy.is_owner(ALICE));

        assert_eq!(
            policy.update_whitelist(OWNER, ALICE, true),
            Err(RouterError::WhitelistUnchanged)
        );
        assert_eq!(
            policy.update_whitelist(ALICE, ALICE, false),
            Err(RouterError::NotAuthorized)
        );
    }

    #[test]
    fn test_transfer_ownership() {
        let mut policy = AccessPolicy::new(OWNER);
        assert_eq!(
            policy.transfer_ownership(OWNER, Address::ZERO),
            Err(RouterError::InvalidOwner(Address::ZERO))
        );

        let event = policy.transfer_ownership(OWNER, ALICE).unwrap();
        assert_eq!(
            event,
            Event::OwnershipTransferred {
                previous_owner: OWNER,
                new_owner: ALICE,
            }
        );
        assert!(policy.is_owner(ALICE));
        assert_eq!(policy.require_owner(OWNER), Err(RouterError::NotAuthorized));
    }
}
