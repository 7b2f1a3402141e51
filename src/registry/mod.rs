//! APY registry
//!
//! Passive key-value store of the latest lending rate per pool, written by
//! the owner or whitelisted rate pushers. Rates are stored in basis points
//! (4.24% = 424) together with the time they were recorded.

pub mod rates;
pub mod routing;

pub use rates::{push_rates, PushSummary, RateFeed, RateFormat, RateQuote, RateValue};
pub use routing::RoutingPolicy;

use alloy_primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::access::AccessPolicy;
use crate::errors::{RouterError, RouterResult};
use crate::events::{Event, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApyRecord {
    /// Basis points
    pub apy: u64,
    /// Unix seconds
    pub timestamp: u64,
}

pub struct ApyRegistry {
    access: AccessPolicy,
    apys: HashMap<Address, ApyRecord>,
    events: EventLog,
}

impl ApyRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            access: AccessPolicy::new(owner),
            apys: HashMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn update_apy(&mut self, caller: Address, pool: Address, apy: u64) -> RouterResult<()> {
        let now = Utc::now().timestamp().max(1) as u64;
        self.update_apy_at(caller, pool, apy, now)
    }

    /// `update_apy` with an explicit record time
    pub fn update_apy_at(
        &mut self,
        caller: Address,
        pool: Address,
        apy: u64,
        timestamp: u64,
    ) -> RouterResult<()> {
        self.access.require_authorized(caller)?;
        if self.apys.get(&pool).map(|r| r.apy) == Some(apy) {
            return Err(RouterError::ApyUnchanged);
        }
        self.apys.insert(pool, ApyRecord { apy, timestamp });
        info!("📊 APY for {:?} = {} bps", pool, apy);
        self.events.emit(Event::ApyUpdated {
            pool,
            apy,
            timestamp,
        });
        Ok(())
    }

    /// `(apy, timestamp)`; `(0, 0)` for a pool never written
    pub fn get_apy(&self, pool: Address) -> (u64, u64) {
        self.apys
            .get(&pool)
            .map(|r| (r.apy, r.timestamp))
            .unwrap_or((0, 0))
    }

    pub fn record(&self, pool: Address) -> Option<ApyRecord> {
        self.apys.get(&pool).copied()
    }

    pub fn whitelist_account(&mut self, caller: Address, account: Address) -> RouterResult<()> {
        let event = self.access.update_whitelist(caller, account, true)?;
        self.events.emit(event);
        Ok(())
    }

    pub fn remove_from_whitelist(&mut self, caller: Address, account: Address) -> RouterResult<()> {
        let event = self.access.update_whitelist(caller, account, false)?;
        self.events.emit(event);
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> RouterResult<()> {
        let event = self.access.transfer_ownership(caller, new_owner)?;
        self.events.emit(event);
        Ok(())
    }

    /// Highest-rate pool among `candidates` that has a record
    pub fn best_pool(&self, candidates: &[Address]) -> Option<(Address, ApyRecord)> {
        candidates
            .iter()
            .filter_map(|pool| self.record(*pool).map(|r| (*pool, r)))
            .max_by_key(|(_, r)| r.apy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const PUSHER: Address = Address::repeat_byte(0x02);
    const AAVE_POOL: Address = Address::repeat_byte(0x87);
    const COMET: Address = Address::repeat_byte(0xC3);

    #[test]
    fn test_rejects_unless_owner_or_whitelisted() {
        let mut registry = ApyRegistry::new(OWNER);
        assert_eq!(
            registry.update_apy(PUSHER, AAVE_POOL, 10),
            Err(RouterError::NotAuthorized)
        );

        registry.whitelist_account(OWNER, PUSHER).unwrap();
        registry.update_apy(PUSHER, AAVE_POOL, 10).unwrap();
        assert_eq!(registry.get_apy(AAVE_POOL).0, 10);

        registry.remove_from_whitelist(OWNER, PUSHER).unwrap();
        assert_eq!(
            registry.update_apy(PUSHER, AAVE_POOL, 11),
            Err(RouterError::NotAuthorized)
        );
    }

    #[test]
    fn test_stores_value_and_timestamp() {
        let mut registry = ApyRegistry::new(OWNER);
        assert_eq!(registry.get_apy(AAVE_POOL), (0, 0));

        registry.update_apy(OWNER, AAVE_POOL, 600).unwrap();
        let (apy, timestamp) = registry.get_apy(AAVE_POOL);
        assert_eq!(apy, 600);
        assert!(timestamp > 0);
    }

    #[test]
    fn test_unchanged_value_rejected_without_event() {
        let mut registry = ApyRegistry::new(OWNER);
        registry.update_apy_at(OWNER, AAVE_POOL, 424, 1_700_000_000).unwrap();
        assert_eq!(
            registry.update_apy_at(OWNER, AAVE_POOL, 424, 1_700_000_100),
            Err(RouterError::ApyUnchanged)
        );
        assert_eq!(registry.get_apy(AAVE_POOL), (424, 1_700_000_000));
        assert_eq!(registry.events().len(), 1);
        assert_eq!(
            registry.events().last(),
            Some(&Event::ApyUpdated {
                pool: AAVE_POOL,
                apy: 424,
                timestamp: 1_700_000_000,
            })
        );
    }

    #[test]
    fn test_best_pool() {
        let mut registry = ApyRegistry::new(OWNER);
        assert_eq!(registry.best_pool(&[AAVE_POOL, COMET]), None);

        registry.update_apy_at(OWNER, AAVE_POOL, 424, 1).unwrap();
        registry.update_apy_at(OWNER, COMET, 515, 1).unwrap();
        let (pool, record) = registry.best_pool(&[AAVE_POOL, COMET]).unwrap();
        assert_eq!(pool, COMET);
        assert_eq!(record.apy, 515);
    }
}
