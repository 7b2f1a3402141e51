//! Rate-driven strategy selection
//!
//! Picks the strategy whose market carries the best fresh APY and points the
//! coordinator at it, but only when the gain clears a minimum delta so the
//! selection does not flap between markets quoting nearly the same rate.

use alloy_primitives::Address;
use tracing::{debug, info};

use super::{ApyRecord, ApyRegistry};
use crate::errors::RouterResult;
use crate::strategy::{StrategyCoordinator, StrategyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Minimum improvement, in bps, before switching
    pub min_apy_delta_bps: u64,
    /// Older records are ignored
    pub max_rate_age_secs: u64,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            min_apy_delta_bps: 25,
            max_rate_age_secs: 3_600,
        }
    }
}

impl RoutingPolicy {
    fn fresh(&self, registry: &ApyRegistry, pool: Address, now: u64) -> Option<ApyRecord> {
        registry
            .record(pool)
            .filter(|r| now.saturating_sub(r.timestamp) <= self.max_rate_age_secs)
    }

    /// Strategy to switch to, if any.
    ///
    /// `candidates` pairs each strategy with the pool its rate is quoted for.
    pub fn select(
        &self,
        registry: &ApyRegistry,
        candidates: &[(StrategyId, Address)],
        current: StrategyId,
        now: u64,
    ) -> Option<StrategyId> {
        let (best, best_rate) = candidates
            .iter()
            .filter_map(|(id, pool)| self.fresh(registry, *pool, now).map(|r| (*id, r)))
            .max_by_key(|(_, r)| r.apy)?;
        if best == current {
            return None;
        }

        let current_apy = candidates
            .iter()
            .find(|(id, _)| *id == current)
            .and_then(|(_, pool)| self.fresh(registry, *pool, now))
            .map(|r| r.apy);
        match current_apy {
            Some(apy) if best_rate.apy < apy.saturating_add(self.min_apy_delta_bps) => {
                debug!(
                    "Keeping {}: {} bps vs {} bps is below the {} bps threshold",
                    current, apy, best_rate.apy, self.min_apy_delta_bps
                );
                None
            }
            _ => Some(best),
        }
    }

    /// Apply `select` to the coordinator for `token`.
    ///
    /// With `migrate` the deployed position follows the selection; otherwise
    /// only new deposits are rerouted.
    pub fn apply(
        &self,
        registry: &ApyRegistry,
        coordinator: &mut StrategyCoordinator,
        caller: Address,
        token: Address,
        candidates: &[(StrategyId, Address)],
        now: u64,
        migrate: bool,
    ) -> RouterResult<Option<StrategyId>> {
        let current = coordinator.strategy_for_token(token);
        let Some(target) = self.select(registry, candidates, current, now) else {
            return Ok(None);
        };

        if migrate && current != StrategyId::None {
            let moved = coordinator.migrate(caller, token, target)?;
            info!("🔀 Rerouted {:?} to {} moving {}", token, target, moved);
        } else {
            coordinator.set_strategy_for_token(caller, token, target)?;
            info!("🧭 Rerouted new deposits of {:?} to {}", token, target);
        }
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::{AaveAdapter, CometAdapter};
    use crate::strategy::Strategy;
    use alloy_primitives::U256;

    const OWNER: Address = Address::repeat_byte(0x01);
    const COORDINATOR: Address = Address::repeat_byte(0xC0);
    const USDC: Address = Address::repeat_byte(0xA0);
    const POOL: Address = Address::repeat_byte(0x87);
    const COMET: Address = Address::repeat_byte(0xC3);

    const CANDIDATES: [(StrategyId, Address); 2] =
        [(StrategyId::Aave, POOL), (StrategyId::Compound, COMET)];

    fn registry(aave: u64, comet: u64, at: u64) -> ApyRegistry {
        let mut r = ApyRegistry::new(OWNER);
        r.update_apy_at(OWNER, POOL, aave, at).unwrap();
        r.update_apy_at(OWNER, COMET, comet, at).unwrap();
        r
    }

    fn coordinator() -> StrategyCoordinator {
        let mut aave = Strategy::new(
            AaveAdapter::new(POOL).with_reserve(USDC, Address::repeat_byte(0x98)),
            OWNER,
            COORDINATOR,
        );
        aave.update_pool_support(OWNER, POOL, USDC, true).unwrap();
        aave.update_token_support(OWNER, USDC, true).unwrap();
        let mut compound = Strategy::new(CometAdapter::new(COMET, USDC), OWNER, COORDINATOR);
        compound.update_market_support(OWNER, COMET, USDC, true).unwrap();
        compound.update_token_support(OWNER, USDC, true).unwrap();
        StrategyCoordinator::new(OWNER, COORDINATOR, aave, compound).unwrap()
    }

    #[test]
    fn test_select_from_nothing() {
        let policy = RoutingPolicy::default();
        let r = registry(424, 515, 1_000);
        assert_eq!(
            policy.select(&r, &CANDIDATES, StrategyId::None, 1_000),
            Some(StrategyId::Compound)
        );
        assert_eq!(policy.select(&r, &CANDIDATES, StrategyId::Compound, 1_000), None);
    }

    #[test]
    fn test_small_gain_does_not_switch() {
        let policy = RoutingPolicy {
            min_apy_delta_bps: 50,
            max_rate_age_secs: 3_600,
        };
        let r = registry(500, 530, 1_000);
        assert_eq!(policy.select(&r, &CANDIDATES, StrategyId::Aave, 1_000), None);

        let r = registry(500, 550, 1_000);
        assert_eq!(
            policy.select(&r, &CANDIDATES, StrategyId::Aave, 1_000),
            Some(StrategyId::Compound)
        );
    }

    #[test]
    fn test_stale_rates_ignored() {
        let policy = RoutingPolicy::default();
        let mut r = registry(424, 900, 1_000);
        r.update_apy_at(OWNER, POOL, 430, 10_000).unwrap();

        // Comet's 900 bps was recorded 9000s ago
        assert_eq!(
            policy.select(&r, &CANDIDATES, StrategyId::None, 10_000),
            Some(StrategyId::Aave)
        );
    }

    #[test]
    fn test_apply_with_migration() {
        let policy = RoutingPolicy::default();
        let mut c = coordinator();
        c.bank_mut().mint(USDC, OWNER, U256::from(1_000u64)).unwrap();

        let r = registry(600, 400, 50);
        assert_eq!(
            policy.apply(&r, &mut c, OWNER, USDC, &CANDIDATES, 50, true).unwrap(),
            Some(StrategyId::Aave)
        );
        c.deposit(OWNER, USDC, U256::from(1_000u64)).unwrap();

        let r = registry(600, 700, 60);
        assert_eq!(
            policy.apply(&r, &mut c, OWNER, USDC, &CANDIDATES, 60, true).unwrap(),
            Some(StrategyId::Compound)
        );
        assert_eq!(c.strategy_balance(USDC, StrategyId::Compound), U256::from(1_000u64));
        assert_eq!(c.strategy_balance(USDC, StrategyId::Aave), U256::ZERO);
    }
}
