//! Rate feed ingestion
//!
//! The rate producers report APYs in different units:
//! - Aave subgraph `liquidityRate`: ray string, 1e27 = 100%
//! - Compound / Moonwell subgraph `rate`: percent (4.24)
//! - Morpho `rate`: fraction (0.0424)
//! - already-formatted basis points
//!
//! Everything is normalised to basis points before it reaches the registry.

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::ApyRegistry;
use crate::errors::RouterError;

/// 1e23: ray units per basis point
const RAY_PER_BPS: U256 = U256::from_limbs([200376420520689664, 5421, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateFormat {
    Bps,
    Ray,
    Percent,
    Fraction,
}

/// Subgraphs hand big numbers over as strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub pool: Address,
    pub apy: RateValue,
    pub format: RateFormat,
    #[serde(default)]
    pub source: Option<String>,
}

impl RateQuote {
    pub fn to_bps(&self) -> Result<u64> {
        match self.format {
            RateFormat::Ray => match &self.apy {
                RateValue::Text(raw) => {
                    let ray = U256::from_str_radix(raw.trim(), 10)
                        .map_err(|e| eyre!("Bad ray value {:?}: {}", raw, e))?;
                    Ok(ray_to_bps(ray))
                }
                // Only exact while the ray fits an f64; producers should send strings
                RateValue::Number(n) => scale_float(*n / 1e23),
            },
            RateFormat::Bps => scale_float(self.numeric()?),
            RateFormat::Percent => percent_to_bps(self.numeric()?),
            RateFormat::Fraction => fraction_to_bps(self.numeric()?),
        }
    }

    fn numeric(&self) -> Result<f64> {
        match &self.apy {
            RateValue::Number(n) => Ok(*n),
            RateValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| eyre!("Bad rate {:?}: {}", s, e)),
        }
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or("unknown")
    }
}

pub fn ray_to_bps(ray: U256) -> u64 {
    let bps = ray / RAY_PER_BPS;
    u64::try_from(bps).unwrap_or(u64::MAX)
}

pub fn percent_to_bps(percent: f64) -> Result<u64> {
    scale_float(percent * 100.0)
}

pub fn fraction_to_bps(fraction: f64) -> Result<u64> {
    scale_float(fraction * 10_000.0)
}

fn scale_float(value: f64) -> Result<u64> {
    if !value.is_finite() || value < 0.0 {
        return Err(eyre!("Rate out of range: {}", value));
    }
    Ok(value.round() as u64)
}

/// One batch of quotes from the rate producer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateFeed {
    pub quotes: Vec<RateQuote>,
}

impl RateFeed {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read rate feed {}: {}", path.display(), e))?;
        let feed = Self::from_json(&content)?;
        debug!("Loaded {} quotes from {}", feed.quotes.len(), path.display());
        Ok(feed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Push every quote into the registry.
///
/// An unchanged rate is a skip, not a failure; a malformed or rejected quote
/// is counted and logged and the rest of the batch still goes through.
pub fn push_rates(
    registry: &mut ApyRegistry,
    caller: Address,
    feed: &RateFeed,
    now: u64,
) -> PushSummary {
    let mut summary = PushSummary::default();

    for quote in &feed.quotes {
        let bps = match quote.to_bps() {
            Ok(bps) => bps,
            Err(e) => {
                warn!("⚠️ Skipping {} quote for {:?}: {}", quote.source(), quote.pool, e);
                summary.failed += 1;
                continue;
            }
        };
        match registry.update_apy_at(caller, quote.pool, bps, now) {
            Ok(()) => {
                info!(
                    "✅ {} APY for {:?}: {:.2}%",
                    quote.source(),
                    quote.pool,
                    bps as f64 / 100.0
                );
                summary.updated += 1;
            }
            Err(RouterError::ApyUnchanged) => {
                warn!(
                    "⚠️ {} APY for {:?} has not changed ({} bps), skipping",
                    quote.source(),
                    quote.pool,
                    bps
                );
                summary.unchanged += 1;
            }
            Err(e) => {
                warn!("❌ {} APY update for {:?} failed: {}", quote.source(), quote.pool, e);
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const AAVE_POOL: Address = Address::repeat_byte(0x87);
    const COMET: Address = Address::repeat_byte(0xC3);

    #[test]
    fn test_ray_per_bps_constant() {
        assert_eq!(RAY_PER_BPS, U256::from(10u64).pow(U256::from(23u64)));
    }

    #[test]
    fn test_conversions() {
        // 4.24% as an Aave liquidityRate
        let ray = U256::from(424u64) * RAY_PER_BPS;
        assert_eq!(ray_to_bps(ray), 424);
        assert_eq!(percent_to_bps(4.24).unwrap(), 424);
        assert_eq!(fraction_to_bps(0.0424).unwrap(), 424);
        assert!(percent_to_bps(-1.0).is_err());
        assert!(fraction_to_bps(f64::NAN).is_err());
    }

    #[test]
    fn test_feed_parsing() {
        let json = r#"[
            {"pool": "0x8787878787878787878787878787878787878787", "apy": "42400000000000000000000000", "format": "ray", "source": "aave"},
            {"pool": "0xc3c3c3c3c3c3c3c3c3c3c3c3c3c3c3c3c3c3c3c3", "apy": "5.15", "format": "percent", "source": "compound"},
            {"pool": "0x4646464646464646464646464646464646464646", "apy": 0.061, "format": "fraction"}
        ]"#;
        let feed = RateFeed::from_json(json).unwrap();
        let bps: Vec<u64> = feed.quotes.iter().map(|q| q.to_bps().unwrap()).collect();
        assert_eq!(bps, vec![424, 515, 610]);
        assert_eq!(feed.quotes[2].source(), "unknown");
    }

    #[test]
    fn test_push_treats_unchanged_as_skip() {
        let mut registry = ApyRegistry::new(OWNER);
        let feed = RateFeed {
            quotes: vec![
                RateQuote {
                    pool: AAVE_POOL,
                    apy: RateValue::Number(424.0),
                    format: RateFormat::Bps,
                    source: Some("aave".into()),
                },
                RateQuote {
                    pool: COMET,
                    apy: RateValue::Text("not a number".into()),
                    format: RateFormat::Percent,
                    source: Some("compound".into()),
                },
            ],
        };

        let first = push_rates(&mut registry, OWNER, &feed, 100);
        assert_eq!(
            first,
            PushSummary {
                updated: 1,
                unchanged: 0,
                failed: 1
            }
        );

        let second = push_rates(&mut registry, OWNER, &feed, 200);
        assert_eq!(second.unchanged, 1);
        assert_eq!(registry.get_apy(AAVE_POOL), (424, 100));
    }

    #[test]
    fn test_push_unauthorized_counts_failures() {
        let mut registry = ApyRegistry::new(OWNER);
        let feed = RateFeed {
            quotes: vec![RateQuote {
                pool: AAVE_POOL,
                apy: RateValue::Number(1.0),
                format: RateFormat::Percent,
                source: None,
            }],
        };
        let summary = push_rates(&mut registry, Address::repeat_byte(0x99), &feed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(registry.get_apy(AAVE_POOL), (0, 0));
    }
}
