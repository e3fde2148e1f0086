//! Two-hop routes - token0 -> token1 (intermediate) -> token2 across two pools

mod aggregator;
mod spread;

pub use aggregator::{dedup_routes, EnabledRoutes, RouteAggregator};
pub use spread::{RouteQuote, RouteSpread, SpreadDirection};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::domain::pool::{DexKind, PoolRecord, ReserveSnapshot, SnapshotsByPool};
use crate::domain::pricing::{implied_price, SwapDirection};
use crate::shared::errors::{PricingError, RouteError, StatusParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Enabled,
    Disabled,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Enabled => "enabled",
            RouteStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enabled" => Ok(RouteStatus::Enabled),
            "disabled" => Ok(RouteStatus::Disabled),
            other => Err(StatusParseError {
                kind: "route",
                value: other.to_string(),
            }),
        }
    }
}

/// Pool fields duplicated onto the route row at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolLeg {
    pub address: Pubkey,
    pub dex: DexKind,
    pub fee_rate: Decimal,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub base_reserve: u64,
    pub quote_reserve: u64,
}

impl PoolLeg {
    /// Leg with no observed reserves yet, filled in by the first poll cycle
    pub fn from_record(pool: &PoolRecord) -> Self {
        Self {
            address: pool.address,
            dex: pool.dex.clone(),
            fee_rate: pool.fee_rate,
            base_mint: pool.base_mint,
            quote_mint: pool.quote_mint,
            base_decimals: pool.base_decimals,
            quote_decimals: pool.quote_decimals,
            base_reserve: 0,
            quote_reserve: 0,
        }
    }

    pub fn from_snapshot(snapshot: &ReserveSnapshot) -> Self {
        Self {
            address: snapshot.pool_address(),
            dex: snapshot.dex().clone(),
            fee_rate: snapshot.fee_rate(),
            base_mint: snapshot.base().mint,
            quote_mint: snapshot.quote().mint,
            base_decimals: snapshot.base().decimals,
            quote_decimals: snapshot.quote().decimals,
            base_reserve: snapshot.base().reserve,
            quote_reserve: snapshot.quote().reserve,
        }
    }
}

/// Route row as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: i64,
    pub pool_a: PoolLeg,
    pub pool_b: PoolLeg,
    pub token0: Pubkey,
    /// Intermediate token, the join key between the two pools
    pub token1: Pubkey,
    pub token2: Pubkey,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RouteRecord {
    pub fn is_enabled(&self) -> bool {
        self.status == RouteStatus::Enabled
    }

    /// Unordered pool pair, two routes over the same pools share it
    pub fn pool_pair(&self) -> (Pubkey, Pubkey) {
        let (a, b) = (self.pool_a.address, self.pool_b.address);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Route to be inserted by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoute {
    pub pool_a: PoolLeg,
    pub pool_b: PoolLeg,
    pub token0: Pubkey,
    pub token1: Pubkey,
    pub token2: Pubkey,
    pub status: RouteStatus,
}

/// Enabled route joined against the current poll cycle's snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct TwoHopRoute {
    /// Stored row with both legs refreshed from the snapshots
    pub record: RouteRecord,
    pub snapshot_a: ReserveSnapshot,
    pub snapshot_b: ReserveSnapshot,
}

impl TwoHopRoute {
    /// Join a stored route with the snapshots of its two pools
    pub fn assemble(mut record: RouteRecord, snapshots: &SnapshotsByPool) -> Result<Self, RouteError> {
        let route_id = record.id;
        let lookup = |address: &Pubkey| {
            snapshots
                .get(address)
                .cloned()
                .ok_or_else(|| RouteError::RouteDataMissing {
                    route_id,
                    pool: address.to_string(),
                })
        };
        let snapshot_a = lookup(&record.pool_a.address)?;
        let snapshot_b = lookup(&record.pool_b.address)?;

        let invalid = |reason: String| RouteError::InvalidRoute { route_id, reason };
        if record.pool_a.address == record.pool_b.address {
            return Err(invalid("both hops use the same pool".to_string()));
        }
        if record.token0 == record.token1 {
            return Err(invalid("first hop swaps a token for itself".to_string()));
        }
        if !snapshot_a.contains_mint(&record.token0) || !snapshot_a.contains_mint(&record.token1) {
            return Err(invalid(format!(
                "pool A {} does not pair {} with {}",
                snapshot_a.pool_address(),
                record.token0,
                record.token1
            )));
        }
        if snapshot_b.other_mint(&record.token1) != Some(record.token2) {
            return Err(invalid(format!(
                "pool B {} does not pair {} with {}",
                snapshot_b.pool_address(),
                record.token1,
                record.token2
            )));
        }

        record.pool_a = PoolLeg::from_snapshot(&snapshot_a);
        record.pool_b = PoolLeg::from_snapshot(&snapshot_b);

        Ok(Self {
            record,
            snapshot_a,
            snapshot_b,
        })
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn is_round_trip(&self) -> bool {
        self.record.token0 == self.record.token2
    }

    /// Implied price of pool A, quote per base
    pub fn price_a(&self) -> Result<f64, PricingError> {
        implied_price(&self.snapshot_a)
    }

    /// Implied price of pool B, quote per base
    pub fn price_b(&self) -> Result<f64, PricingError> {
        implied_price(&self.snapshot_b)
    }

    /// Fee-free rate of token1 per token0 through pool A, UI units
    fn rate_a(&self, price_a: f64) -> f64 {
        match SwapDirection::for_input(&self.snapshot_a, &self.record.token0) {
            Some(SwapDirection::BaseToQuote) => price_a,
            _ => 1.0 / price_a,
        }
    }

    /// Fee-free rate of token2 per token1 through pool B, UI units
    fn rate_b(&self, price_b: f64) -> f64 {
        match SwapDirection::for_input(&self.snapshot_b, &self.record.token1) {
            Some(SwapDirection::BaseToQuote) => price_b,
            _ => 1.0 / price_b,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::pool::ReserveSide;
    use rust_decimal_macros::dec;

    /// Constant-product SOL/USDC pool priced at `usdc_per_sol`
    pub fn sol_usdc_pool(sol: Pubkey, usdc: Pubkey, usdc_per_sol: u64) -> ReserveSnapshot {
        ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(sol, 1_000 * 1_000_000_000, 9),
            ReserveSide::new(usdc, 1_000 * usdc_per_sol * 1_000_000, 6),
            dec!(0.0025),
        )
        .unwrap()
    }

    pub fn record(id: i64, a: &ReserveSnapshot, b: &ReserveSnapshot, token0: Pubkey, token1: Pubkey) -> RouteRecord {
        RouteRecord {
            id,
            pool_a: PoolLeg::from_snapshot(a),
            pool_b: PoolLeg::from_snapshot(b),
            token0,
            token1,
            token2: token0,
            status: RouteStatus::Enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
