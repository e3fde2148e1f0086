//! Pool domain - DEX identifiers and reserve snapshots

mod record;
mod snapshot;

pub use record::PoolRecord;
pub use snapshot::{
    bin_price, nearest_bin_id, BinLiquidity, CurveParams, ReserveSide, ReserveSnapshot, SnapshotsByPool,
    MAX_DECIMALS,
};

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee fraction from basis points (25 -> 0.0025)
pub fn fee_from_bps(bps: u32) -> Decimal {
    Decimal::from(bps) / Decimal::from(10_000)
}

/// Fee fraction from a percentage (0.25 -> 0.0025). Meteora reports fees this way.
pub fn fee_from_percent(percent: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED
}

/// DEX a pool belongs to. The identifier selects the pricing curve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexKind {
    /// Raydium AMM v4, constant product
    RaydiumAmm,
    /// Raydium stable pools, StableSwap invariant
    RaydiumStable,
    /// Meteora DLMM, discrete bins with a fixed bin step
    MeteoraDlmm,
    /// Anything the store knows about but we have no curve for
    Other(String),
}

impl DexKind {
    pub fn as_str(&self) -> &str {
        match self {
            DexKind::RaydiumAmm => "raydium",
            DexKind::RaydiumStable => "raydium_stable",
            DexKind::MeteoraDlmm => "meteora",
            DexKind::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DexKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "raydium" | "raydium_v4" | "raydium_amm" => DexKind::RaydiumAmm,
            "raydium_stable" | "stable" => DexKind::RaydiumStable,
            "meteora" | "meteora_dlmm" | "dlmm" => DexKind::MeteoraDlmm,
            other => DexKind::Other(other.to_string()),
        })
    }
}

impl From<&str> for DexKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}
