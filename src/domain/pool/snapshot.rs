//! Point-in-time view of a pool's reserves

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::DexKind;
use crate::shared::errors::PoolError;

/// Highest decimals a mint may declare
pub const MAX_DECIMALS: u8 = 18;

/// Snapshots of the current poll cycle, keyed by pool address
pub type SnapshotsByPool = HashMap<Pubkey, ReserveSnapshot>;

/// Basis used by DLMM bin steps
const BIN_STEP_BASIS: f64 = 10_000.0;

/// Raw quote per base of bin `id`
pub fn bin_price(bin_step: u16, id: i32) -> f64 {
    (1.0 + bin_step as f64 / BIN_STEP_BASIS).powi(id)
}

/// Bin whose price is closest to `raw_price` (quote per base, raw units)
pub fn nearest_bin_id(bin_step: u16, raw_price: f64) -> Option<i32> {
    if bin_step == 0 || !(raw_price.is_finite() && raw_price > 0.0) {
        return None;
    }
    let id = (raw_price.ln() / (1.0 + bin_step as f64 / BIN_STEP_BASIS).ln()).round();
    (id >= i32::MIN as f64 && id <= i32::MAX as f64).then_some(id as i32)
}

/// One side of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSide {
    pub mint: Pubkey,
    pub reserve: u64,
    pub decimals: u8,
}

impl ReserveSide {
    pub fn new(mint: Pubkey, reserve: u64, decimals: u8) -> Self {
        Self {
            mint,
            reserve,
            decimals,
        }
    }
}

/// Liquidity held by a single DLMM bin, in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinLiquidity {
    pub id: i32,
    pub base_amount: u64,
    pub quote_amount: u64,
}

/// Curve-specific parameters carried alongside the reserves
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurveParams {
    /// Reserves are all the curve needs
    #[default]
    Standard,
    Stable {
        amplification: u64,
    },
    Bins {
        bin_step: u16,
        active_id: i32,
        /// Per-bin liquidity when the feed provides it, sorted by id
        bins: Vec<BinLiquidity>,
    },
}

/// Immutable reserve snapshot of one pool. A newer pull replaces it, nothing mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pool_address: Pubkey,
    dex: DexKind,
    base: ReserveSide,
    quote: ReserveSide,
    fee_rate: Decimal,
    curve: CurveParams,
    observed_at: DateTime<Utc>,
}

impl ReserveSnapshot {
    pub fn new(
        pool_address: Pubkey,
        dex: DexKind,
        base: ReserveSide,
        quote: ReserveSide,
        fee_rate: Decimal,
    ) -> Result<Self, PoolError> {
        let invalid = |reason: String| PoolError::InvalidSnapshot {
            pool: pool_address.to_string(),
            reason,
        };

        if base.decimals > MAX_DECIMALS || quote.decimals > MAX_DECIMALS {
            return Err(invalid(format!(
                "decimals {}/{} outside [0, {}]",
                base.decimals, quote.decimals, MAX_DECIMALS
            )));
        }
        if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
            return Err(invalid(format!("fee rate {} outside [0, 1)", fee_rate)));
        }
        if base.mint == quote.mint {
            return Err(invalid("base and quote mint are identical".to_string()));
        }

        Ok(Self {
            pool_address,
            dex,
            base,
            quote,
            fee_rate,
            curve: CurveParams::Standard,
            observed_at: Utc::now(),
        })
    }

    /// Attach curve parameters
    pub fn with_curve(mut self, curve: CurveParams) -> Result<Self, PoolError> {
        let reason = match &curve {
            CurveParams::Stable { amplification } if *amplification == 0 => {
                Some("stable amplification must be positive")
            }
            CurveParams::Bins { bin_step, .. } if *bin_step == 0 => Some("bin step must be positive"),
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(PoolError::InvalidSnapshot {
                pool: self.pool_address.to_string(),
                reason: reason.to_string(),
            });
        }

        self.curve = match curve {
            CurveParams::Bins {
                bin_step,
                active_id,
                mut bins,
            } => {
                bins.sort_by_key(|bin| bin.id);
                CurveParams::Bins {
                    bin_step,
                    active_id,
                    bins,
                }
            }
            other => other,
        };
        Ok(self)
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    pub fn pool_address(&self) -> Pubkey {
        self.pool_address
    }

    pub fn dex(&self) -> &DexKind {
        &self.dex
    }

    pub fn base(&self) -> &ReserveSide {
        &self.base
    }

    pub fn quote(&self) -> &ReserveSide {
        &self.quote
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    pub fn curve(&self) -> &CurveParams {
        &self.curve
    }

    pub fn observed(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn contains_mint(&self, mint: &Pubkey) -> bool {
        self.base.mint == *mint || self.quote.mint == *mint
    }

    /// Mint on the opposite side of `mint`, if `mint` belongs to this pool
    pub fn other_mint(&self, mint: &Pubkey) -> Option<Pubkey> {
        if self.base.mint == *mint {
            Some(self.quote.mint)
        } else if self.quote.mint == *mint {
            Some(self.base.mint)
        } else {
            None
        }
    }

    /// Side holding `mint`
    pub fn side(&self, mint: &Pubkey) -> Option<&ReserveSide> {
        if self.base.mint == *mint {
            Some(&self.base)
        } else if self.quote.mint == *mint {
            Some(&self.quote)
        } else {
            None
        }
    }
}
