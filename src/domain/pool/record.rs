//! Static pool metadata as stored, the input to every reserve pull

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::{nearest_bin_id, CurveParams, DexKind, ReserveSide, ReserveSnapshot};
use crate::shared::errors::PoolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub address: Pubkey,
    pub dex: DexKind,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    /// Token accounts holding the reserves
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub fee_rate: Decimal,
    pub amplification: Option<u64>,
    pub bin_step: Option<u16>,
    pub active_bin_id: Option<i32>,
}

impl PoolRecord {
    /// Curve parameters implied by the optional columns. `active_bin_id` is the seeded value.
    pub fn curve_params(&self) -> CurveParams {
        match (self.bin_step, self.active_bin_id, self.amplification) {
            (Some(bin_step), Some(active_id), _) => CurveParams::Bins {
                bin_step,
                active_id,
                bins: Vec::new(),
            },
            (_, _, Some(amplification)) => CurveParams::Stable { amplification },
            _ => CurveParams::Standard,
        }
    }

    /// Curve parameters for live vault balances. Bin pools read without per-bin data get the
    /// active bin implied by the reserve ratio; the seeded id only stands in for an empty side.
    pub fn live_curve_params(&self, base_reserve: u64, quote_reserve: u64) -> CurveParams {
        match self.curve_params() {
            CurveParams::Bins {
                bin_step,
                active_id,
                bins,
            } => {
                let raw_price = quote_reserve as f64 / base_reserve as f64;
                CurveParams::Bins {
                    bin_step,
                    active_id: nearest_bin_id(bin_step, raw_price).unwrap_or(active_id),
                    bins,
                }
            }
            other => other,
        }
    }

    /// Build a snapshot from freshly read vault balances
    pub fn snapshot(
        &self,
        base_reserve: u64,
        quote_reserve: u64,
        at: DateTime<Utc>,
    ) -> Result<ReserveSnapshot, PoolError> {
        let snapshot = ReserveSnapshot::new(
            self.address,
            self.dex.clone(),
            ReserveSide::new(self.base_mint, base_reserve, self.base_decimals),
            ReserveSide::new(self.quote_mint, quote_reserve, self.quote_decimals),
            self.fee_rate,
        )?
        .with_curve(self.live_curve_params(base_reserve, quote_reserve))?;
        Ok(snapshot.observed_at(at))
    }
}
