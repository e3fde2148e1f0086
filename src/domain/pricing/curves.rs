//! Pricing curves, one per DEX family

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::SwapDirection;
use crate::domain::pool::{bin_price, BinLiquidity, CurveParams, DexKind, ReserveSnapshot};
use crate::shared::errors::PricingError;
use crate::shared::utils::scale_amount;

/// Fee precision used by integer curve math (parts per million)
const FEE_SCALE: u128 = 1_000_000;

/// Amplification assumed for stable pools that did not report one
pub const DEFAULT_AMPLIFICATION: u64 = 100;

const NEWTON_ITERATIONS: usize = 255;

/// Common contract every curve implements
pub trait SwapCurve: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expected output in base units of the output token, before slippage
    fn compute_output(
        &self,
        snapshot: &ReserveSnapshot,
        amount_in: u64,
        direction: SwapDirection,
    ) -> Result<u64, PricingError>;

    /// Quote per base in UI units
    fn spot_price(&self, snapshot: &ReserveSnapshot) -> Option<f64> {
        reserve_ratio_price(snapshot)
    }
}

static CONSTANT_PRODUCT: ConstantProduct = ConstantProduct;
static STABLE_SWAP: StableSwap = StableSwap;
static BIN_STEP: BinStep = BinStep;

/// Select the curve for a DEX identifier
pub fn curve_for(dex: &DexKind) -> Result<&'static dyn SwapCurve, PricingError> {
    match dex {
        DexKind::RaydiumAmm => Ok(&CONSTANT_PRODUCT),
        DexKind::RaydiumStable => Ok(&STABLE_SWAP),
        DexKind::MeteoraDlmm => Ok(&BIN_STEP),
        DexKind::Other(name) => Err(PricingError::UnsupportedCurve(name.clone())),
    }
}

fn reserve_ratio_price(snapshot: &ReserveSnapshot) -> Option<f64> {
    let base = scale_amount(snapshot.base().reserve, snapshot.base().decimals);
    let quote = scale_amount(snapshot.quote().reserve, snapshot.quote().decimals);
    if base <= 0.0 || quote <= 0.0 {
        return None;
    }
    Some(quote / base)
}

/// (reserve_in, reserve_out, decimals_in, decimals_out) for a direction
fn oriented(snapshot: &ReserveSnapshot, direction: SwapDirection) -> (u64, u64, u8, u8) {
    let (input, output) = match direction {
        SwapDirection::BaseToQuote => (snapshot.base(), snapshot.quote()),
        SwapDirection::QuoteToBase => (snapshot.quote(), snapshot.base()),
    };
    (input.reserve, output.reserve, input.decimals, output.decimals)
}

fn insufficient(snapshot: &ReserveSnapshot) -> PricingError {
    PricingError::InsufficientReserve(snapshot.pool_address().to_string())
}

fn fee_ppm(fee: Decimal) -> u128 {
    (fee * Decimal::from(FEE_SCALE as u64))
        .round()
        .to_u128()
        .unwrap_or(0)
        .min(FEE_SCALE)
}

fn fee_fraction(fee: Decimal) -> f64 {
    fee.to_f64().unwrap_or(0.0)
}

/// x * y = k with the fee taken from the input
#[derive(Debug, Clone, Copy)]
pub struct ConstantProduct;

impl SwapCurve for ConstantProduct {
    fn name(&self) -> &'static str {
        "constant_product"
    }

    fn compute_output(
        &self,
        snapshot: &ReserveSnapshot,
        amount_in: u64,
        direction: SwapDirection,
    ) -> Result<u64, PricingError> {
        let (reserve_in, reserve_out, _, _) = oriented(snapshot, direction);
        if reserve_in == 0 || reserve_out == 0 {
            return Err(insufficient(snapshot));
        }
        reserve_in.checked_add(amount_in).ok_or_else(|| insufficient(snapshot))?;

        let in_after_fee = amount_in as u128 * (FEE_SCALE - fee_ppm(snapshot.fee_rate())) / FEE_SCALE;
        let amount_out = in_after_fee * reserve_out as u128 / (reserve_in as u128 + in_after_fee);

        // Always below reserve_out because in_after_fee / (reserve_in + in_after_fee) < 1
        Ok(amount_out as u64)
    }
}

/// Two-coin StableSwap invariant on decimal-normalised balances
#[derive(Debug, Clone, Copy)]
pub struct StableSwap;

impl StableSwap {
    fn amplification(snapshot: &ReserveSnapshot) -> f64 {
        match snapshot.curve() {
            CurveParams::Stable { amplification } => *amplification as f64,
            _ => DEFAULT_AMPLIFICATION as f64,
        }
    }

    fn invariant(x: f64, y: f64, ann: f64) -> Option<f64> {
        let sum = x + y;
        let mut d = sum;
        for _ in 0..NEWTON_ITERATIONS {
            let d_p = d * d / (2.0 * x) * d / (2.0 * y);
            let previous = d;
            d = (ann * sum + 2.0 * d_p) * d / ((ann - 1.0) * d + 3.0 * d_p);
            if (d - previous).abs() <= d * 1e-15 {
                return Some(d);
            }
        }
        d.is_finite().then_some(d)
    }

    fn balance_out(x_new: f64, d: f64, ann: f64) -> Option<f64> {
        let c = d * d / (2.0 * x_new) * d / (2.0 * ann);
        let b = x_new + d / ann;
        let mut y = d;
        for _ in 0..NEWTON_ITERATIONS {
            let previous = y;
            y = (y * y + c) / (2.0 * y + b - d);
            if (y - previous).abs() <= y * 1e-15 {
                return Some(y);
            }
        }
        y.is_finite().then_some(y)
    }
}

impl SwapCurve for StableSwap {
    fn name(&self) -> &'static str {
        "stable_swap"
    }

    fn compute_output(
        &self,
        snapshot: &ReserveSnapshot,
        amount_in: u64,
        direction: SwapDirection,
    ) -> Result<u64, PricingError> {
        let (reserve_in, reserve_out, decimals_in, decimals_out) = oriented(snapshot, direction);
        if reserve_in == 0 || reserve_out == 0 {
            return Err(insufficient(snapshot));
        }
        reserve_in.checked_add(amount_in).ok_or_else(|| insufficient(snapshot))?;

        let x = scale_amount(reserve_in, decimals_in);
        let y = scale_amount(reserve_out, decimals_out);
        let dx = scale_amount(amount_in, decimals_in) * (1.0 - fee_fraction(snapshot.fee_rate()));
        let ann = Self::amplification(snapshot) * 4.0;

        let d = Self::invariant(x, y, ann).ok_or_else(|| insufficient(snapshot))?;
        let y_new = Self::balance_out(x + dx, d, ann).ok_or_else(|| insufficient(snapshot))?;

        let dy = (y - y_new) * 10_f64.powi(decimals_out as i32);
        if !dy.is_finite() {
            return Err(insufficient(snapshot));
        }
        let amount_out = dy.max(0.0).floor() as u64;
        Ok(amount_out.min(reserve_out.saturating_sub(1)))
    }
}

/// Discrete-bin liquidity (DLMM). Bin `i` trades at `(1 + bin_step / 10_000)^i` quote per base.
/// Pools read without a per-bin breakdown are priced on their live reserves.
#[derive(Debug, Clone, Copy)]
pub struct BinStep;

impl BinStep {
    fn params<'a>(snapshot: &'a ReserveSnapshot) -> Result<(u16, i32, &'a [BinLiquidity]), PricingError> {
        match snapshot.curve() {
            CurveParams::Bins {
                bin_step,
                active_id,
                bins,
            } => Ok((*bin_step, *active_id, bins.as_slice())),
            _ => Err(PricingError::UnsupportedCurve(format!(
                "{} pool {} has no bin parameters",
                snapshot.dex(),
                snapshot.pool_address()
            ))),
        }
    }
}

impl SwapCurve for BinStep {
    fn name(&self) -> &'static str {
        "bin_step"
    }

    fn compute_output(
        &self,
        snapshot: &ReserveSnapshot,
        amount_in: u64,
        direction: SwapDirection,
    ) -> Result<u64, PricingError> {
        let (bin_step, active_id, bins) = Self::params(snapshot)?;
        if bins.is_empty() {
            return CONSTANT_PRODUCT.compute_output(snapshot, amount_in, direction);
        }

        let mut remaining = amount_in as f64 * (1.0 - fee_fraction(snapshot.fee_rate()));
        let mut amount_out = 0.0_f64;

        // Selling base walks down from the active bin, buying base walks up.
        let walk: Box<dyn Iterator<Item = &BinLiquidity> + '_> = match direction {
            SwapDirection::BaseToQuote => Box::new(bins.iter().rev().filter(|b| b.id <= active_id)),
            SwapDirection::QuoteToBase => Box::new(bins.iter().filter(|b| b.id >= active_id)),
        };

        for bin in walk {
            if remaining <= 0.0 {
                break;
            }
            let price = bin_price(bin_step, bin.id);
            let (available, out_for_all) = match direction {
                SwapDirection::BaseToQuote => (bin.quote_amount as f64, remaining * price),
                SwapDirection::QuoteToBase => (bin.base_amount as f64, remaining / price),
            };
            if out_for_all <= available {
                amount_out += out_for_all;
                remaining = 0.0;
            } else {
                amount_out += available;
                remaining -= match direction {
                    SwapDirection::BaseToQuote => available / price,
                    SwapDirection::QuoteToBase => available * price,
                };
            }
        }

        // Fractions of a base unit left over are rounding noise
        if remaining >= 1.0 || !amount_out.is_finite() {
            return Err(insufficient(snapshot));
        }
        Ok(amount_out.floor() as u64)
    }

    fn spot_price(&self, snapshot: &ReserveSnapshot) -> Option<f64> {
        let (bin_step, active_id, bins) = Self::params(snapshot).ok()?;
        if bins.is_empty() {
            return reserve_ratio_price(snapshot);
        }
        let scale = 10_f64.powi(snapshot.base().decimals as i32 - snapshot.quote().decimals as i32);
        Some(bin_price(bin_step, active_id) * scale)
    }
}
