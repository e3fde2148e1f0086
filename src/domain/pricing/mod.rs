//! Swap pricing - expected output and slippage-bounded minimum for a reserve snapshot

mod curves;

pub use curves::{curve_for, BinStep, ConstantProduct, StableSwap, SwapCurve, DEFAULT_AMPLIFICATION};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::domain::pool::{ReserveSnapshot, SnapshotsByPool};
use crate::shared::errors::PricingError;

/// Which way a swap crosses the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapDirection {
    BaseToQuote,
    QuoteToBase,
}

impl SwapDirection {
    /// Direction implied by the input mint, if it belongs to the pool
    pub fn for_input(snapshot: &ReserveSnapshot, input_mint: &Pubkey) -> Option<Self> {
        if snapshot.base().mint == *input_mint {
            Some(SwapDirection::BaseToQuote)
        } else if snapshot.quote().mint == *input_mint {
            Some(SwapDirection::QuoteToBase)
        } else {
            None
        }
    }
}

/// Result of a swap computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutput {
    pub direction: SwapDirection,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub amount_out: u64,
    pub min_amount_out: u64,
}

/// Compute the expected output of swapping `amount_in` of `input_mint` through the pool,
/// along with the minimum acceptable output under `slippage` (0.01 = 1%).
pub fn compute_swap_output(
    snapshot: &ReserveSnapshot,
    input_mint: &Pubkey,
    amount_in: u64,
    slippage: Decimal,
) -> Result<SwapOutput, PricingError> {
    let direction = SwapDirection::for_input(snapshot, input_mint).ok_or_else(|| {
        PricingError::InvalidInputMint {
            pool: snapshot.pool_address().to_string(),
            mint: input_mint.to_string(),
        }
    })?;
    if amount_in == 0 {
        return Err(PricingError::InvalidAmount);
    }
    if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
        return Err(PricingError::InvalidSlippage(slippage.to_string()));
    }

    let curve = curve_for(snapshot.dex())?;
    let amount_out = curve.compute_output(snapshot, amount_in, direction)?;

    let output_mint = match direction {
        SwapDirection::BaseToQuote => snapshot.quote().mint,
        SwapDirection::QuoteToBase => snapshot.base().mint,
    };

    Ok(SwapOutput {
        direction,
        input_mint: *input_mint,
        output_mint,
        amount_in,
        amount_out,
        min_amount_out: apply_slippage(amount_out, slippage),
    })
}

/// `floor(amount_out * (1 - slippage))`
pub fn apply_slippage(amount_out: u64, slippage: Decimal) -> u64 {
    (Decimal::from(amount_out) * (Decimal::ONE - slippage))
        .floor()
        .to_u64()
        .unwrap_or(0)
}

/// Implied price of the pool as quote per base in UI units
pub fn implied_price(snapshot: &ReserveSnapshot) -> Result<f64, PricingError> {
    curve_for(snapshot.dex())?
        .spot_price(snapshot)
        .ok_or_else(|| PricingError::InsufficientReserve(snapshot.pool_address().to_string()))
}

/// Price of `mint` in `quote_mint` (UI units) from the deepest pool pairing the two
pub fn price_in_quote(snapshots: &SnapshotsByPool, mint: &Pubkey, quote_mint: &Pubkey) -> Option<f64> {
    snapshots
        .values()
        .filter(|snapshot| snapshot.other_mint(mint) == Some(*quote_mint))
        .filter_map(|snapshot| {
            let depth = snapshot.side(quote_mint)?.reserve;
            let price = implied_price(snapshot).ok()?;
            let price = if snapshot.base().mint == *mint { price } else { 1.0 / price };
            (price.is_finite() && price > 0.0).then_some((depth, price))
        })
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, price)| price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pool::{BinLiquidity, CurveParams, DexKind, PoolRecord, ReserveSide};
    use rust_decimal_macros::dec;

    fn cp_pool(fee: Decimal) -> ReserveSnapshot {
        ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(Pubkey::new_unique(), 1_000_000_000, 9),
            ReserveSide::new(Pubkey::new_unique(), 100_000_000, 6),
            fee,
        )
        .unwrap()
    }

    fn stable_pool(dex: DexKind) -> ReserveSnapshot {
        ReserveSnapshot::new(
            Pubkey::new_unique(),
            dex,
            ReserveSide::new(Pubkey::new_unique(), 1_000_000_000_000, 6),
            ReserveSide::new(Pubkey::new_unique(), 1_000_000_000_000, 6),
            dec!(0.0004),
        )
        .unwrap()
    }

    fn dlmm_pool() -> ReserveSnapshot {
        ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::MeteoraDlmm,
            ReserveSide::new(Pubkey::new_unique(), 1_000, 9),
            ReserveSide::new(Pubkey::new_unique(), 6_000, 6),
            Decimal::ZERO,
        )
        .unwrap()
        .with_curve(CurveParams::Bins {
            bin_step: 25,
            active_id: 0,
            bins: vec![
                BinLiquidity { id: -1, base_amount: 0, quote_amount: 5_000 },
                BinLiquidity { id: 0, base_amount: 1_000, quote_amount: 1_000 },
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_constant_product_output() {
        let pool = cp_pool(dec!(0.0025));
        let base = pool.base().mint;
        let out = compute_swap_output(&pool, &base, 10_000_000, dec!(0.01)).unwrap();

        assert_eq!(out.direction, SwapDirection::BaseToQuote);
        assert_eq!(out.output_mint, pool.quote().mint);
        assert_eq!(out.amount_out, 987_648);
        assert_eq!(out.min_amount_out, 977_771);
    }

    #[test]
    fn test_quote_input_swaps_toward_base() {
        let pool = cp_pool(dec!(0.0025));
        let quote = pool.quote().mint;
        let out = compute_swap_output(&pool, &quote, 1_000_000, dec!(0.01)).unwrap();

        assert_eq!(out.direction, SwapDirection::QuoteToBase);
        assert_eq!(out.output_mint, pool.base().mint);
        assert!(out.amount_out > 0);
        // 1 USDC at ~0.1 USDC/SOL buys a bit under 0.01 SOL
        assert!(out.amount_out < 10_000_000);
    }

    /// DLMM pool as the feed builds it, from live vault balances without per-bin data
    fn live_dlmm_pool(fee: Decimal, base_reserve: u64, quote_reserve: u64) -> ReserveSnapshot {
        PoolRecord {
            address: Pubkey::new_unique(),
            dex: DexKind::MeteoraDlmm,
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            base_decimals: 9,
            quote_decimals: 6,
            fee_rate: fee,
            amplification: None,
            bin_step: Some(10),
            active_bin_id: Some(-1900),
        }
        .snapshot(base_reserve, quote_reserve, chrono::Utc::now())
        .unwrap()
    }

    fn fee_pool(dex: &DexKind, fee: Decimal) -> ReserveSnapshot {
        match dex {
            DexKind::RaydiumAmm => cp_pool(fee),
            // Balanced, where the reserve ratio is also the stable spot price
            DexKind::RaydiumStable => ReserveSnapshot::new(
                Pubkey::new_unique(),
                DexKind::RaydiumStable,
                ReserveSide::new(Pubkey::new_unique(), 1_000_000_000_000, 6),
                ReserveSide::new(Pubkey::new_unique(), 1_000_000_000_000, 6),
                fee,
            )
            .unwrap()
            .with_curve(CurveParams::Stable { amplification: 100 })
            .unwrap(),
            DexKind::MeteoraDlmm => live_dlmm_pool(fee, 1_000_000_000_000, 150_000_000_000),
            other => panic!("no fixture for {}", other),
        }
    }

    #[test]
    fn test_output_below_proportional_and_decreasing_in_fee() {
        let amount_in = 25_000_000u64;
        let fees = [dec!(0), dec!(0.0025), dec!(0.01), dec!(0.03), dec!(0.1)];

        for dex in [DexKind::RaydiumAmm, DexKind::RaydiumStable, DexKind::MeteoraDlmm] {
            let mut previous = u64::MAX;
            for fee in fees {
                let pool = fee_pool(&dex, fee);
                for input in [pool.base().mint, pool.quote().mint] {
                    let side_in = pool.side(&input).unwrap();
                    let side_out = pool.side(&pool.other_mint(&input).unwrap()).unwrap();
                    let proportional =
                        amount_in as u128 * side_out.reserve as u128 / side_in.reserve as u128;
                    let out = compute_swap_output(&pool, &input, amount_in, dec!(0.01)).unwrap();
                    if fee > Decimal::ZERO {
                        assert!((out.amount_out as u128) < proportional, "{} fee {}", dex, fee);
                    } else {
                        assert!((out.amount_out as u128) <= proportional, "{} without fee", dex);
                    }
                }

                let out = compute_swap_output(&pool, &pool.base().mint, amount_in, dec!(0.01)).unwrap();
                assert!(out.amount_out < previous, "{} fee {} did not lower output", dex, fee);
                previous = out.amount_out;
            }
        }
    }

    #[test]
    fn test_bin_pool_price_follows_reserves() {
        let balanced = live_dlmm_pool(dec!(0.002), 1_000_000_000, 150_000_000_000);
        let drained = live_dlmm_pool(dec!(0.002), 1_000_000_000, 15_000_000);

        assert!((implied_price(&balanced).unwrap() - 150.0).abs() < 1e-9);
        assert!((implied_price(&drained).unwrap() - 0.015).abs() < 1e-12);

        // Selling 0.1 SOL into the drained pool cannot return more than it holds
        let out = compute_swap_output(&drained, &drained.base().mint, 100_000_000, dec!(0.01)).unwrap();
        assert!(out.amount_out < 15_000_000 / 10);
    }

    #[test]
    fn test_min_amount_out_is_exact() {
        assert_eq!(apply_slippage(1_000, dec!(0.01)), 990);
        assert_eq!(apply_slippage(12_345, dec!(0.005)), 12_283);
        assert_eq!(apply_slippage(0, dec!(0.5)), 0);

        let pool = cp_pool(dec!(0.0025));
        for slippage in [dec!(0.001), dec!(0.01), dec!(0.25), dec!(0.999)] {
            let out = compute_swap_output(&pool, &pool.base().mint, 50_000_000, slippage).unwrap();
            let expected = (Decimal::from(out.amount_out) * (Decimal::ONE - slippage)).floor();
            assert_eq!(Decimal::from(out.min_amount_out), expected);
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let pool = cp_pool(dec!(0.0025));
        let base = pool.base().mint;

        assert!(matches!(
            compute_swap_output(&pool, &Pubkey::new_unique(), 1_000, dec!(0.01)),
            Err(PricingError::InvalidInputMint { .. })
        ));
        assert_eq!(
            compute_swap_output(&pool, &base, 0, dec!(0.01)),
            Err(PricingError::InvalidAmount)
        );
        assert!(matches!(
            compute_swap_output(&pool, &base, 1_000, dec!(0)),
            Err(PricingError::InvalidSlippage(_))
        ));
        assert!(matches!(
            compute_swap_output(&pool, &base, 1_000, dec!(1)),
            Err(PricingError::InvalidSlippage(_))
        ));
    }

    #[test]
    fn test_insufficient_reserve() {
        let empty = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(Pubkey::new_unique(), 1_000, 9),
            ReserveSide::new(Pubkey::new_unique(), 0, 6),
            dec!(0.0025),
        )
        .unwrap();
        assert!(matches!(
            compute_swap_output(&empty, &empty.base().mint, 10, dec!(0.01)),
            Err(PricingError::InsufficientReserve(_))
        ));

        let saturated = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(Pubkey::new_unique(), u64::MAX - 5, 9),
            ReserveSide::new(Pubkey::new_unique(), 1_000, 6),
            dec!(0.0025),
        )
        .unwrap();
        assert!(matches!(
            compute_swap_output(&saturated, &saturated.base().mint, 10, dec!(0.01)),
            Err(PricingError::InsufficientReserve(_))
        ));
    }

    #[test]
    fn test_unknown_dex_has_no_curve() {
        let pool = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::Other("orca".to_string()),
            ReserveSide::new(Pubkey::new_unique(), 1_000, 9),
            ReserveSide::new(Pubkey::new_unique(), 1_000, 6),
            dec!(0.003),
        )
        .unwrap();
        assert_eq!(
            compute_swap_output(&pool, &pool.base().mint, 10, dec!(0.01)),
            Err(PricingError::UnsupportedCurve("orca".to_string()))
        );
        assert!(implied_price(&pool).is_err());
    }

    #[test]
    fn test_stable_swap_beats_constant_product_near_peg() {
        let stable = stable_pool(DexKind::RaydiumStable);
        let product = stable_pool(DexKind::RaydiumAmm);
        let amount_in = 10_000_000_000; // 10k units, 1% of the pool

        let stable_out = compute_swap_output(&stable, &stable.base().mint, amount_in, dec!(0.01)).unwrap();
        let product_out = compute_swap_output(&product, &product.base().mint, amount_in, dec!(0.01)).unwrap();

        let after_fee = amount_in as f64 * (1.0 - 0.0004);
        assert!(stable_out.amount_out as f64 <= after_fee);
        assert!(stable_out.amount_out as f64 > after_fee * 0.999);
        assert!(stable_out.amount_out > product_out.amount_out);
    }

    #[test]
    fn test_bin_step_walks_bins() {
        let pool = dlmm_pool();
        let base = pool.base().mint;

        let small = compute_swap_output(&pool, &base, 100, dec!(0.01)).unwrap();
        assert_eq!(small.amount_out, 100);

        // Drains the active bin, then fills the rest one bin lower
        let large = compute_swap_output(&pool, &base, 3_000, dec!(0.01)).unwrap();
        assert_eq!(large.amount_out, 2_995);

        assert!(matches!(
            compute_swap_output(&pool, &base, 10_000, dec!(0.01)),
            Err(PricingError::InsufficientReserve(_))
        ));
    }

    #[test]
    fn test_bin_step_without_params_is_unsupported() {
        let pool = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::MeteoraDlmm,
            ReserveSide::new(Pubkey::new_unique(), 1_000, 9),
            ReserveSide::new(Pubkey::new_unique(), 1_000, 6),
            dec!(0.02),
        )
        .unwrap();
        assert!(matches!(
            compute_swap_output(&pool, &pool.base().mint, 10, dec!(0.01)),
            Err(PricingError::UnsupportedCurve(_))
        ));
    }

    #[test]
    fn test_implied_price_scales_decimals() {
        let pool = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(Pubkey::new_unique(), 1_000_000_000, 9),
            ReserveSide::new(Pubkey::new_unique(), 150_000_000, 6),
            dec!(0.0025),
        )
        .unwrap();
        assert!((implied_price(&pool).unwrap() - 150.0).abs() < 1e-9);

        let dlmm = dlmm_pool();
        assert!((implied_price(&dlmm).unwrap() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_in_quote_prefers_deepest_pool() {
        let (token, wsol) = (Pubkey::new_unique(), Pubkey::new_unique());
        let shallow = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(token, 1_000_000, 6),
            ReserveSide::new(wsol, 1_000_000_000, 9),
            dec!(0.0025),
        )
        .unwrap();
        // Token quoted on the base side here: 4 SOL of depth at 0.5 SOL per token
        let deep = ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(wsol, 4_000_000_000, 9),
            ReserveSide::new(token, 8_000_000, 6),
            dec!(0.003),
        )
        .unwrap();
        let snapshots: SnapshotsByPool = [(shallow.pool_address(), shallow), (deep.pool_address(), deep)]
            .into_iter()
            .collect();

        let price = price_in_quote(&snapshots, &token, &wsol).unwrap();
        assert!((price - 0.5).abs() < 1e-9);
        assert_eq!(price_in_quote(&snapshots, &Pubkey::new_unique(), &wsol), None);
    }
}
