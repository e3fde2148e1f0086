//! Spread detection and round-trip quoting over a two-hop route

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TwoHopRoute;
use crate::domain::pricing::{compute_swap_output, SwapOutput};
use crate::shared::errors::PricingError;

/// Which way round the route is traded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadDirection {
    /// token0 -> token1 in pool A, token1 -> token2 in pool B
    Forward,
    /// token2 -> token1 in pool B, token1 -> token0 in pool A
    Reverse,
}

/// Fee-adjusted price gap between the two pools of a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSpread {
    pub price_a: f64,
    pub price_b: f64,
    /// Price of token0 in token1 in pool B relative to pool A. 1.0 means no gap.
    pub ratio: f64,
    /// `1 - (1 - fee_a)(1 - fee_b)`
    pub combined_fee: f64,
    /// Best round-trip return after fees, in basis points
    pub net_spread_bps: f64,
    pub direction: SpreadDirection,
    pub round_trip: bool,
}

impl RouteSpread {
    pub fn deviation_pct(&self) -> f64 {
        (self.ratio - 1.0) * 100.0
    }

    /// Gaps this wide are bad pool data, not opportunities
    pub fn is_plausible(&self, max_deviation_pct: f64) -> bool {
        self.ratio.is_finite() && self.deviation_pct().abs() <= max_deviation_pct
    }

    pub fn is_profitable(&self, min_net_spread_bps: f64, max_deviation_pct: f64) -> bool {
        self.round_trip
            && self.is_plausible(max_deviation_pct)
            && self.net_spread_bps > 0.0
            && self.net_spread_bps >= min_net_spread_bps
    }
}

/// Both hops of a quoted trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteQuote {
    pub direction: SpreadDirection,
    pub first: SwapOutput,
    pub second: SwapOutput,
    /// Output minus input, only for round trips
    pub profit: Option<i128>,
}

impl RouteQuote {
    pub fn amount_in(&self) -> u64 {
        self.first.amount_in
    }

    pub fn amount_out(&self) -> u64 {
        self.second.amount_out
    }
}

fn fee(rate: Decimal) -> f64 {
    rate.to_f64().unwrap_or(0.0)
}

impl TwoHopRoute {
    /// Fee-adjusted spread between the pools, trading whichever direction pays
    pub fn spread(&self) -> Result<RouteSpread, PricingError> {
        let price_a = self.price_a()?;
        let price_b = self.price_b()?;

        // token2 received per token0 spent, ignoring fees
        let gross = self.rate_a(price_a) * self.rate_b(price_b);
        let ratio = 1.0 / gross;

        let keep = (1.0 - fee(self.snapshot_a.fee_rate())) * (1.0 - fee(self.snapshot_b.fee_rate()));
        let forward = (gross * keep - 1.0) * 10_000.0;
        let reverse = (ratio * keep - 1.0) * 10_000.0;

        let round_trip = self.is_round_trip();
        let (direction, net_spread_bps) = if !round_trip || forward >= reverse {
            (SpreadDirection::Forward, forward)
        } else {
            (SpreadDirection::Reverse, reverse)
        };

        Ok(RouteSpread {
            price_a,
            price_b,
            ratio,
            combined_fee: 1.0 - keep,
            net_spread_bps,
            direction,
            round_trip,
        })
    }

    /// Chain `compute_swap_output` through both hops
    pub fn quote(
        &self,
        direction: SpreadDirection,
        amount_in: u64,
        slippage: Decimal,
    ) -> Result<RouteQuote, PricingError> {
        let route = &self.record;
        let (first, second) = match direction {
            SpreadDirection::Forward => {
                let first = compute_swap_output(&self.snapshot_a, &route.token0, amount_in, slippage)?;
                let second = compute_swap_output(&self.snapshot_b, &route.token1, first.amount_out, slippage)?;
                (first, second)
            }
            SpreadDirection::Reverse => {
                let first = compute_swap_output(&self.snapshot_b, &route.token2, amount_in, slippage)?;
                let second = compute_swap_output(&self.snapshot_a, &route.token1, first.amount_out, slippage)?;
                (first, second)
            }
        };

        let profit = self
            .is_round_trip()
            .then(|| second.amount_out as i128 - amount_in as i128);

        Ok(RouteQuote {
            direction,
            first,
            second,
            profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::TwoHopRoute;
    use super::*;
    use crate::domain::pool::SnapshotsByPool;
    use rust_decimal_macros::dec;
    use solana_sdk::pubkey::Pubkey;

    fn route(price_a: u64, price_b: u64) -> TwoHopRoute {
        let (sol, usdc) = (Pubkey::new_unique(), Pubkey::new_unique());
        let a = sol_usdc_pool(sol, usdc, price_a);
        let b = sol_usdc_pool(sol, usdc, price_b);
        let snapshots: SnapshotsByPool = [(a.pool_address(), a.clone()), (b.pool_address(), b.clone())]
            .into_iter()
            .collect();
        TwoHopRoute::assemble(record(1, &a, &b, sol, usdc), &snapshots).unwrap()
    }

    #[test]
    fn test_equal_prices_are_not_profitable() {
        let spread = route(150, 150).spread().unwrap();
        assert!((spread.ratio - 1.0).abs() < 1e-12);
        assert!((spread.combined_fee - 0.00499375).abs() < 1e-12);
        assert!(spread.net_spread_bps < 0.0);
        assert!(!spread.is_profitable(0.0, 90.0));
    }

    #[test]
    fn test_gap_beyond_fees_is_profitable_in_reverse() {
        // SOL is dearer in B, so selling SOL into B first pays
        let spread = route(150, 160).spread().unwrap();
        assert!(spread.ratio > 1.0);
        assert_eq!(spread.direction, SpreadDirection::Reverse);
        assert!(spread.net_spread_bps > 500.0);
        assert!(spread.is_profitable(10.0, 90.0));
    }

    #[test]
    fn test_cheaper_pool_b_trades_forward() {
        let spread = route(160, 150).spread().unwrap();
        assert_eq!(spread.direction, SpreadDirection::Forward);
        assert!(spread.is_profitable(10.0, 90.0));
    }

    #[test]
    fn test_implausible_deviation_rejected() {
        let spread = route(10, 150).spread().unwrap();
        assert!(spread.deviation_pct() > 90.0);
        assert!(!spread.is_profitable(10.0, 90.0));
    }

    #[test]
    fn test_quote_chains_both_hops() {
        let route = route(150, 160);
        let amount_in = 1_000_000_000;
        let quote = route.quote(SpreadDirection::Reverse, amount_in, dec!(0.01)).unwrap();

        assert_eq!(quote.first.input_mint, route.record.token2);
        assert_eq!(quote.first.output_mint, route.record.token1);
        assert_eq!(quote.second.amount_in, quote.first.amount_out);
        assert_eq!(quote.second.output_mint, route.record.token0);
        assert_eq!(quote.profit, Some(quote.amount_out() as i128 - amount_in as i128));
        assert!(quote.profit.unwrap() > 0);

        let losing = route.quote(SpreadDirection::Forward, amount_in, dec!(0.01)).unwrap();
        assert!(losing.profit.unwrap() < 0);
    }
}
