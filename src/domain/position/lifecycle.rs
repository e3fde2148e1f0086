//! Pure state transitions. Every mutator applies its change in memory and returns the
//! single-column updates the caller has to persist.

use chrono::{DateTime, Utc};

use super::{
    check_stop_loss_percentage, stop_from_percentage, NewPosition, PositionStatus, PositionUpdate, TradingPosition,
};
use crate::shared::errors::PositionError;
use crate::shared::utils::scale_amount;

impl TradingPosition {
    /// Fresh `active` position for a stored id
    pub fn opened(id: i64, request: &NewPosition, amount: u64, now: DateTime<Utc>) -> Self {
        let mut position = Self {
            id,
            owner: request.owner,
            mint: request.mint,
            symbol: request.symbol.clone(),
            decimals: request.decimals,
            buy_amount: amount,
            buy_price: request.buy_price,
            current_amount: amount,
            current_price: request.buy_price,
            highest_price: request.buy_price,
            stop_loss_price: request.initial_stop_loss(),
            stop_loss_percentage: request.stop_loss_percentage,
            max_sell_value: 0.0,
            max_sell_value_at: None,
            profit_amount: 0,
            profit_percentage: None,
            status: PositionStatus::Active,
            enable_scan: request.enable_scan,
            enable_trade: request.enable_trade,
            created_at: now,
            updated_at: now,
        };
        position.recompute_profit();
        position
    }

    /// Apply a stored update to the in-memory view
    pub fn apply(&mut self, update: &PositionUpdate) {
        match update {
            PositionUpdate::CurrentAmount(amount) => {
                self.current_amount = *amount;
                self.recompute_profit();
            }
            PositionUpdate::CurrentPrice(price) => self.current_price = *price,
            PositionUpdate::HighestPrice(price) => self.highest_price = *price,
            PositionUpdate::StopLossPrice(price) => self.stop_loss_price = *price,
            PositionUpdate::StopLossPercentage(pct) => self.stop_loss_percentage = *pct,
            PositionUpdate::MaxSellValue { value, at } => {
                self.max_sell_value = *value;
                self.max_sell_value_at = Some(*at);
            }
            PositionUpdate::Status(status) => self.status = *status,
            PositionUpdate::EnableScan(enabled) => self.enable_scan = *enabled,
            PositionUpdate::EnableTrade(enabled) => self.enable_trade = *enabled,
        }
    }

    pub fn recompute_profit(&mut self) {
        let profit = self.current_amount as i128 - self.buy_amount as i128;
        self.profit_amount = profit.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        self.profit_percentage =
            (self.buy_amount > 0).then(|| profit as f64 / self.buy_amount as f64 * 100.0);
    }

    /// Record a new market price. Raises the high-water mark and, with a percentage
    /// configured, ratchets the stop upwards behind it.
    pub fn refresh_valuation(&mut self, price: f64) -> Result<Vec<PositionUpdate>, PositionError> {
        if !price.is_finite() || price < 0.0 {
            return Err(PositionError::InvalidPrice { id: self.id, price });
        }

        let mut updates = vec![PositionUpdate::CurrentPrice(price)];
        if price > self.highest_price {
            updates.push(PositionUpdate::HighestPrice(price));
            if let Some(pct) = self.stop_loss_percentage {
                let candidate = stop_from_percentage(price, pct);
                if candidate > self.stop_loss_price.unwrap_or(0.0) {
                    updates.push(PositionUpdate::StopLossPrice(Some(candidate)));
                }
            }
        }

        for update in &updates {
            self.apply(update);
        }
        self.recompute_profit();
        Ok(updates)
    }

    /// Whether the current price has fallen to or through a set stop
    pub fn stop_triggered(&self) -> bool {
        match self.stop_loss_price {
            Some(stop) if stop > 0.0 => self.current_price <= stop,
            _ => false,
        }
    }

    /// Move an active position to `stopped` once its stop is hit
    pub fn evaluate_stop_loss(&mut self) -> Option<PositionUpdate> {
        if self.status != PositionStatus::Active || !self.stop_triggered() {
            return None;
        }
        let update = PositionUpdate::Status(PositionStatus::Stopped);
        self.apply(&update);
        Some(update)
    }

    /// Externally driven status change. Nothing leaves `stopped`.
    pub fn transition(&mut self, status: PositionStatus) -> Result<Option<PositionUpdate>, PositionError> {
        if self.status == status {
            return Ok(None);
        }
        if self.status.is_terminal() {
            return Err(PositionError::Stopped(self.id));
        }
        let update = PositionUpdate::Status(status);
        self.apply(&update);
        Ok(Some(update))
    }

    /// Flags are independent of status; disabling both does not make a position idle.
    pub fn set_scanning(&mut self, enabled: bool) -> PositionUpdate {
        let update = PositionUpdate::EnableScan(enabled);
        self.apply(&update);
        update
    }

    pub fn set_trading(&mut self, enabled: bool) -> PositionUpdate {
        let update = PositionUpdate::EnableTrade(enabled);
        self.apply(&update);
        update
    }

    pub fn set_current_amount(&mut self, amount: u64) -> PositionUpdate {
        let update = PositionUpdate::CurrentAmount(amount);
        self.apply(&update);
        update
    }

    /// Value of the current holdings at the current price, in quote units
    pub fn sell_value(&self) -> f64 {
        scale_amount(self.current_amount, self.decimals) * self.current_price
    }

    pub fn refresh_max_sell_value(&mut self, at: DateTime<Utc>) -> PositionUpdate {
        let update = PositionUpdate::MaxSellValue {
            value: self.sell_value(),
            at,
        };
        self.apply(&update);
        update
    }

    /// Set an absolute stop. Under the trailing policy it may not sit above the high-water mark.
    pub fn set_stop_loss(&mut self, stop: Option<f64>) -> Result<PositionUpdate, PositionError> {
        if let Some(price) = stop {
            if !price.is_finite() || price < 0.0 {
                return Err(PositionError::InvalidPrice { id: self.id, price });
            }
            if price > self.highest_price {
                return Err(PositionError::StopAboveHigh {
                    id: self.id,
                    stop: price,
                    highest: self.highest_price,
                });
            }
        }
        let update = PositionUpdate::StopLossPrice(stop);
        self.apply(&update);
        Ok(update)
    }

    /// Change the trailing percentage. The stop is recomputed from the current high
    /// but never lowered.
    pub fn set_stop_loss_percentage(
        &mut self,
        percentage: Option<f64>,
    ) -> Result<Vec<PositionUpdate>, PositionError> {
        check_stop_loss_percentage(self.id, percentage)?;

        let mut updates = vec![PositionUpdate::StopLossPercentage(percentage)];
        if let Some(pct) = percentage {
            let candidate = stop_from_percentage(self.highest_price, pct);
            if candidate > self.stop_loss_price.unwrap_or(0.0) {
                updates.push(PositionUpdate::StopLossPrice(Some(candidate)));
            }
        }
        for update in &updates {
            self.apply(update);
        }
        Ok(updates)
    }
}
