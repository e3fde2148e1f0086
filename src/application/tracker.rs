//! Position tracker - drives the trailing stop-loss state machine and persists every change
//! through the resilient gateway, one column per write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use solana_sdk::pubkey::Pubkey;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::position::{
    NewPosition, PositionFilter, PositionStatus, PositionUpdate, TradingPosition,
};
use crate::infrastructure::blockchain::BalancePoller;
use crate::infrastructure::gateway::ResilientStore;
use crate::shared::errors::{AppError, GatewayError};
use crate::shared::types::Asset;

/// What one refresh did to a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Not active or not scanned, left untouched
    Skipped,
    /// Price and valuation updated
    Refreshed,
    /// The stop was hit and the position is now stopped
    Stopped,
}

#[derive(Clone)]
pub struct PositionTracker {
    store: Arc<ResilientStore>,
    poller: BalancePoller,
}

impl PositionTracker {
    pub fn new(store: Arc<ResilientStore>, poller: BalancePoller) -> Self {
        Self { store, poller }
    }

    pub async fn positions(&self, filter: PositionFilter) -> Result<Vec<TradingPosition>, GatewayError> {
        let positions = self.store.list_positions().await?;
        Ok(positions.into_iter().filter(|p| filter.matches(p)).collect())
    }

    pub async fn position(&self, id: i64) -> Result<TradingPosition, GatewayError> {
        self.store.get_position(id).await
    }

    /// Store a new active position. Without an explicit buy amount the owner's token
    /// balance is polled until the purchase lands.
    pub async fn open_position(&self, request: NewPosition) -> Result<TradingPosition, AppError> {
        request.validate()?;

        let amount = match request.buy_amount {
            Some(amount) => amount,
            None => {
                let asset = Asset::Token(request.mint);
                self.poller
                    .poll_balance(asset, &request.owner)
                    .await
                    .ok_or_else(|| AppError::BalanceNotFound {
                        asset: asset.to_string(),
                        owner: request.owner.to_string(),
                    })?
            }
        };

        let position = self.store.insert_position(&request, amount).await?;
        info!(
            id = position.id,
            symbol = %position.symbol,
            amount,
            buy_price = position.buy_price,
            "Opened position"
        );
        Ok(position)
    }

    async fn persist(&self, id: i64, updates: &[PositionUpdate]) -> Result<(), GatewayError> {
        try_join_all(updates.iter().map(|update| self.store.update_position(id, update))).await?;
        Ok(())
    }

    /// New market price: current price, high-water mark and ratcheted stop
    pub async fn refresh_valuation(&self, position: &mut TradingPosition, price: f64) -> Result<(), AppError> {
        let updates = position.refresh_valuation(price)?;
        self.persist(position.id, &updates).await?;
        Ok(())
    }

    /// Stop the position if its price is at or below the stop. Returns whether it stopped.
    pub async fn evaluate_stop_loss(&self, position: &mut TradingPosition) -> Result<bool, AppError> {
        let Some(update) = position.evaluate_stop_loss() else {
            return Ok(false);
        };
        self.store.update_position(position.id, &update).await?;
        warn!(
            id = position.id,
            symbol = %position.symbol,
            price = position.current_price,
            stop = position.stop_loss_price,
            "Stop loss hit, position stopped"
        );
        Ok(true)
    }

    pub async fn update_max_sell_value(&self, position: &mut TradingPosition) -> Result<(), AppError> {
        let update = position.refresh_max_sell_value(Utc::now());
        self.store.update_position(position.id, &update).await?;
        Ok(())
    }

    pub async fn toggle_scanning(&self, position: &mut TradingPosition, enabled: bool) -> Result<(), AppError> {
        let update = position.set_scanning(enabled);
        self.store.update_position(position.id, &update).await?;
        Ok(())
    }

    pub async fn toggle_trading(&self, position: &mut TradingPosition, enabled: bool) -> Result<(), AppError> {
        let update = position.set_trading(enabled);
        self.store.update_position(position.id, &update).await?;
        Ok(())
    }

    pub async fn update_current_amount(&self, position: &mut TradingPosition, amount: u64) -> Result<(), AppError> {
        let update = position.set_current_amount(amount);
        self.store.update_position(position.id, &update).await?;
        Ok(())
    }

    pub async fn update_stop_loss(&self, position: &mut TradingPosition, stop: Option<f64>) -> Result<(), AppError> {
        let update = position.set_stop_loss(stop)?;
        self.store.update_position(position.id, &update).await?;
        Ok(())
    }

    pub async fn update_stop_loss_percentage(
        &self,
        position: &mut TradingPosition,
        percentage: Option<f64>,
    ) -> Result<(), AppError> {
        let updates = position.set_stop_loss_percentage(percentage)?;
        self.persist(position.id, &updates).await?;
        Ok(())
    }

    pub async fn update_status(&self, position: &mut TradingPosition, status: PositionStatus) -> Result<(), AppError> {
        if let Some(update) = position.transition(status)? {
            self.store.update_position(position.id, &update).await?;
            info!(id = position.id, status = %status, "Position status changed");
        }
        Ok(())
    }

    /// Re-read the owner's token balance and store it as the current amount
    pub async fn sync_current_amount(&self, position: &mut TradingPosition) -> Result<Option<u64>, AppError> {
        let balance = self
            .poller
            .ledger()
            .balance(Asset::Token(position.mint), &position.owner)
            .await?;
        if balance == position.current_amount {
            return Ok(None);
        }
        self.update_current_amount(position, balance).await?;
        Ok(Some(balance))
    }

    /// One valuation pass over a stored position
    pub async fn refresh_position(&self, id: i64, price: f64) -> Result<RefreshOutcome, AppError> {
        let mut position = self.store.get_position(id).await?;
        if position.status != PositionStatus::Active || !position.enable_scan {
            debug!(id, status = %position.status, "Position not scanned");
            return Ok(RefreshOutcome::Skipped);
        }

        self.refresh_valuation(&mut position, price).await?;
        if position.sell_value() > position.max_sell_value {
            self.update_max_sell_value(&mut position).await?;
        }
        if self.evaluate_stop_loss(&mut position).await? {
            return Ok(RefreshOutcome::Stopped);
        }

        debug!(
            id,
            price,
            highest = position.highest_price,
            stop = position.stop_loss_price,
            "Position refreshed"
        );
        Ok(RefreshOutcome::Refreshed)
    }

    /// Refresh every active, scanned position that has a price, each on its own task.
    /// A failing position is logged and does not hold up the others.
    pub async fn refresh_all(&self, prices: &HashMap<Pubkey, f64>) -> Result<Vec<(i64, RefreshOutcome)>, GatewayError> {
        let positions = self
            .positions(PositionFilter::Status(PositionStatus::Active))
            .await?;

        let mut tasks = JoinSet::new();
        for position in positions.into_iter().filter(|p| p.enable_scan) {
            let Some(&price) = prices.get(&position.mint) else {
                debug!(id = position.id, mint = %position.mint, "No price this cycle");
                continue;
            };
            let tracker = self.clone();
            tasks.spawn(async move { (position.id, tracker.refresh_position(position.id, price).await) });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(outcome))) => outcomes.push((id, outcome)),
                Ok((id, Err(e))) => error!(id, "Position refresh failed: {}", e),
                Err(e) => error!("Position task panicked: {}", e),
            }
        }
        outcomes.sort_by_key(|(id, _)| *id);
        Ok(outcomes)
    }
}
