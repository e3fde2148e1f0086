//! Trading positions - entry facts, valuation and the trailing stop-loss state machine

mod lifecycle;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::shared::errors::{PositionError, StatusParseError};

/// Position status. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Idle,
    Stopped,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Idle => "idle",
            PositionStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Stopped)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(PositionStatus::Active),
            "idle" => Ok(PositionStatus::Idle),
            "stopped" => Ok(PositionStatus::Stopped),
            other => Err(StatusParseError {
                kind: "position",
                value: other.to_string(),
            }),
        }
    }
}

/// A tracked trading position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPosition {
    pub id: i64,
    /// Wallet holding the tokens
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,

    // Entry facts, fixed at creation
    pub buy_amount: u64,
    pub buy_price: f64,

    pub current_amount: u64,
    pub current_price: f64,
    /// High-water mark, only ever raised
    pub highest_price: f64,
    pub stop_loss_price: Option<f64>,
    pub stop_loss_percentage: Option<f64>,
    pub max_sell_value: f64,
    pub max_sell_value_at: Option<DateTime<Utc>>,

    /// `current_amount - buy_amount` in base units
    pub profit_amount: i64,
    /// Defined only when `buy_amount > 0`
    pub profit_percentage: Option<f64>,

    pub status: PositionStatus,
    pub enable_scan: bool,
    pub enable_trade: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to open a position. `buy_amount` left empty is read from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,
    pub buy_amount: Option<u64>,
    pub buy_price: f64,
    pub stop_loss_percentage: Option<f64>,
    pub enable_scan: bool,
    pub enable_trade: bool,
}

impl NewPosition {
    /// Reject entries that would start with a stop above the buy price. The position has no
    /// id yet, so errors carry 0.
    pub fn validate(&self) -> Result<(), PositionError> {
        if !self.buy_price.is_finite() || self.buy_price < 0.0 {
            return Err(PositionError::InvalidPrice {
                id: 0,
                price: self.buy_price,
            });
        }
        check_stop_loss_percentage(0, self.stop_loss_percentage)
    }

    /// Stop price implied by the configured percentage at entry
    pub fn initial_stop_loss(&self) -> Option<f64> {
        self.stop_loss_percentage
            .map(|pct| stop_from_percentage(self.buy_price, pct))
    }
}

/// A single-column mutation of a stored position. Each one is persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionUpdate {
    CurrentAmount(u64),
    CurrentPrice(f64),
    HighestPrice(f64),
    StopLossPrice(Option<f64>),
    StopLossPercentage(Option<f64>),
    MaxSellValue { value: f64, at: DateTime<Utc> },
    Status(PositionStatus),
    EnableScan(bool),
    EnableTrade(bool),
}

impl PositionUpdate {
    /// Column the update writes
    pub fn column(&self) -> &'static str {
        match self {
            PositionUpdate::CurrentAmount(_) => "current_amount",
            PositionUpdate::CurrentPrice(_) => "current_price",
            PositionUpdate::HighestPrice(_) => "highest_price",
            PositionUpdate::StopLossPrice(_) => "stop_loss_price",
            PositionUpdate::StopLossPercentage(_) => "stop_loss_percentage",
            PositionUpdate::MaxSellValue { .. } => "max_sell_value",
            PositionUpdate::Status(_) => "status",
            PositionUpdate::EnableScan(_) => "enable_scan",
            PositionUpdate::EnableTrade(_) => "enable_trade",
        }
    }
}

/// Filter for the read accessor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionFilter {
    #[default]
    All,
    Status(PositionStatus),
}

impl PositionFilter {
    pub fn matches(&self, position: &TradingPosition) -> bool {
        match self {
            PositionFilter::All => true,
            PositionFilter::Status(status) => position.status == *status,
        }
    }
}

impl From<Option<PositionStatus>> for PositionFilter {
    fn from(status: Option<PositionStatus>) -> Self {
        status.map_or(PositionFilter::All, PositionFilter::Status)
    }
}

/// Stop percentages must sit in (0, 100)
pub fn check_stop_loss_percentage(id: i64, percentage: Option<f64>) -> Result<(), PositionError> {
    match percentage {
        Some(pct) if !(pct > 0.0 && pct < 100.0) => Err(PositionError::InvalidStopLossPercentage {
            id,
            percentage: pct,
        }),
        _ => Ok(()),
    }
}

/// `price * (1 - percentage / 100)`
pub fn stop_from_percentage(price: f64, percentage: f64) -> f64 {
    price * (1.0 - percentage / 100.0)
}
