//! Row types and column conversions. SQLite has no unsigned 64-bit or decimal type, so
//! amounts travel as INTEGER, fees as TEXT and keys as base58 TEXT.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::domain::pool::{DexKind, PoolRecord};
use crate::domain::position::TradingPosition;
use crate::domain::route::{PoolLeg, RouteRecord};
use crate::shared::errors::StoreError;

pub(super) fn parse_pubkey(column: &str, value: &str) -> Result<Pubkey, StoreError> {
    Pubkey::from_str(value).map_err(|e| StoreError::Decode(format!("{}: {} ({})", column, value, e)))
}

pub(super) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|e| StoreError::Decode(format!("{}: {} ({})", column, value, e)))
}

pub(super) fn narrow<T: TryFrom<i64>>(column: &str, value: i64) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| StoreError::Decode(format!("{}: {} out of range", column, value)))
}

/// u64 amounts above i64::MAX cannot be stored
pub(super) fn to_i64(column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Constraint(format!("{}: {} exceeds INTEGER", column, value)))
}

#[derive(Debug, FromRow)]
pub(super) struct PositionRow {
    pub id: i64,
    pub owner: String,
    pub mint: String,
    pub symbol: String,
    pub decimals: i64,
    pub buy_amount: i64,
    pub buy_price: f64,
    pub current_amount: i64,
    pub current_price: f64,
    pub highest_price: f64,
    pub stop_loss_price: Option<f64>,
    pub stop_loss_percentage: Option<f64>,
    pub max_sell_value: f64,
    pub max_sell_value_at: Option<DateTime<Utc>>,
    pub status: String,
    pub enable_scan: bool,
    pub enable_trade: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PositionRow> for TradingPosition {
    type Error = StoreError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let mut position = TradingPosition {
            id: row.id,
            owner: parse_pubkey("owner", &row.owner)?,
            mint: parse_pubkey("mint", &row.mint)?,
            symbol: row.symbol,
            decimals: narrow("decimals", row.decimals)?,
            buy_amount: narrow("buy_amount", row.buy_amount)?,
            buy_price: row.buy_price,
            current_amount: narrow("current_amount", row.current_amount)?,
            current_price: row.current_price,
            highest_price: row.highest_price,
            stop_loss_price: row.stop_loss_price,
            stop_loss_percentage: row.stop_loss_percentage,
            max_sell_value: row.max_sell_value,
            max_sell_value_at: row.max_sell_value_at,
            profit_amount: 0,
            profit_percentage: None,
            status: row.status.parse().map_err(|e| StoreError::Decode(format!("{}", e)))?,
            enable_scan: row.enable_scan,
            enable_trade: row.enable_trade,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        position.recompute_profit();
        Ok(position)
    }
}

#[derive(Debug, FromRow)]
pub(super) struct PoolRow {
    pub address: String,
    pub dex: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub base_vault: String,
    pub quote_vault: String,
    pub base_decimals: i64,
    pub quote_decimals: i64,
    pub fee_rate: String,
    pub amplification: Option<i64>,
    pub bin_step: Option<i64>,
    pub active_bin_id: Option<i64>,
}

impl TryFrom<PoolRow> for PoolRecord {
    type Error = StoreError;

    fn try_from(row: PoolRow) -> Result<Self, Self::Error> {
        Ok(PoolRecord {
            address: parse_pubkey("address", &row.address)?,
            dex: DexKind::from(row.dex.as_str()),
            base_mint: parse_pubkey("base_mint", &row.base_mint)?,
            quote_mint: parse_pubkey("quote_mint", &row.quote_mint)?,
            base_vault: parse_pubkey("base_vault", &row.base_vault)?,
            quote_vault: parse_pubkey("quote_vault", &row.quote_vault)?,
            base_decimals: narrow("base_decimals", row.base_decimals)?,
            quote_decimals: narrow("quote_decimals", row.quote_decimals)?,
            fee_rate: parse_decimal("fee_rate", &row.fee_rate)?,
            amplification: row.amplification.map(|v| narrow("amplification", v)).transpose()?,
            bin_step: row.bin_step.map(|v| narrow("bin_step", v)).transpose()?,
            active_bin_id: row.active_bin_id.map(|v| narrow("active_bin_id", v)).transpose()?,
        })
    }
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Decode(format!("{}: {}", column, e)))
}

/// Leg columns carry a `_a` / `_b` suffix
fn leg_from_row(row: &SqliteRow, suffix: &str) -> Result<PoolLeg, StoreError> {
    let column = |name: &str| format!("{}_{}", name, suffix);
    let text = |name: &str| -> Result<String, StoreError> { get(row, &column(name)) };
    let int = |name: &str| -> Result<i64, StoreError> { get(row, &column(name)) };

    Ok(PoolLeg {
        address: parse_pubkey(&column("pool"), &text("pool")?)?,
        dex: DexKind::from(text("dex")?.as_str()),
        fee_rate: parse_decimal(&column("fee"), &text("fee")?)?,
        base_mint: parse_pubkey(&column("base_mint"), &text("base_mint")?)?,
        quote_mint: parse_pubkey(&column("quote_mint"), &text("quote_mint")?)?,
        base_decimals: narrow(&column("base_decimals"), int("base_decimals")?)?,
        quote_decimals: narrow(&column("quote_decimals"), int("quote_decimals")?)?,
        base_reserve: narrow(&column("base_reserve"), int("base_reserve")?)?,
        quote_reserve: narrow(&column("quote_reserve"), int("quote_reserve")?)?,
    })
}

pub(super) fn route_from_row(row: &SqliteRow) -> Result<RouteRecord, StoreError> {
    let status: String = get(row, "status")?;
    Ok(RouteRecord {
        id: get(row, "id")?,
        pool_a: leg_from_row(row, "a")?,
        pool_b: leg_from_row(row, "b")?,
        token0: parse_pubkey("token0", &get::<String>(row, "token0")?)?,
        token1: parse_pubkey("token1", &get::<String>(row, "token1")?)?,
        token2: parse_pubkey("token2", &get::<String>(row, "token2")?)?,
        status: status.parse().map_err(|e| StoreError::Decode(format!("{}", e)))?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_conversions() {
        assert_eq!(narrow::<u8>("decimals", 9).unwrap(), 9);
        assert!(narrow::<u8>("decimals", 300).is_err());
        assert!(narrow::<u64>("buy_amount", -1).is_err());
        assert!(matches!(to_i64("amount", u64::MAX), Err(StoreError::Constraint(_))));
        assert!(parse_pubkey("owner", "not-a-key").is_err());
        assert_eq!(parse_decimal("fee", "0.0025").unwrap().to_string(), "0.0025");
    }
}
