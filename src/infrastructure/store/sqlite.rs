//! SQLite store backed by a sqlx connection pool

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::rows::{route_from_row, to_i64, PoolRow, PositionRow};
use super::{PoolStore, PositionStore, RouteStore};
use crate::domain::pool::PoolRecord;
use crate::domain::position::{NewPosition, PositionUpdate, TradingPosition};
use crate::domain::route::{NewRoute, PoolLeg, RouteRecord};
use crate::shared::errors::StoreError;
use crate::shared::types::StoreConfig;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS pools (
        address TEXT PRIMARY KEY,
        dex TEXT NOT NULL,
        base_mint TEXT NOT NULL,
        quote_mint TEXT NOT NULL,
        base_vault TEXT NOT NULL,
        quote_vault TEXT NOT NULL,
        base_decimals INTEGER NOT NULL,
        quote_decimals INTEGER NOT NULL,
        fee_rate TEXT NOT NULL,
        amplification INTEGER,
        bin_step INTEGER,
        active_bin_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS routes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pool_a TEXT NOT NULL,
        dex_a TEXT NOT NULL,
        fee_a TEXT NOT NULL,
        base_mint_a TEXT NOT NULL,
        quote_mint_a TEXT NOT NULL,
        base_decimals_a INTEGER NOT NULL,
        quote_decimals_a INTEGER NOT NULL,
        base_reserve_a INTEGER NOT NULL,
        quote_reserve_a INTEGER NOT NULL,
        pool_b TEXT NOT NULL,
        dex_b TEXT NOT NULL,
        fee_b TEXT NOT NULL,
        base_mint_b TEXT NOT NULL,
        quote_mint_b TEXT NOT NULL,
        base_decimals_b INTEGER NOT NULL,
        quote_decimals_b INTEGER NOT NULL,
        base_reserve_b INTEGER NOT NULL,
        quote_reserve_b INTEGER NOT NULL,
        token0 TEXT NOT NULL,
        token1 TEXT NOT NULL,
        token2 TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'enabled' CHECK (status IN ('enabled', 'disabled')),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS positions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        mint TEXT NOT NULL,
        symbol TEXT NOT NULL,
        decimals INTEGER NOT NULL,
        buy_amount INTEGER NOT NULL,
        buy_price REAL NOT NULL,
        current_amount INTEGER NOT NULL,
        current_price REAL NOT NULL,
        highest_price REAL NOT NULL,
        stop_loss_price REAL,
        stop_loss_percentage REAL,
        max_sell_value REAL NOT NULL DEFAULT 0,
        max_sell_value_at TEXT,
        status TEXT NOT NULL CHECK (status IN ('active', 'idle', 'stopped')),
        enable_scan BOOLEAN NOT NULL,
        enable_trade BOOLEAN NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// One statement per update kind, each touching a single logical field
fn update_sql(update: &PositionUpdate) -> &'static str {
    match update {
        PositionUpdate::CurrentAmount(_) => "UPDATE positions SET current_amount = ?, updated_at = ? WHERE id = ?",
        PositionUpdate::CurrentPrice(_) => "UPDATE positions SET current_price = ?, updated_at = ? WHERE id = ?",
        PositionUpdate::HighestPrice(_) => "UPDATE positions SET highest_price = ?, updated_at = ? WHERE id = ?",
        PositionUpdate::StopLossPrice(_) => "UPDATE positions SET stop_loss_price = ?, updated_at = ? WHERE id = ?",
        PositionUpdate::StopLossPercentage(_) => {
            "UPDATE positions SET stop_loss_percentage = ?, updated_at = ? WHERE id = ?"
        }
        PositionUpdate::MaxSellValue { .. } => {
            "UPDATE positions SET max_sell_value = ?, max_sell_value_at = ?, updated_at = ? WHERE id = ?"
        }
        PositionUpdate::Status(_) => "UPDATE positions SET status = ?, updated_at = ? WHERE id = ?",
        PositionUpdate::EnableScan(_) => "UPDATE positions SET enable_scan = ?, updated_at = ? WHERE id = ?",
        PositionUpdate::EnableTrade(_) => "UPDATE positions SET enable_trade = ?, updated_at = ? WHERE id = ?",
    }
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StoreError::Decode(format!("database url: {}", e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!("Connected to store at {}", config.database_url);
        Ok(Self { pool })
    }

    /// Single-connection in-memory database
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    async fn list_positions(&self) -> Result<Vec<TradingPosition>, StoreError> {
        let rows: Vec<PositionRow> = sqlx::query_as("SELECT * FROM positions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TradingPosition::try_from).collect()
    }

    async fn get_position(&self, id: i64) -> Result<TradingPosition, StoreError> {
        let row: Option<PositionRow> = sqlx::query_as("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => TradingPosition::try_from(row),
            None => Err(StoreError::NotFound {
                entity: "position",
                id: id.to_string(),
            }),
        }
    }

    async fn insert_position(&self, request: &NewPosition, amount: u64) -> Result<TradingPosition, StoreError> {
        let mut position = TradingPosition::opened(0, request, amount, Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                owner, mint, symbol, decimals, buy_amount, buy_price, current_amount,
                current_price, highest_price, stop_loss_price, stop_loss_percentage,
                max_sell_value, max_sell_value_at, status, enable_scan, enable_trade,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.owner.to_string())
        .bind(position.mint.to_string())
        .bind(position.symbol.clone())
        .bind(position.decimals as i64)
        .bind(to_i64("buy_amount", position.buy_amount)?)
        .bind(position.buy_price)
        .bind(to_i64("current_amount", position.current_amount)?)
        .bind(position.current_price)
        .bind(position.highest_price)
        .bind(position.stop_loss_price)
        .bind(position.stop_loss_percentage)
        .bind(position.max_sell_value)
        .bind(position.max_sell_value_at)
        .bind(position.status.as_str())
        .bind(position.enable_scan)
        .bind(position.enable_trade)
        .bind(position.created_at)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        position.id = result.last_insert_rowid();
        Ok(position)
    }

    async fn update_position(&self, id: i64, update: &PositionUpdate) -> Result<(), StoreError> {
        let query = sqlx::query(update_sql(update));
        let query = match update {
            PositionUpdate::CurrentAmount(amount) => query.bind(to_i64("current_amount", *amount)?),
            PositionUpdate::CurrentPrice(price) | PositionUpdate::HighestPrice(price) => query.bind(*price),
            PositionUpdate::StopLossPrice(value) | PositionUpdate::StopLossPercentage(value) => {
                query.bind(*value)
            }
            PositionUpdate::MaxSellValue { value, at } => query.bind(*value).bind(*at),
            PositionUpdate::Status(status) => query.bind(status.as_str()),
            PositionUpdate::EnableScan(enabled) | PositionUpdate::EnableTrade(enabled) => query.bind(*enabled),
        };

        let result = query.bind(Utc::now()).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "position",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RouteStore for SqliteStore {
    async fn list_routes(&self) -> Result<Vec<RouteRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM routes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(route_from_row).collect()
    }

    async fn insert_route(&self, route: &NewRoute) -> Result<i64, StoreError> {
        let now = Utc::now();
        let (a, b) = (&route.pool_a, &route.pool_b);
        let result = sqlx::query(
            r#"
            INSERT INTO routes (
                pool_a, dex_a, fee_a, base_mint_a, quote_mint_a, base_decimals_a, quote_decimals_a,
                base_reserve_a, quote_reserve_a,
                pool_b, dex_b, fee_b, base_mint_b, quote_mint_b, base_decimals_b, quote_decimals_b,
                base_reserve_b, quote_reserve_b,
                token0, token1, token2, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(a.address.to_string())
        .bind(a.dex.as_str())
        .bind(a.fee_rate.to_string())
        .bind(a.base_mint.to_string())
        .bind(a.quote_mint.to_string())
        .bind(a.base_decimals as i64)
        .bind(a.quote_decimals as i64)
        .bind(to_i64("base_reserve_a", a.base_reserve)?)
        .bind(to_i64("quote_reserve_a", a.quote_reserve)?)
        .bind(b.address.to_string())
        .bind(b.dex.as_str())
        .bind(b.fee_rate.to_string())
        .bind(b.base_mint.to_string())
        .bind(b.quote_mint.to_string())
        .bind(b.base_decimals as i64)
        .bind(b.quote_decimals as i64)
        .bind(to_i64("base_reserve_b", b.base_reserve)?)
        .bind(to_i64("quote_reserve_b", b.quote_reserve)?)
        .bind(route.token0.to_string())
        .bind(route.token1.to_string())
        .bind(route.token2.to_string())
        .bind(route.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn refresh_route_snapshot(
        &self,
        route_id: i64,
        pool_a: &PoolLeg,
        pool_b: &PoolLeg,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE routes SET
                dex_a = ?, fee_a = ?, base_decimals_a = ?, quote_decimals_a = ?,
                base_reserve_a = ?, quote_reserve_a = ?,
                dex_b = ?, fee_b = ?, base_decimals_b = ?, quote_decimals_b = ?,
                base_reserve_b = ?, quote_reserve_b = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(pool_a.dex.as_str())
        .bind(pool_a.fee_rate.to_string())
        .bind(pool_a.base_decimals as i64)
        .bind(pool_a.quote_decimals as i64)
        .bind(to_i64("base_reserve_a", pool_a.base_reserve)?)
        .bind(to_i64("quote_reserve_a", pool_a.quote_reserve)?)
        .bind(pool_b.dex.as_str())
        .bind(pool_b.fee_rate.to_string())
        .bind(pool_b.base_decimals as i64)
        .bind(pool_b.quote_decimals as i64)
        .bind(to_i64("base_reserve_b", pool_b.base_reserve)?)
        .bind(to_i64("quote_reserve_b", pool_b.quote_reserve)?)
        .bind(Utc::now())
        .bind(route_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "route",
                id: route_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PoolStore for SqliteStore {
    async fn list_pools(&self) -> Result<Vec<PoolRecord>, StoreError> {
        let rows: Vec<PoolRow> = sqlx::query_as("SELECT * FROM pools ORDER BY address")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PoolRecord::try_from).collect()
    }

    async fn get_pool(&self, address: &Pubkey) -> Result<PoolRecord, StoreError> {
        let row: Option<PoolRow> = sqlx::query_as("SELECT * FROM pools WHERE address = ?")
            .bind(address.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => PoolRecord::try_from(row),
            None => Err(StoreError::NotFound {
                entity: "pool",
                id: address.to_string(),
            }),
        }
    }

    async fn upsert_pool(&self, pool: &PoolRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pools (
                address, dex, base_mint, quote_mint, base_vault, quote_vault,
                base_decimals, quote_decimals, fee_rate, amplification, bin_step, active_bin_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pool.address.to_string())
        .bind(pool.dex.as_str())
        .bind(pool.base_mint.to_string())
        .bind(pool.quote_mint.to_string())
        .bind(pool.base_vault.to_string())
        .bind(pool.quote_vault.to_string())
        .bind(pool.base_decimals as i64)
        .bind(pool.quote_decimals as i64)
        .bind(pool.fee_rate.to_string())
        .bind(pool.amplification.map(|a| to_i64("amplification", a)).transpose()?)
        .bind(pool.bin_step.map(i64::from))
        .bind(pool.active_bin_id.map(i64::from))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
