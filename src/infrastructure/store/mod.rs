//! Relational store - row reads and single-column updates for positions, routes and pools

#[cfg(test)]
pub mod memory;
mod rows;
mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::domain::pool::PoolRecord;
use crate::domain::position::{NewPosition, PositionUpdate, TradingPosition};
use crate::domain::route::{NewRoute, PoolLeg, RouteRecord};
use crate::shared::errors::StoreError;

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn list_positions(&self) -> Result<Vec<TradingPosition>, StoreError>;

    async fn get_position(&self, id: i64) -> Result<TradingPosition, StoreError>;

    /// Persist a new `active` position holding `amount`
    async fn insert_position(&self, request: &NewPosition, amount: u64) -> Result<TradingPosition, StoreError>;

    /// Write one column of one row. Fails with `NotFound` when the id does not exist.
    async fn update_position(&self, id: i64, update: &PositionUpdate) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn list_routes(&self) -> Result<Vec<RouteRecord>, StoreError>;

    async fn insert_route(&self, route: &NewRoute) -> Result<i64, StoreError>;

    /// Overwrite the duplicated snapshot columns of both legs
    async fn refresh_route_snapshot(
        &self,
        route_id: i64,
        pool_a: &PoolLeg,
        pool_b: &PoolLeg,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn list_pools(&self) -> Result<Vec<PoolRecord>, StoreError>;

    async fn get_pool(&self, address: &Pubkey) -> Result<PoolRecord, StoreError>;

    /// Insert or replace by address
    async fn upsert_pool(&self, pool: &PoolRecord) -> Result<(), StoreError>;
}

/// Everything the application persists
pub trait Store: PositionStore + RouteStore + PoolStore {}

impl<T: PositionStore + RouteStore + PoolStore> Store for T {}
