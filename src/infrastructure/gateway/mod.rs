//! Resilient persistence gateway - every store call wrapped in a bounded fixed-delay retry

mod retry;

pub use retry::{with_retry, RetryPolicy};

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;

use crate::domain::pool::PoolRecord;
use crate::domain::position::{NewPosition, PositionUpdate, TradingPosition};
use crate::domain::route::{NewRoute, PoolLeg, RouteRecord};
use crate::infrastructure::store::Store;
use crate::shared::errors::GatewayError;

/// Store wrapper the rest of the application talks to. Reads and single-column updates
/// are idempotent, so a replay after a transient failure is safe.
#[derive(Clone)]
pub struct ResilientStore {
    inner: Arc<dyn Store>,
    policy: RetryPolicy,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn Store>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn list_positions(&self) -> Result<Vec<TradingPosition>, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "list_positions", move || store.list_positions()).await
    }

    pub async fn get_position(&self, id: i64) -> Result<TradingPosition, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "get_position", move || store.get_position(id)).await
    }

    /// A replay after a transient failure can leave a duplicate row
    pub async fn insert_position(
        &self,
        request: &NewPosition,
        amount: u64,
    ) -> Result<TradingPosition, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "insert_position", move || {
            store.insert_position(request, amount)
        })
        .await
    }

    pub async fn update_position(&self, id: i64, update: &PositionUpdate) -> Result<(), GatewayError> {
        let store = &*self.inner;
        let operation = format!("update_{}", update.column());
        with_retry(&self.policy, &operation, move || store.update_position(id, update)).await
    }

    pub async fn list_routes(&self) -> Result<Vec<RouteRecord>, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "list_routes", move || store.list_routes()).await
    }

    pub async fn insert_route(&self, route: &NewRoute) -> Result<i64, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "insert_route", move || store.insert_route(route)).await
    }

    pub async fn refresh_route_snapshot(
        &self,
        route_id: i64,
        pool_a: &PoolLeg,
        pool_b: &PoolLeg,
    ) -> Result<(), GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "refresh_route_snapshot", move || {
            store.refresh_route_snapshot(route_id, pool_a, pool_b)
        })
        .await
    }

    pub async fn list_pools(&self) -> Result<Vec<PoolRecord>, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "list_pools", move || store.list_pools()).await
    }

    pub async fn get_pool(&self, address: &Pubkey) -> Result<PoolRecord, GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "get_pool", move || store.get_pool(address)).await
    }

    pub async fn upsert_pool(&self, pool: &PoolRecord) -> Result<(), GatewayError> {
        let store = &*self.inner;
        with_retry(&self.policy, "upsert_pool", move || store.upsert_pool(pool)).await
    }
}
