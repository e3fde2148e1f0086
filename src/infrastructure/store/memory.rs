//! In-memory store for tests, with injectable transient failures

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;

use super::{PoolStore, PositionStore, RouteStore};
use crate::domain::pool::PoolRecord;
use crate::domain::position::{NewPosition, PositionUpdate, TradingPosition};
use crate::domain::route::{NewRoute, PoolLeg, RouteRecord};
use crate::shared::errors::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    positions: Mutex<BTreeMap<i64, TradingPosition>>,
    routes: Mutex<BTreeMap<i64, RouteRecord>>,
    pools: Mutex<BTreeMap<Pubkey, PoolRecord>>,
    next_id: AtomicU32,
    /// Calls left that fail with a transient error
    failures: AtomicU32,
    /// Positions whose updates always fail transiently
    broken_positions: Mutex<HashSet<i64>>,
    calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail transiently
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Make every update of position `id` fail transiently
    pub fn break_position(&self, id: i64) {
        self.broken_positions.lock().unwrap().insert(id);
    }

    /// Calls made so far, failed ones included
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn position(&self, id: i64) -> Option<TradingPosition> {
        self.positions.lock().unwrap().get(&id).cloned()
    }

    pub fn route(&self, id: i64) -> Option<RouteRecord> {
        self.routes.lock().unwrap().get(&id).cloned()
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Transient("injected failure".to_string()));
        }
        Ok(())
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn list_positions(&self) -> Result<Vec<TradingPosition>, StoreError> {
        self.enter()?;
        Ok(self.positions.lock().unwrap().values().cloned().collect())
    }

    async fn get_position(&self, id: i64) -> Result<TradingPosition, StoreError> {
        self.enter()?;
        self.position(id).ok_or_else(|| StoreError::NotFound {
            entity: "position",
            id: id.to_string(),
        })
    }

    async fn insert_position(&self, request: &NewPosition, amount: u64) -> Result<TradingPosition, StoreError> {
        self.enter()?;
        let position = TradingPosition::opened(self.next_id(), request, amount, Utc::now());
        self.positions.lock().unwrap().insert(position.id, position.clone());
        Ok(position)
    }

    async fn update_position(&self, id: i64, update: &PositionUpdate) -> Result<(), StoreError> {
        self.enter()?;
        if self.broken_positions.lock().unwrap().contains(&id) {
            return Err(StoreError::Transient(format!("position {} unavailable", id)));
        }
        let mut positions = self.positions.lock().unwrap();
        let position = positions.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "position",
            id: id.to_string(),
        })?;
        position.apply(update);
        position.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn list_routes(&self) -> Result<Vec<RouteRecord>, StoreError> {
        self.enter()?;
        Ok(self.routes.lock().unwrap().values().cloned().collect())
    }

    async fn insert_route(&self, route: &NewRoute) -> Result<i64, StoreError> {
        self.enter()?;
        let id = self.next_id();
        let now = Utc::now();
        self.routes.lock().unwrap().insert(
            id,
            RouteRecord {
                id,
                pool_a: route.pool_a.clone(),
                pool_b: route.pool_b.clone(),
                token0: route.token0,
                token1: route.token1,
                token2: route.token2,
                status: route.status,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn refresh_route_snapshot(
        &self,
        route_id: i64,
        pool_a: &PoolLeg,
        pool_b: &PoolLeg,
    ) -> Result<(), StoreError> {
        self.enter()?;
        let mut routes = self.routes.lock().unwrap();
        let route = routes.get_mut(&route_id).ok_or_else(|| StoreError::NotFound {
            entity: "route",
            id: route_id.to_string(),
        })?;
        route.pool_a = pool_a.clone();
        route.pool_b = pool_b.clone();
        route.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn list_pools(&self) -> Result<Vec<PoolRecord>, StoreError> {
        self.enter()?;
        Ok(self.pools.lock().unwrap().values().cloned().collect())
    }

    async fn get_pool(&self, address: &Pubkey) -> Result<PoolRecord, StoreError> {
        self.enter()?;
        self.pools
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "pool",
                id: address.to_string(),
            })
    }

    async fn upsert_pool(&self, pool: &PoolRecord) -> Result<(), StoreError> {
        self.enter()?;
        self.pools.lock().unwrap().insert(pool.address, pool.clone());
        Ok(())
    }
}
