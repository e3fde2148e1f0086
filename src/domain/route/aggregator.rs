//! Route aggregation - enabled routes joined against the current snapshots

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{RouteRecord, TwoHopRoute};
use crate::domain::pool::SnapshotsByPool;
use crate::infrastructure::gateway::ResilientStore;
use crate::shared::errors::GatewayError;

/// Collapse routes over the same unordered pool pair, keeping the first seen
pub fn dedup_routes(records: Vec<RouteRecord>) -> Vec<RouteRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.pool_pair()))
        .collect()
}

/// Lazy sequence of assembled routes for one poll cycle.
///
/// Routes are joined only as the iterator is advanced. A route whose pool has no snapshot,
/// or whose pools do not share the intermediate token, is logged and skipped. Clone the
/// iterator to walk the same cycle again.
#[derive(Debug, Clone)]
pub struct EnabledRoutes<'s> {
    records: std::vec::IntoIter<RouteRecord>,
    snapshots: &'s SnapshotsByPool,
}

impl<'s> EnabledRoutes<'s> {
    pub fn new(records: Vec<RouteRecord>, snapshots: &'s SnapshotsByPool) -> Self {
        let enabled = records.into_iter().filter(RouteRecord::is_enabled).collect();
        Self {
            records: dedup_routes(enabled).into_iter(),
            snapshots,
        }
    }

    /// Enabled routes not yet visited, assembled or not
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl Iterator for EnabledRoutes<'_> {
    type Item = TwoHopRoute;

    fn next(&mut self) -> Option<Self::Item> {
        for record in self.records.by_ref() {
            let route_id = record.id;
            match TwoHopRoute::assemble(record, self.snapshots) {
                Ok(route) => return Some(route),
                Err(e) => warn!(route_id, "Skipping route: {}", e),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.records.len()))
    }
}

/// Reads routes through the gateway and writes refreshed snapshot columns back
#[derive(Clone)]
pub struct RouteAggregator {
    store: Arc<ResilientStore>,
}

impl RouteAggregator {
    pub fn new(store: Arc<ResilientStore>) -> Self {
        Self { store }
    }

    /// Enabled routes for this cycle. Nothing is carried over from earlier cycles.
    pub async fn build_enabled_routes<'s>(
        &self,
        snapshots: &'s SnapshotsByPool,
    ) -> Result<EnabledRoutes<'s>, GatewayError> {
        let records = self.store.list_routes().await?;
        let stored = records.len();
        let routes = EnabledRoutes::new(records, snapshots);
        debug!("{} of {} stored routes enabled", routes.remaining(), stored);
        Ok(routes)
    }

    /// Persist the duplicated pool columns of an emitted route for history
    pub async fn record_snapshot(&self, route: &TwoHopRoute) -> Result<(), GatewayError> {
        self.store
            .refresh_route_snapshot(route.id(), &route.record.pool_a, &route.record.pool_b)
            .await
    }
}
