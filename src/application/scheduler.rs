//! Poll scheduler - one loop owns the cadence and hands due work to a bounded pool of tasks

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::tracker::{PositionTracker, RefreshOutcome};
use crate::domain::position::{PositionFilter, PositionStatus};
use crate::domain::pricing::{curve_for, price_in_quote};
use crate::domain::route::{RouteAggregator, TwoHopRoute};
use crate::infrastructure::blockchain::ReserveFeed;
use crate::shared::errors::AppError;
use crate::shared::types::{SchedulerConfig, TradingConfig};

/// A unit of work due this cycle
#[derive(Debug)]
pub enum WorkItem {
    Route(Box<TwoHopRoute>),
    Position { id: i64, price: f64 },
}

/// Counts for one finished cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub routes: usize,
    pub profitable_routes: usize,
    pub positions: usize,
    pub stopped_positions: usize,
    pub failures: usize,
}

enum UnitResult {
    Route { profitable: bool },
    Position(RefreshOutcome),
}

/// Shared by every spawned unit of work
struct Workers {
    aggregator: RouteAggregator,
    tracker: PositionTracker,
    trading: TradingConfig,
}

impl Workers {
    async fn run(&self, item: WorkItem) -> Result<UnitResult, AppError> {
        match item {
            WorkItem::Route(route) => self.scan_route(&route).await,
            WorkItem::Position { id, price } => {
                let outcome = self.tracker.refresh_position(id, price).await?;
                Ok(UnitResult::Position(outcome))
            }
        }
    }

    async fn scan_route(&self, route: &TwoHopRoute) -> Result<UnitResult, AppError> {
        self.aggregator.record_snapshot(route).await?;

        let spread = route.spread()?;
        if !spread.is_plausible(self.trading.max_price_deviation_pct) {
            warn!(
                route_id = route.id(),
                price_a = spread.price_a,
                price_b = spread.price_b,
                "Price deviation {:.2}% too large, ignoring route",
                spread.deviation_pct()
            );
            return Ok(UnitResult::Route { profitable: false });
        }
        if !spread.is_profitable(self.trading.min_net_spread_bps, self.trading.max_price_deviation_pct) {
            debug!(route_id = route.id(), net_spread_bps = spread.net_spread_bps, "No opportunity");
            return Ok(UnitResult::Route { profitable: false });
        }

        let quote = route.quote(spread.direction, self.trading.probe_amount, self.trading.slippage)?;
        let curve_a = curve_for(route.snapshot_a.dex())?.name();
        let curve_b = curve_for(route.snapshot_b.dex())?.name();
        info!(
            route_id = route.id(),
            curve_a,
            curve_b,
            direction = ?spread.direction,
            net_spread_bps = spread.net_spread_bps,
            amount_in = quote.amount_in(),
            amount_out = quote.amount_out(),
            min_amount_out = quote.second.min_amount_out,
            profit = ?quote.profit,
            observed_at = %route.snapshot_a.observed(),
            "Route opportunity"
        );
        Ok(UnitResult::Route { profitable: true })
    }
}

pub struct PollScheduler {
    feed: Arc<dyn ReserveFeed>,
    workers: Arc<Workers>,
    quote_mint: Pubkey,
    config: SchedulerConfig,
}

impl PollScheduler {
    pub fn new(
        feed: Arc<dyn ReserveFeed>,
        aggregator: RouteAggregator,
        tracker: PositionTracker,
        trading: TradingConfig,
        config: SchedulerConfig,
    ) -> Result<Self, AppError> {
        let quote_mint = Pubkey::from_str(&trading.quote_mint)
            .map_err(|e| AppError::ConfigError(format!("Invalid trading.quote_mint: {}", e)))?;
        Ok(Self {
            feed,
            workers: Arc::new(Workers {
                aggregator,
                tracker,
                trading,
            }),
            quote_mint,
            config,
        })
    }

    /// Poll until `shutdown` flips to true. Cycles that fail are logged and the loop carries on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = self.config.interval_ms, "Poll scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle(shutdown.clone()).await;
                    info!(
                        routes = report.routes,
                        profitable = report.profitable_routes,
                        positions = report.positions,
                        stopped = report.stopped_positions,
                        failures = report.failures,
                        "Cycle complete"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Poll scheduler stopped");
    }

    /// One full cycle: enqueue due work, let the worker pool drain it, report
    pub async fn run_cycle(&self, shutdown: watch::Receiver<bool>) -> CycleReport {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let drain = tokio::spawn(Self::drain(
            rx,
            self.workers.clone(),
            self.config.max_concurrency,
            shutdown,
        ));

        let enqueued = self.enqueue(&tx).await;
        drop(tx);

        let mut report = match drain.await {
            Ok(report) => report,
            Err(e) => {
                error!("Worker pool panicked: {}", e);
                CycleReport::default()
            }
        };
        if let Err(e) = enqueued {
            error!("Cycle aborted: {}", e);
            report.failures += 1;
        }
        report
    }

    /// Push this cycle's work into the queue. Blocks while the queue is full.
    async fn enqueue(&self, tx: &mpsc::Sender<WorkItem>) -> Result<(), AppError> {
        let snapshots = self.feed.snapshots().await?;
        let routes = self.workers.aggregator.build_enabled_routes(&snapshots).await?;
        for route in routes {
            if tx.send(WorkItem::Route(Box::new(route))).await.is_err() {
                return Ok(());
            }
        }

        let positions = self
            .workers
            .tracker
            .positions(PositionFilter::Status(PositionStatus::Active))
            .await?;
        for position in positions.into_iter().filter(|p| p.enable_scan) {
            let Some(price) = price_in_quote(&snapshots, &position.mint, &self.quote_mint) else {
                debug!(id = position.id, mint = %position.mint, "No quote pool for position");
                continue;
            };
            if tx.send(WorkItem::Position { id: position.id, price }).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Worker side of the queue. Stops taking new items once shutdown is signalled
    /// and waits for the ones already running.
    async fn drain(
        mut rx: mpsc::Receiver<WorkItem>,
        workers: Arc<Workers>,
        max_concurrency: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> CycleReport {
        let permits = Arc::new(Semaphore::new(max_concurrency));
        let mut running = JoinSet::new();
        let mut report = CycleReport::default();

        loop {
            if *shutdown.borrow() {
                debug!("Shutdown requested, abandoning queued work");
                break;
            }
            let item = tokio::select! {
                item = rx.recv() => item,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let Some(item) = item else { break };

            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let workers = workers.clone();
            running.spawn(async move {
                let result = workers.run(item).await;
                drop(permit);
                result
            });

            while let Some(joined) = running.try_join_next() {
                tally(&mut report, joined);
            }
        }
        drop(rx);

        while let Some(joined) = running.join_next().await {
            tally(&mut report, joined);
        }
        report
    }
}

fn tally(report: &mut CycleReport, joined: Result<Result<UnitResult, AppError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(UnitResult::Route { profitable })) => {
            report.routes += 1;
            if profitable {
                report.profitable_routes += 1;
            }
        }
        Ok(Ok(UnitResult::Position(outcome))) => {
            if outcome != RefreshOutcome::Skipped {
                report.positions += 1;
            }
            if outcome == RefreshOutcome::Stopped {
                report.stopped_positions += 1;
            }
        }
        Ok(Err(e)) => {
            warn!("Work item failed: {}", e);
            report.failures += 1;
        }
        Err(e) => {
            error!("Work item panicked: {}", e);
            report.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pool::{DexKind, ReserveSide, ReserveSnapshot, SnapshotsByPool};
    use crate::domain::position::NewPosition;
    use crate::domain::route::fixtures::{record, sol_usdc_pool};
    use crate::domain::route::{NewRoute, PoolLeg, RouteStatus};
    use crate::infrastructure::blockchain::balance_poller::mock::MockLedger;
    use crate::infrastructure::blockchain::BalancePoller;
    use crate::infrastructure::gateway::{ResilientStore, RetryPolicy};
    use crate::infrastructure::store::memory::MemoryStore;
    use crate::infrastructure::store::RouteStore;
    use crate::shared::types::PollerConfig;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedFeed(SnapshotsByPool);

    #[async_trait]
    impl ReserveFeed for FixedFeed {
        async fn snapshots(&self) -> Result<SnapshotsByPool, AppError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        scheduler: PollScheduler,
        tracker: PositionTracker,
    }

    fn fixture(snapshots: SnapshotsByPool, quote_mint: Pubkey) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ResilientStore::new(store.clone(), RetryPolicy::new(3, Duration::from_millis(10))));
        let poller = BalancePoller::new(Arc::new(MockLedger::default()), &PollerConfig::default());
        let tracker = PositionTracker::new(gateway.clone(), poller);
        let trading = TradingConfig {
            quote_mint: quote_mint.to_string(),
            min_net_spread_bps: 10.0,
            ..TradingConfig::default()
        };
        let config = SchedulerConfig {
            interval_ms: 1_000,
            max_concurrency: 2,
            queue_capacity: 1,
        };
        let scheduler = PollScheduler::new(
            Arc::new(FixedFeed(snapshots)),
            RouteAggregator::new(gateway),
            tracker.clone(),
            trading,
            config,
        )
        .unwrap();
        Fixture {
            store,
            scheduler,
            tracker,
        }
    }

    fn token_pool(token: Pubkey, wsol: Pubkey, sol_per_token_milli: u64) -> ReserveSnapshot {
        ReserveSnapshot::new(
            Pubkey::new_unique(),
            DexKind::RaydiumAmm,
            ReserveSide::new(token, 1_000_000_000, 6),
            ReserveSide::new(wsol, sol_per_token_milli * 1_000_000_000, 9),
            dec!(0.0025),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cycle_scans_routes_and_stops_positions() {
        let (sol, usdc, token) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let a = sol_usdc_pool(sol, usdc, 150);
        let b = sol_usdc_pool(sol, usdc, 160);
        // 1000 tokens against 50 SOL: 0.05 SOL per token
        let pool = token_pool(token, sol, 50);
        let snapshots: SnapshotsByPool = [&a, &b, &pool]
            .into_iter()
            .map(|s| (s.pool_address(), s.clone()))
            .collect();

        let f = fixture(snapshots, sol);
        let mut stale = record(0, &a, &b, sol, usdc);
        stale.pool_a.base_reserve = 3;
        let route_id = f
            .store
            .insert_route(&NewRoute {
                pool_a: stale.pool_a.clone(),
                pool_b: stale.pool_b.clone(),
                token0: sol,
                token1: usdc,
                token2: sol,
                status: RouteStatus::Enabled,
            })
            .await
            .unwrap();

        let position = f
            .tracker
            .open_position(NewPosition {
                owner: Pubkey::new_unique(),
                mint: token,
                symbol: "POPCAT".to_string(),
                decimals: 6,
                buy_amount: Some(1_000_000),
                buy_price: 0.1,
                stop_loss_percentage: Some(20.0),
                enable_scan: true,
                enable_trade: false,
            })
            .await
            .unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let report = f.scheduler.run_cycle(shutdown).await;

        assert_eq!(report.routes, 1);
        assert_eq!(report.profitable_routes, 1);
        assert_eq!(report.positions, 1);
        assert_eq!(report.stopped_positions, 1);
        assert_eq!(report.failures, 0);

        assert_eq!(f.store.route(route_id).unwrap().pool_a, PoolLeg::from_snapshot(&a));
        let stored = f.store.position(position.id).unwrap();
        assert_eq!(stored.status, PositionStatus::Stopped);
        assert!((stored.current_price - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cycle_survives_store_failure() {
        let (sol, usdc) = (Pubkey::new_unique(), Pubkey::new_unique());
        let a = sol_usdc_pool(sol, usdc, 150);
        let snapshots: SnapshotsByPool = [(a.pool_address(), a.clone())].into_iter().collect();
        let f = fixture(snapshots, sol);

        f.store.fail_next(3);
        let (_tx, shutdown) = watch::channel(false);
        let report = f.scheduler.run_cycle(shutdown.clone()).await;
        assert_eq!(report.failures, 1);

        let report = f.scheduler.run_cycle(shutdown).await;
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_on_shutdown() {
        let f = fixture(SnapshotsByPool::new(), Pubkey::new_unique());
        let (tx, shutdown) = watch::channel(false);

        let handle = tokio::spawn(async move { f.scheduler.run(shutdown).await });
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_rejects_bad_quote_mint() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ResilientStore::new(store, RetryPolicy::default()));
        let poller = BalancePoller::new(Arc::new(MockLedger::default()), &PollerConfig::default());
        let trading = TradingConfig {
            quote_mint: "not-a-mint".to_string(),
            ..TradingConfig::default()
        };
        let result = PollScheduler::new(
            Arc::new(FixedFeed(SnapshotsByPool::new())),
            RouteAggregator::new(gateway.clone()),
            PositionTracker::new(gateway, poller),
            trading,
            SchedulerConfig::default(),
        );
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
