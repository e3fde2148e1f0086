//! Application services - wires configuration to the store, ledger, feed, tracker and scheduler

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tracing::info;

use super::scheduler::PollScheduler;
use super::seed::SeedFile;
use super::tracker::PositionTracker;
use crate::domain::pool::PoolRecord;
use crate::domain::pricing::{compute_swap_output, SwapOutput};
use crate::domain::route::{RouteAggregator, RouteSpread, TwoHopRoute};
use crate::infrastructure::blockchain::{
    BalancePoller, LedgerClient, ReserveFeed, SolanaRpcClient, VaultReserveFeed,
};
use crate::infrastructure::gateway::{ResilientStore, RetryPolicy};
use crate::infrastructure::store::SqliteStore;
use crate::shared::errors::{AppError, PricingError};
use crate::shared::types::{AppConfig, Asset};

/// One route of the `routes` listing with its spread this cycle
pub struct RouteView {
    pub route: TwoHopRoute,
    pub spread: Result<RouteSpread, PricingError>,
}

/// Application service holding every long-lived component
pub struct HopwatchService {
    config: AppConfig,
    sqlite: SqliteStore,
    store: Arc<ResilientStore>,
    ledger: Arc<dyn LedgerClient>,
    feed: Arc<VaultReserveFeed>,
    aggregator: RouteAggregator,
    tracker: PositionTracker,
}

impl HopwatchService {
    /// Connect to the store (creating the schema if needed) and the RPC endpoint
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let sqlite = SqliteStore::connect(&config.store).await?;
        sqlite.init_schema().await?;

        let store = Arc::new(ResilientStore::new(
            Arc::new(sqlite.clone()),
            RetryPolicy::from(&config.retry),
        ));
        let rpc = SolanaRpcClient::from_config(&config.network);
        info!(
            rpc_url = %rpc.url(),
            retry_attempts = store.policy().max_attempts,
            "Service ready"
        );
        let ledger: Arc<dyn LedgerClient> = Arc::new(rpc);
        let poller = BalancePoller::new(ledger.clone(), &config.poller);

        Ok(Self {
            config: config.clone(),
            feed: Arc::new(VaultReserveFeed::new(store.clone(), ledger.clone())),
            aggregator: RouteAggregator::new(store.clone()),
            tracker: PositionTracker::new(store.clone(), poller),
            sqlite,
            store,
            ledger,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn scheduler(&self) -> Result<PollScheduler, AppError> {
        PollScheduler::new(
            self.feed.clone(),
            self.aggregator.clone(),
            self.tracker.clone(),
            self.config.trading.clone(),
            self.config.scheduler.clone(),
        )
    }

    /// Run the poll loop until `shutdown` fires
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        let scheduler = self.scheduler()?;
        scheduler.run(shutdown).await;
        Ok(())
    }

    /// Enabled routes assembled against fresh reserves, with their spreads
    pub async fn scan_routes(&self) -> Result<Vec<RouteView>, AppError> {
        let snapshots = self.feed.snapshots().await?;
        let routes = self.aggregator.build_enabled_routes(&snapshots).await?;
        Ok(routes
            .map(|route| {
                let spread = route.spread();
                RouteView { route, spread }
            })
            .collect())
    }

    /// Quote a single swap against one stored pool's live vault balances
    pub async fn quote(
        &self,
        pool: &Pubkey,
        input_mint: &Pubkey,
        amount_in: u64,
        slippage: Option<Decimal>,
    ) -> Result<(PoolRecord, SwapOutput), AppError> {
        let record = self.store.get_pool(pool).await?;
        let amounts = self
            .ledger
            .token_account_amounts(&[record.base_vault, record.quote_vault])
            .await?;
        let (Some(base), Some(quote)) = (
            amounts.first().copied().flatten(),
            amounts.get(1).copied().flatten(),
        ) else {
            return Err(PricingError::InsufficientReserve(pool.to_string()).into());
        };

        let snapshot = record.snapshot(base, quote, chrono::Utc::now())?;
        let slippage = slippage.unwrap_or(self.config.trading.slippage);
        let output = compute_swap_output(&snapshot, input_mint, amount_in, slippage)?;
        Ok((record, output))
    }

    /// Upsert the seed's pools and insert routes over pool pairs not stored yet.
    /// Returns (pools written, routes inserted).
    pub async fn seed(&self, seed: SeedFile) -> Result<(usize, usize), AppError> {
        let (pools, routes) = seed.into_records()?;
        for pool in &pools {
            self.store.upsert_pool(pool).await?;
        }

        let mut known: HashSet<_> = self
            .store
            .list_routes()
            .await?
            .iter()
            .map(|route| route.pool_pair())
            .collect();
        let mut inserted = 0;
        for route in &routes {
            let (a, b) = (route.pool_a.address, route.pool_b.address);
            let pair = if a <= b { (a, b) } else { (b, a) };
            if !known.insert(pair) {
                info!(pool_a = %a, pool_b = %b, "Route already stored");
                continue;
            }
            let id = self.store.insert_route(route).await?;
            info!(route_id = id, pool_a = %a, pool_b = %b, "Route stored");
            inserted += 1;
        }
        Ok((pools.len(), inserted))
    }

    pub async fn balance(&self, owner: &Pubkey, asset: Asset) -> Result<u64, AppError> {
        Ok(self.ledger.balance(asset, owner).await?)
    }

    pub async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, AppError> {
        Ok(self.ledger.mint_decimals(mint).await?)
    }

    pub async fn close(&self) {
        self.sqlite.close().await;
    }
}
