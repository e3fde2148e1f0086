//! Reserve feed built from pool vault balances

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::rpc_client::LedgerClient;
use crate::domain::pool::SnapshotsByPool;
use crate::infrastructure::gateway::ResilientStore;
use crate::shared::errors::{AppError, NetworkError};

/// Source of reserve snapshots for one poll cycle
#[async_trait]
pub trait ReserveFeed: Send + Sync {
    /// Snapshots keyed by pool address. Pools that could not be read are missing from the map.
    async fn snapshots(&self) -> Result<SnapshotsByPool, AppError>;
}

/// Reads every stored pool's base and quote vault in batched account fetches
pub struct VaultReserveFeed {
    store: Arc<ResilientStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl VaultReserveFeed {
    pub fn new(store: Arc<ResilientStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { store, ledger }
    }
}

#[async_trait]
impl ReserveFeed for VaultReserveFeed {
    async fn snapshots(&self) -> Result<SnapshotsByPool, AppError> {
        let pools = self.store.list_pools().await?;
        let vaults: Vec<_> = pools
            .iter()
            .flat_map(|pool| [pool.base_vault, pool.quote_vault])
            .collect();
        let amounts = self.ledger.token_account_amounts(&vaults).await?;
        if amounts.len() != vaults.len() {
            return Err(NetworkError::InvalidResponse(format!(
                "asked for {} vault accounts, got {}",
                vaults.len(),
                amounts.len()
            ))
            .into());
        }
        let observed_at = Utc::now();

        let mut snapshots = SnapshotsByPool::with_capacity(pools.len());
        for (pool, pair) in pools.iter().zip(amounts.chunks(2)) {
            let &[Some(base), Some(quote)] = pair else {
                warn!(pool = %pool.address, "Vault account missing, pool left out of this cycle");
                continue;
            };
            match pool.snapshot(base, quote, observed_at) {
                Ok(snapshot) => {
                    snapshots.insert(pool.address, snapshot);
                }
                Err(e) => warn!(pool = %pool.address, "Rejected snapshot: {}", e),
            }
        }

        debug!("Read reserves for {}/{} pools", snapshots.len(), pools.len());
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::super::balance_poller::mock::MockLedger;
    use super::*;
    use crate::domain::pool::{DexKind, PoolRecord};
    use crate::infrastructure::gateway::RetryPolicy;
    use crate::infrastructure::store::memory::MemoryStore;
    use crate::infrastructure::store::PoolStore;
    use rust_decimal_macros::dec;
    use solana_sdk::pubkey::Pubkey;

    fn pool() -> PoolRecord {
        PoolRecord {
            address: Pubkey::new_unique(),
            dex: DexKind::RaydiumAmm,
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            base_decimals: 9,
            quote_decimals: 6,
            fee_rate: dec!(0.0025),
            amplification: None,
            bin_step: None,
            active_bin_id: None,
        }
    }

    #[tokio::test]
    async fn test_snapshots_skip_pools_with_missing_vaults() {
        let store = Arc::new(MemoryStore::new());
        let (readable, broken) = (pool(), pool());
        store.upsert_pool(&readable).await.unwrap();
        store.upsert_pool(&broken).await.unwrap();

        let ledger = Arc::new(MockLedger::default());
        {
            let mut vaults = ledger.vault_amounts.lock().unwrap();
            vaults.insert(readable.base_vault, 2_000_000_000);
            vaults.insert(readable.quote_vault, 300_000_000);
            vaults.insert(broken.base_vault, 1);
        }

        let gateway = Arc::new(ResilientStore::new(store, RetryPolicy::default()));
        let snapshots = VaultReserveFeed::new(gateway, ledger).snapshots().await.unwrap();

        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[&readable.address];
        assert_eq!(snapshot.base().reserve, 2_000_000_000);
        assert_eq!(snapshot.quote().reserve, 300_000_000);
        assert_eq!(snapshot.fee_rate(), dec!(0.0025));
    }

    #[tokio::test]
    async fn test_short_vault_batch_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (first, second) = (pool(), pool());
        store.upsert_pool(&first).await.unwrap();
        store.upsert_pool(&second).await.unwrap();

        let ledger = Arc::new(MockLedger {
            batch_limit: Some(2),
            ..MockLedger::default()
        });
        {
            let mut vaults = ledger.vault_amounts.lock().unwrap();
            for pool in [&first, &second] {
                vaults.insert(pool.base_vault, 1_000_000_000);
                vaults.insert(pool.quote_vault, 150_000_000);
            }
        }

        let gateway = Arc::new(ResilientStore::new(store, RetryPolicy::default()));
        let err = VaultReserveFeed::new(gateway, ledger).snapshots().await.unwrap_err();
        assert!(matches!(err, AppError::Network(NetworkError::InvalidResponse(_))));
    }
}
