//! Balance poller - waits for a balance to show up on the ledger

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use super::rpc_client::LedgerClient;
use crate::shared::types::{Asset, PollScheduleConfig, PollerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<&PollScheduleConfig> for PollSchedule {
    fn from(config: &PollScheduleConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Polls the ledger until a strictly positive balance is observed.
/// Native transfers settle quickly; token accounts are polled less often and for longer.
#[derive(Clone)]
pub struct BalancePoller {
    ledger: Arc<dyn LedgerClient>,
    native: PollSchedule,
    token: PollSchedule,
}

impl BalancePoller {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: &PollerConfig) -> Self {
        Self {
            ledger,
            native: PollSchedule::from(&config.native),
            token: PollSchedule::from(&config.token),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn schedule(&self, asset: Asset) -> PollSchedule {
        match asset {
            Asset::Native => self.native,
            Asset::Token(_) => self.token,
        }
    }

    /// First positive balance of `asset` held by `owner`, or `None` once the schedule's
    /// attempts are spent. Ledger errors count as an attempt and are logged.
    pub async fn poll_balance(&self, asset: Asset, owner: &Pubkey) -> Option<u64> {
        let schedule = self.schedule(asset);

        for attempt in 1..=schedule.max_attempts {
            match self.ledger.balance(asset, owner).await {
                Ok(amount) if amount > 0 => {
                    info!(%asset, %owner, amount, attempt, "Balance available");
                    return Some(amount);
                }
                Ok(_) => debug!(%asset, %owner, attempt, "No balance yet"),
                Err(e) => warn!(
                    %asset,
                    %owner,
                    "Balance query failed (attempt {}/{}): {}",
                    attempt,
                    schedule.max_attempts,
                    e
                ),
            }

            if attempt < schedule.max_attempts {
                tokio::time::sleep(schedule.interval).await;
            }
        }

        warn!(
            %asset,
            %owner,
            "No balance after {} attempts",
            schedule.max_attempts
        );
        None
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockLedger;
    use super::*;
    use crate::shared::errors::NetworkError;
    use tokio::time::Instant;

    fn poller(ledger: Arc<MockLedger>) -> BalancePoller {
        BalancePoller::new(ledger, &PollerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_positive_balance() {
        let ledger = Arc::new(MockLedger::scripted(
            vec![Ok(0), Err(NetworkError::Transient("timeout".to_string())), Ok(0), Ok(5_000)],
            0,
        ));
        let started = Instant::now();

        let amount = poller(ledger.clone())
            .poll_balance(Asset::Native, &Pubkey::new_unique())
            .await;

        assert_eq!(amount, Some(5_000));
        assert_eq!(ledger.calls(), 4);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_schedule_gives_up_after_cap() {
        let ledger = Arc::new(MockLedger::scripted(vec![], 0));
        let started = Instant::now();

        let amount = poller(ledger.clone())
            .poll_balance(Asset::Token(Pubkey::new_unique()), &Pubkey::new_unique())
            .await;

        assert_eq!(amount, None);
        assert_eq!(ledger.calls(), 50);
        // 49 waits of 10s between 50 attempts
        assert!(started.elapsed() >= Duration::from_secs(490));
        assert!(started.elapsed() < Duration::from_secs(500));
    }

    #[test]
    fn test_schedules_follow_asset() {
        let poller = poller(Arc::new(MockLedger::default()));
        assert_eq!(poller.schedule(Asset::Native).interval, Duration::from_secs(1));
        assert_eq!(
            poller.schedule(Asset::Token(Pubkey::new_unique())).interval,
            Duration::from_secs(10)
        );
    }
}
