//! Common types used across the application

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// Native SOL mint, used as the default quote asset for position valuation
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Asset whose balance the ledger is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    /// Native SOL held directly by the owner
    Native,
    /// SPL token held in any token account of the owner
    Token(Pubkey),
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Native => write!(f, "SOL"),
            Asset::Token(mint) => write!(f, "{}", mint),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub commitment: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
        }
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://hopwatch.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Bounded retry settings for store access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

/// One balance polling schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollScheduleConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl PollScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Balance poller settings. Token accounts settle slower than native transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub native: PollScheduleConfig,
    pub token: PollScheduleConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            native: PollScheduleConfig {
                interval_ms: 1_000,
                max_attempts: 50,
            },
            token: PollScheduleConfig {
                interval_ms: 10_000,
                max_attempts: 50,
            },
        }
    }
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_ms: u64,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_concurrency: 8,
            queue_capacity: 256,
        }
    }
}

/// Trading thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Mint that position prices are quoted in
    pub quote_mint: String,
    /// Slippage tolerance as a fraction, 0.01 = 1%
    pub slippage: Decimal,
    /// Spreads beyond this percentage are treated as bad data
    pub max_price_deviation_pct: f64,
    /// Net spread (after fees) a route needs to be flagged profitable
    pub min_net_spread_bps: f64,
    /// Input amount, in base units of token0, used to quote round trips
    pub probe_amount: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_mint: WSOL_MINT.to_string(),
            slippage: dec!(0.01),
            max_price_deviation_pct: 90.0,
            min_net_spread_bps: 10.0,
            probe_amount: LAMPORTS_PER_SOL / 10,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub store: StoreConfig,
    pub retry: RetryConfig,
    pub poller: PollerConfig,
    pub scheduler: SchedulerConfig,
    pub trading: TradingConfig,
}
