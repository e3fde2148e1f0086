//! CLI commands and handlers

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tracing::{info, warn};

use super::seed::SeedFile;
use super::services::HopwatchService;
use crate::domain::position::{NewPosition, PositionFilter, PositionStatus};
use crate::domain::pricing::curve_for;
use crate::shared::types::{AppConfig, Asset, LAMPORTS_PER_SOL};
use crate::shared::utils::{calculate_percentage_change, format_amount};

#[derive(Parser)]
#[command(name = "hopwatch", version)]
#[command(about = "Two-hop DEX route scanner and trailing stop-loss tracker for Solana")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "Config.toml")]
    pub config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// RPC endpoint, overrides config and environment
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Database URL, overrides config and environment
    #[arg(long)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Command line flags win over the file and the environment
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(url) = &self.rpc_url {
            config.network.rpc_url = url.clone();
        }
        if let Some(url) = &self.database_url {
            config.store.database_url = url.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll routes and positions until interrupted
    Run,

    /// Show enabled routes with their current spread
    Routes,

    /// List stored positions
    Positions {
        /// Only positions in this status (active, idle, stopped)
        #[arg(long)]
        status: Option<PositionStatus>,
    },

    /// Quote a single swap against a stored pool
    Quote {
        #[arg(long)]
        pool: Pubkey,

        #[arg(long)]
        input_mint: Pubkey,

        /// Input amount in base units
        #[arg(long)]
        amount: u64,

        /// Slippage tolerance as a fraction, defaults to trading.slippage
        #[arg(long)]
        slippage: Option<Decimal>,
    },

    /// Show the SOL or token balance of a wallet
    Balance {
        #[arg(long)]
        owner: Pubkey,

        /// Token mint; native SOL when omitted
        #[arg(long)]
        mint: Option<Pubkey>,
    },

    /// Start tracking a bought position
    Open {
        #[arg(long)]
        owner: Pubkey,

        #[arg(long)]
        mint: Pubkey,

        #[arg(long)]
        symbol: String,

        /// Token decimals; read from the mint account when omitted
        #[arg(long)]
        decimals: Option<u8>,

        /// Price paid, in the quote mint per token
        #[arg(long)]
        buy_price: f64,

        /// Amount bought in base units; polled from the wallet when omitted
        #[arg(long)]
        amount: Option<u64>,

        /// Trailing stop distance below the high, in percent
        #[arg(long)]
        stop_loss_pct: Option<f64>,

        /// Do not refresh this position in the poll loop
        #[arg(long)]
        no_scan: bool,
    },

    /// Create the schema and optionally load pools and routes from a seed file
    InitDb {
        #[arg(long)]
        seed: Option<PathBuf>,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        let service = HopwatchService::connect(&config)
            .await
            .context("Failed to start service")?;

        let result = match command {
            Commands::Run => Self::execute_run_command(&service).await,
            Commands::Routes => Self::execute_routes_command(&service).await,
            Commands::Positions { status } => Self::execute_positions_command(&service, status).await,
            Commands::Quote {
                pool,
                input_mint,
                amount,
                slippage,
            } => Self::execute_quote_command(&service, pool, input_mint, amount, slippage).await,
            Commands::Balance { owner, mint } => Self::execute_balance_command(&service, owner, mint).await,
            Commands::Open {
                owner,
                mint,
                symbol,
                decimals,
                buy_price,
                amount,
                stop_loss_pct,
                no_scan,
            } => {
                async {
                    let decimals = match decimals {
                        Some(decimals) => decimals,
                        None => service
                            .mint_decimals(&mint)
                            .await
                            .with_context(|| format!("Failed to read decimals of {}", mint))?,
                    };
                    let request = NewPosition {
                        owner,
                        mint,
                        symbol,
                        decimals,
                        buy_amount: amount,
                        buy_price,
                        stop_loss_percentage: stop_loss_pct,
                        enable_scan: !no_scan,
                        enable_trade: false,
                    };
                    Self::execute_open_command(&service, request).await
                }
                .await
            }
            Commands::InitDb { seed } => Self::execute_init_db_command(&service, seed).await,
        };

        service.close().await;
        result
    }

    async fn execute_run_command(service: &HopwatchService) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
            let _ = shutdown_tx.send(true);
        });

        println!("🚀 Polling every {} ms", service.config().scheduler.interval_ms);
        service.run(shutdown_rx).await.context("Poll loop failed")?;
        println!("👋 Stopped");
        Ok(())
    }

    async fn execute_routes_command(service: &HopwatchService) -> Result<()> {
        let views = service.scan_routes().await.context("Failed to scan routes")?;
        if views.is_empty() {
            println!("❌ No enabled routes with readable pools");
            return Ok(());
        }

        let trading = &service.config().trading;
        println!("📊 {} enabled routes", views.len());
        for view in views {
            let route = &view.route;
            println!(
                "  #{} {} -> {} -> {} via {} ({}) / {} ({})",
                route.id(),
                route.record.token0,
                route.record.token1,
                route.record.token2,
                route.record.pool_a.address,
                route.record.pool_a.dex,
                route.record.pool_b.address,
                route.record.pool_b.dex,
            );
            match view.spread {
                Ok(spread) => {
                    let marker = if spread.is_profitable(trading.min_net_spread_bps, trading.max_price_deviation_pct) {
                        "✅"
                    } else if !spread.is_plausible(trading.max_price_deviation_pct) {
                        "⚠️ "
                    } else {
                        "  "
                    };
                    println!(
                        "     {} price A {:.6} | price B {:.6} | gap {:+.3}% | net {:+.1} bps ({:?})",
                        marker,
                        spread.price_a,
                        spread.price_b,
                        spread.deviation_pct(),
                        spread.net_spread_bps,
                        spread.direction
                    );
                }
                Err(e) => println!("     ⚠️  no spread: {}", e),
            }
        }
        Ok(())
    }

    async fn execute_positions_command(service: &HopwatchService, status: Option<PositionStatus>) -> Result<()> {
        let positions = service
            .tracker()
            .positions(PositionFilter::from(status))
            .await
            .context("Failed to load positions")?;
        if positions.is_empty() {
            println!("No positions");
            return Ok(());
        }

        for p in positions {
            println!(
                "#{} {} [{}] scan={} trade={}",
                p.id, p.symbol, p.status, p.enable_scan, p.enable_trade
            );
            println!(
                "    amount {} (bought {}) | price {:.9} ({:+.2}%) | high {:.9} | stop {}",
                format_amount(p.current_amount, p.decimals),
                format_amount(p.buy_amount, p.decimals),
                p.current_price,
                calculate_percentage_change(p.buy_price, p.current_price),
                p.highest_price,
                p.stop_loss_price
                    .map(|stop| format!("{:.9}", stop))
                    .unwrap_or_else(|| "-".to_string()),
            );
            println!(
                "    max sell value {:.6} | profit {} ({})",
                p.max_sell_value,
                p.profit_amount,
                p.profit_percentage
                    .map(|pct| format!("{:+.2}%", pct))
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        Ok(())
    }

    async fn execute_quote_command(
        service: &HopwatchService,
        pool: Pubkey,
        input_mint: Pubkey,
        amount: u64,
        slippage: Option<Decimal>,
    ) -> Result<()> {
        let (record, output) = service
            .quote(&pool, &input_mint, amount, slippage)
            .await
            .with_context(|| format!("Failed to quote pool {}", pool))?;

        let (in_decimals, out_decimals) = if output.input_mint == record.base_mint {
            (record.base_decimals, record.quote_decimals)
        } else {
            (record.quote_decimals, record.base_decimals)
        };
        let curve = curve_for(&record.dex).map(|curve| curve.name()).unwrap_or("unsupported");
        println!("💱 {} ({}, {})", record.address, record.dex, curve);
        println!("   in:      {} {}", format_amount(output.amount_in, in_decimals), output.input_mint);
        println!("   out:     {} {}", format_amount(output.amount_out, out_decimals), output.output_mint);
        println!("   min out: {}", format_amount(output.min_amount_out, out_decimals));
        Ok(())
    }

    async fn execute_balance_command(service: &HopwatchService, owner: Pubkey, mint: Option<Pubkey>) -> Result<()> {
        let asset = mint.map(Asset::Token).unwrap_or(Asset::Native);
        let amount = service
            .balance(&owner, asset)
            .await
            .with_context(|| format!("Failed to read {} balance of {}", asset, owner))?;

        match asset {
            Asset::Native => println!("💰 {} SOL ({} lamports)", amount as f64 / LAMPORTS_PER_SOL as f64, amount),
            Asset::Token(mint) => println!("💰 {} of {}", amount, mint),
        }
        Ok(())
    }

    async fn execute_open_command(service: &HopwatchService, request: NewPosition) -> Result<()> {
        if request.buy_amount.is_none() {
            println!("⏳ Waiting for {} to arrive in {}", request.symbol, request.owner);
        }
        let position = service
            .tracker()
            .open_position(request)
            .await
            .context("Failed to open position")?;
        println!(
            "✅ Position #{} {} opened with {} at {}",
            position.id,
            position.symbol,
            format_amount(position.buy_amount, position.decimals),
            position.buy_price
        );
        Ok(())
    }

    async fn execute_init_db_command(service: &HopwatchService, seed: Option<PathBuf>) -> Result<()> {
        println!("✅ Schema ready at {}", service.config().store.database_url);
        let Some(path) = seed else {
            return Ok(());
        };

        let seed = SeedFile::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
        let (pools, routes) = service.seed(seed).await.context("Failed to seed store")?;
        println!("🌱 {} pools written, {} new routes", pools, routes);
        Ok(())
    }
}
