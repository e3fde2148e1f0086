//! Hopwatch - two-hop DEX route scanner and trailing stop-loss tracker for Solana
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::{HopwatchService, PollScheduler, PositionTracker};
pub use domain::pricing::compute_swap_output;
pub use domain::route::{RouteAggregator, TwoHopRoute};
pub use infrastructure::gateway::ResilientStore;
pub use shared::config::ConfigLoader;
pub use shared::errors::AppError;
