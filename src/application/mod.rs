//! Application layer - use cases and services

pub mod commands;
pub mod scheduler;
pub mod seed;
pub mod services;
pub mod tracker;

pub use commands::{Cli, CommandExecutor, Commands};
pub use scheduler::{CycleReport, PollScheduler, WorkItem};
pub use services::HopwatchService;
pub use tracker::{PositionTracker, RefreshOutcome};
