//! Error handling for the application

use thiserror::Error;

/// Swap pricing errors. None of these are retryable: the input is rejected as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Input mint {mint} is not part of pool {pool}")]
    InvalidInputMint { pool: String, mint: String },

    #[error("Insufficient reserve in pool {0}")]
    InsufficientReserve(String),

    #[error("No pricing curve for DEX: {0}")]
    UnsupportedCurve(String),

    #[error("Swap amount must be positive")]
    InvalidAmount,

    #[error("Slippage tolerance must be in (0, 1), got {0}")]
    InvalidSlippage(String),
}

/// Pool-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Invalid snapshot for pool {pool}: {reason}")]
    InvalidSnapshot { pool: String, reason: String },
}

/// Store-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Failed to decode row: {0}")]
    Decode(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row",
                id: "?".to_string(),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Transient(err.to_string()),
            sqlx::Error::Database(db) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6) clear up on their own.
                match db.code().as_deref() {
                    Some("5") | Some("6") => StoreError::Transient(db.to_string()),
                    _ if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation() => {
                        StoreError::Constraint(db.to_string())
                    }
                    _ => StoreError::Decode(db.to_string()),
                }
            }
            other => StoreError::Decode(other.to_string()),
        }
    }
}

/// Ledger / RPC errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Network error: {0}")]
    Transient(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetworkError::Transient(_))
    }
}

/// Route assembly errors. The aggregator logs these and moves on to the next route.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Route {route_id}: no snapshot for pool {pool}")]
    RouteDataMissing { route_id: i64, pool: String },

    #[error("Route {route_id}: {reason}")]
    InvalidRoute { route_id: i64, reason: String },
}

/// Trading position state machine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Position {0} is stopped")]
    Stopped(i64),

    #[error("Position {id}: invalid price {price}")]
    InvalidPrice { id: i64, price: f64 },

    #[error("Position {id}: stop loss {stop} is above highest price {highest}")]
    StopAboveHigh { id: i64, stop: f64, highest: f64 },

    #[error("Position {id}: stop loss percentage {percentage} outside (0, 100)")]
    InvalidStopLossPercentage { id: i64, percentage: f64 },
}

/// Unrecognised status label read from the store or the command line
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown {kind} status: {value}")]
pub struct StatusParseError {
    pub kind: &'static str,
    pub value: String,
}

/// Errors surfaced by the resilient persistence gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("{operation} failed: {source}")]
    NonRetryable {
        operation: String,
        #[source]
        source: StoreError,
    },
}

impl GatewayError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            GatewayError::RetryExhausted { source, .. } => source,
            GatewayError::NonRetryable { source, .. } => source,
        }
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("No {asset} balance for {owner} after polling")]
    BalanceNotFound { asset: String, owner: String },

    #[error(transparent)]
    Status(#[from] StatusParseError),
}
