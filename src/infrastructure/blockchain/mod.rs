//! Ledger access for balances and pool reserves

pub mod balance_poller;
pub mod rpc_client;
pub mod vault_reader;

pub use balance_poller::{BalancePoller, PollSchedule};
pub use rpc_client::{LedgerClient, SolanaRpcClient};
pub use vault_reader::{ReserveFeed, VaultReserveFeed};
