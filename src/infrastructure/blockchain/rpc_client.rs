//! Solana RPC access behind the narrow ledger interface the core calls

use std::str::FromStr;

use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::{Account as TokenAccount, Mint};
use tracing::warn;

use crate::shared::errors::NetworkError;
use crate::shared::types::{Asset, NetworkConfig};

/// `getMultipleAccounts` accepts at most this many keys per request
const MAX_MULTIPLE_ACCOUNTS: usize = 100;

/// Balance and account queries against the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Lamports held by `owner`
    async fn native_balance(&self, owner: &Pubkey) -> Result<u64, NetworkError>;

    /// Sum of `mint` held across the owner's token accounts
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, NetworkError>;

    /// Amount held by each SPL token account, `None` where the account does not exist
    async fn token_account_amounts(&self, accounts: &[Pubkey]) -> Result<Vec<Option<u64>>, NetworkError>;

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, NetworkError>;

    async fn balance(&self, asset: Asset, owner: &Pubkey) -> Result<u64, NetworkError> {
        match asset {
            Asset::Native => self.native_balance(owner).await,
            Asset::Token(mint) => self.token_balance(owner, &mint).await,
        }
    }
}

fn transient(context: &str, err: ClientError) -> NetworkError {
    NetworkError::Transient(format!("{}: {}", context, err))
}

/// Unpack the base SPL token account layout. Token-2022 accounts carry extensions after it.
fn unpack_token_amount(account: &Pubkey, data: &[u8]) -> Result<u64, NetworkError> {
    if data.len() < TokenAccount::LEN {
        return Err(NetworkError::InvalidResponse(format!(
            "{} is not a token account ({} bytes)",
            account,
            data.len()
        )));
    }
    TokenAccount::unpack(&data[..TokenAccount::LEN])
        .map(|parsed| parsed.amount)
        .map_err(|e| NetworkError::InvalidResponse(format!("{}: {}", account, e)))
}

/// Solana RPC client wrapper
pub struct SolanaRpcClient {
    client: RpcClient,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: String, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url, commitment),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        let commitment = CommitmentConfig::from_str(&config.commitment).unwrap_or_else(|_| {
            warn!("Unknown commitment '{}', using confirmed", config.commitment);
            CommitmentConfig::confirmed()
        });
        Self::new(config.rpc_url.clone(), commitment)
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl LedgerClient for SolanaRpcClient {
    async fn native_balance(&self, owner: &Pubkey) -> Result<u64, NetworkError> {
        self.client
            .get_balance(owner)
            .await
            .map_err(|e| transient("getBalance", e))
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, NetworkError> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            .await
            .map_err(|e| transient("getTokenAccountsByOwner", e))?;

        let mut total: u64 = 0;
        for keyed in accounts {
            let data = serde_json::to_value(&keyed.account.data)
                .map_err(|e| NetworkError::InvalidResponse(format!("{}: {}", keyed.pubkey, e)))?;
            let amount = data
                .pointer("/parsed/info/tokenAmount/amount")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    NetworkError::InvalidResponse(format!("{}: missing token amount", keyed.pubkey))
                })?;
            let amount: u64 = amount
                .parse()
                .map_err(|_| NetworkError::InvalidResponse(format!("{}: bad amount {}", keyed.pubkey, amount)))?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| NetworkError::InvalidResponse("token balance overflow".to_string()))?;
        }
        Ok(total)
    }

    async fn token_account_amounts(&self, accounts: &[Pubkey]) -> Result<Vec<Option<u64>>, NetworkError> {
        let mut amounts = Vec::with_capacity(accounts.len());
        for chunk in accounts.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let fetched = self
                .client
                .get_multiple_accounts(chunk)
                .await
                .map_err(|e| transient("getMultipleAccounts", e))?;
            for (key, account) in chunk.iter().zip(fetched) {
                amounts.push(match account {
                    Some(account) => Some(unpack_token_amount(key, &account.data)?),
                    None => None,
                });
            }
        }
        Ok(amounts)
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, NetworkError> {
        let account = self
            .client
            .get_account(mint)
            .await
            .map_err(|e| transient("getAccount", e))?;
        if account.data.len() < Mint::LEN {
            return Err(NetworkError::InvalidResponse(format!("{} is not a mint", mint)));
        }
        Mint::unpack(&account.data[..Mint::LEN])
            .map(|parsed| parsed.decimals)
            .map_err(|e| NetworkError::InvalidResponse(format!("{}: {}", mint, e)))
    }
}
