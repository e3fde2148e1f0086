//! Seed file - pools and routes to load into a fresh store

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

use crate::domain::pool::{fee_from_bps, fee_from_percent, DexKind, PoolRecord};
use crate::domain::route::{NewRoute, PoolLeg, RouteStatus};
use crate::shared::errors::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub pools: Vec<PoolSeed>,
    pub routes: Vec<RouteSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSeed {
    pub address: String,
    pub dex: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub base_vault: String,
    pub quote_vault: String,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Fee in basis points (Raydium style)
    pub fee_bps: Option<u32>,
    /// Fee in percent (Meteora style)
    pub fee_percent: Option<Decimal>,
    pub amplification: Option<u64>,
    pub bin_step: Option<u16>,
    pub active_bin_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSeed {
    pub pool_a: String,
    pub pool_b: String,
    pub token0: String,
    pub token1: String,
    /// Defaults to `token0`, a round trip
    pub token2: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn pubkey(field: &str, value: &str) -> Result<Pubkey, AppError> {
    Pubkey::from_str(value).map_err(|e| AppError::ConfigError(format!("{} '{}': {}", field, value, e)))
}

impl PoolSeed {
    fn fee_rate(&self) -> Result<Decimal, AppError> {
        let fee = match (self.fee_bps, self.fee_percent) {
            (Some(bps), None) => fee_from_bps(bps),
            (None, Some(percent)) => fee_from_percent(percent),
            (None, None) => Decimal::ZERO,
            (Some(_), Some(_)) => {
                return Err(AppError::ConfigError(format!(
                    "pool {} sets both fee_bps and fee_percent",
                    self.address
                )))
            }
        };
        if fee < Decimal::ZERO || fee >= Decimal::ONE {
            return Err(AppError::ConfigError(format!("pool {} fee out of range: {}", self.address, fee)));
        }
        Ok(fee)
    }

    pub fn to_record(&self) -> Result<PoolRecord, AppError> {
        Ok(PoolRecord {
            address: pubkey("address", &self.address)?,
            dex: DexKind::from(self.dex.as_str()),
            base_mint: pubkey("base_mint", &self.base_mint)?,
            quote_mint: pubkey("quote_mint", &self.quote_mint)?,
            base_vault: pubkey("base_vault", &self.base_vault)?,
            quote_vault: pubkey("quote_vault", &self.quote_vault)?,
            base_decimals: self.base_decimals,
            quote_decimals: self.quote_decimals,
            fee_rate: self.fee_rate()?,
            amplification: self.amplification,
            bin_step: self.bin_step,
            active_bin_id: self.active_bin_id,
        })
    }
}

impl SeedFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::ConfigError(format!("Failed to read seed file: {}", e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AppError> {
        toml::from_str(content).map_err(|e| AppError::ConfigError(format!("Failed to parse seed file: {}", e)))
    }

    /// Pool records and the routes over them. Route legs start without reserves.
    pub fn into_records(self) -> Result<(Vec<PoolRecord>, Vec<NewRoute>), AppError> {
        let pools = self
            .pools
            .iter()
            .map(PoolSeed::to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let by_address: HashMap<Pubkey, &PoolRecord> = pools.iter().map(|p| (p.address, p)).collect();

        let leg = |address: &str| -> Result<PoolLeg, AppError> {
            let key = pubkey("route pool", address)?;
            by_address
                .get(&key)
                .map(|pool| PoolLeg::from_record(pool))
                .ok_or_else(|| AppError::ConfigError(format!("route references unknown pool {}", address)))
        };

        let routes = self
            .routes
            .iter()
            .map(|seed| {
                let token0 = pubkey("token0", &seed.token0)?;
                let token2 = match &seed.token2 {
                    Some(token2) => pubkey("token2", token2)?,
                    None => token0,
                };
                Ok(NewRoute {
                    pool_a: leg(&seed.pool_a)?,
                    pool_b: leg(&seed.pool_b)?,
                    token0,
                    token1: pubkey("token1", &seed.token1)?,
                    token2,
                    status: if seed.enabled {
                        RouteStatus::Enabled
                    } else {
                        RouteStatus::Disabled
                    },
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok((pools, routes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const WSOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn seed(pool_b: &str) -> String {
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let vaults: Vec<String> = (0..4).map(|_| Pubkey::new_unique().to_string()).collect();
        let pool_b = if pool_b.is_empty() { b.to_string() } else { pool_b.to_string() };
        format!(
            r#"
            [[pools]]
            address = "{a}"
            dex = "raydium"
            base_mint = "{WSOL}"
            quote_mint = "{USDC}"
            base_vault = "{v0}"
            quote_vault = "{v1}"
            base_decimals = 9
            quote_decimals = 6
            fee_bps = 25

            [[pools]]
            address = "{b}"
            dex = "meteora"
            base_mint = "{WSOL}"
            quote_mint = "{USDC}"
            base_vault = "{v2}"
            quote_vault = "{v3}"
            base_decimals = 9
            quote_decimals = 6
            fee_percent = 0.2
            bin_step = 10
            active_bin_id = -4000

            [[routes]]
            pool_a = "{a}"
            pool_b = "{pool_b}"
            token0 = "{WSOL}"
            token1 = "{USDC}"
            "#,
            v0 = vaults[0],
            v1 = vaults[1],
            v2 = vaults[2],
            v3 = vaults[3],
        )
    }

    #[test]
    fn test_seed_builds_pools_and_round_trip_route() {
        let (pools, routes) = SeedFile::parse(&seed("")).unwrap().into_records().unwrap();

        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].fee_rate, dec!(0.0025));
        assert_eq!(pools[1].fee_rate, dec!(0.002));
        assert_eq!(pools[1].dex, DexKind::MeteoraDlmm);
        assert_eq!(pools[1].active_bin_id, Some(-4000));

        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.token0, route.token2);
        assert_eq!(route.status, RouteStatus::Enabled);
        assert_eq!(route.pool_a.address, pools[0].address);
        assert_eq!(route.pool_b.base_reserve, 0);
    }

    #[test]
    fn test_route_to_unknown_pool_rejected() {
        let unknown = Pubkey::new_unique().to_string();
        let err = SeedFile::parse(&seed(&unknown)).unwrap().into_records().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("unknown pool")));
    }

    #[test]
    fn test_pool_with_two_fees_rejected() {
        let mut pool = SeedFile::parse(&seed("")).unwrap().pools.remove(0);
        pool.fee_percent = Some(dec!(0.25));
        assert!(pool.to_record().is_err());
    }
}
