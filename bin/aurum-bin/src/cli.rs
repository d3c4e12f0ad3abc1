use std::time::Duration;

use aurum_core::{CryptoDepositAddress, DepositPolicy, SweeperConfig};
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Process-local storage, lost on restart
    Memory,
    Postgres,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct AurumCli {
    /// Storage backend
    #[arg(long, env = "STORAGE", value_enum, default_value = "postgres")]
    pub storage: StorageBackend,

    /// Database URL, required with the postgres backend
    #[arg(long, env = "DATABASE_URL", required_if_eq("storage", "postgres"))]
    pub database_url: Option<String>,

    /// OTEL collector endpoint
    #[arg(long, env = "OTEL_COLLECTOR_ENDPOINT")]
    pub otel_collector_endpoint: Option<String>,

    /// API port
    #[arg(long, env = "API_PORT", default_value = "8080")]
    pub api_port: u16,

    /// Base URL of the identity provider
    #[arg(long, env = "AUTH_PROVIDER_URL")]
    pub auth_provider_url: Url,

    /// API key sent to the identity provider
    #[arg(long, env = "AUTH_PROVIDER_API_KEY")]
    pub auth_provider_api_key: String,

    /// Crypto deposit addresses, as CURRENCY:NETWORK:ADDRESS
    #[arg(long, env = "CRYPTO_DEPOSIT_ADDRESSES", value_delimiter = ',')]
    pub crypto_deposit_addresses: Vec<CryptoDepositAddress>,

    /// Minimum amount of the initial deposit
    #[arg(long, env = "INITIAL_DEPOSIT_MINIMUM", default_value = "50")]
    pub initial_deposit_minimum: Decimal,

    /// Minimum amount of any other deposit
    #[arg(long, env = "DEPOSIT_MINIMUM", default_value = "10")]
    pub deposit_minimum: Decimal,

    /// Seconds between two sweeps of stale crypto deposits
    #[arg(long, env = "SWEEPER_INTERVAL_SECS", default_value = "300")]
    pub sweeper_interval_secs: u64,

    /// Seconds a crypto deposit may stay pending before it expires
    #[arg(long, env = "CRYPTO_DEPOSIT_TTL_SECS", default_value = "86400")]
    pub crypto_deposit_ttl_secs: u64,
}

impl AurumCli {
    pub fn deposit_policy(&self) -> DepositPolicy {
        DepositPolicy {
            initial_minimum: self.initial_deposit_minimum,
            standard_minimum: self.deposit_minimum,
            ..DepositPolicy::default()
        }
        .with_crypto_addresses(self.crypto_deposit_addresses.iter().cloned())
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.sweeper_interval_secs),
            crypto_deposit_ttl: Duration::from_secs(self.crypto_deposit_ttl_secs),
            ..SweeperConfig::default()
        }
    }
}
