use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use aurum_types::{Currency, PaymentMethod};
use rust_decimal::Decimal;
use rust_decimal::dec;
use thiserror::Error;

/// Where users send funds for a crypto deposit in a given currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoDepositAddress {
    pub currency: Currency,
    pub network: String,
    pub address: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid crypto deposit address entry '{0}', expected CURRENCY:NETWORK:ADDRESS")]
pub struct ParseAddressError(String);

impl FromStr for CryptoDepositAddress {
    type Err = ParseAddressError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let mut parts = entry.trim().splitn(3, ':').map(str::trim);
        let (Some(currency), Some(network), Some(address)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseAddressError(entry.to_string()));
        };

        let currency =
            Currency::from_str(currency).map_err(|_| ParseAddressError(entry.to_string()))?;
        if network.is_empty() || address.is_empty() {
            return Err(ParseAddressError(entry.to_string()));
        }

        Ok(Self {
            currency,
            network: network.to_string(),
            address: address.to_string(),
        })
    }
}

/// Deposit and withdrawal rules enforced by the orchestrator.
#[derive(Debug, Clone)]
pub struct DepositPolicy {
    pub initial_minimum: Decimal,
    pub standard_minimum: Decimal,
    pub allowed_methods: HashSet<PaymentMethod>,
    pub crypto_addresses: HashMap<Currency, CryptoDepositAddress>,
    /// Currency balances and withdrawals are denominated in.
    pub settlement_currency: Currency,
}

impl Default for DepositPolicy {
    fn default() -> Self {
        Self {
            initial_minimum: dec!(50),
            standard_minimum: dec!(10),
            allowed_methods: HashSet::from([
                PaymentMethod::BankTransfer,
                PaymentMethod::CreditCard,
                PaymentMethod::Crypto,
            ]),
            crypto_addresses: HashMap::new(),
            settlement_currency: Currency::USD,
        }
    }
}

impl DepositPolicy {
    pub const fn minimum(&self, is_initial: bool) -> Decimal {
        if is_initial {
            self.initial_minimum
        } else {
            self.standard_minimum
        }
    }

    #[must_use]
    pub fn with_crypto_addresses(
        mut self,
        addresses: impl IntoIterator<Item = CryptoDepositAddress>,
    ) -> Self {
        self.crypto_addresses
            .extend(addresses.into_iter().map(|a| (a.currency, a)));
        self
    }

    pub fn crypto_address(&self, currency: Currency) -> Option<&CryptoDepositAddress> {
        self.crypto_addresses.get(&currency)
    }
}

/// Runtime behaviour of the stale crypto deposit sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub crypto_deposit_ttl: Duration,
    pub error_backoff: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            crypto_deposit_ttl: Duration::from_secs(24 * 60 * 60),
            error_backoff: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crypto_address() {
        let parsed: CryptoDepositAddress = "usdt:tron:TXYZ123".parse().unwrap();
        assert_eq!(parsed.currency, Currency::USDT);
        assert_eq!(parsed.network, "tron");
        assert_eq!(parsed.address, "TXYZ123");

        // addresses may themselves contain ':'
        let parsed: CryptoDepositAddress = "BTC:bitcoin:bc1q:abc".parse().unwrap();
        assert_eq!(parsed.address, "bc1q:abc");
    }

    #[test]
    fn test_parse_crypto_address_rejects_malformed() {
        assert!("BTC".parse::<CryptoDepositAddress>().is_err());
        assert!("BTC:bitcoin:".parse::<CryptoDepositAddress>().is_err());
        assert!("DOGE:doge:D123".parse::<CryptoDepositAddress>().is_err());
    }

    #[test]
    fn test_minimums() {
        let policy = DepositPolicy::default();
        assert_eq!(policy.minimum(true), dec!(50));
        assert_eq!(policy.minimum(false), dec!(10));
    }
}
