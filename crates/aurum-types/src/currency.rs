use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Display,
    AsRefStr,
    EnumString,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    USDT,
    USDC,
    BTC,
    ETH,
}

impl Currency {
    /// Whether the currency settles on-chain.
    pub const fn is_crypto(self) -> bool {
        matches!(self, Self::USDT | Self::USDC | Self::BTC | Self::ETH)
    }
}
