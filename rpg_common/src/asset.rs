use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------        Asset         ---------------------------------------------------------
/// The closed set of payment assets a purchase request can be settled with.
///
/// `Card` payments are settled by the card processor webhook and never enter the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Eth,
    Usdc,
    Usdt,
    Card,
}

#[derive(Debug, Clone, Error)]
#[error("Unsupported asset: {0}")]
pub struct AssetConversionError(pub String);

impl Asset {
    /// Every asset that is paid on-chain and therefore handled by the reconciliation loop.
    pub const ON_CHAIN: [Asset; 4] = [Asset::Btc, Asset::Eth, Asset::Usdc, Asset::Usdt];

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Usdc => "USDC",
            Asset::Usdt => "USDT",
            Asset::Card => "CARD",
        }
    }

    /// Stablecoins are pegged to the dollar, so amounts are compared against the fiat price directly.
    pub fn is_stablecoin(&self) -> bool {
        matches!(self, Asset::Usdc | Asset::Usdt)
    }

    /// Volatile assets need a price quote to convert the fiat price into the native unit.
    pub fn is_volatile(&self) -> bool {
        matches!(self, Asset::Btc | Asset::Eth)
    }

    pub fn is_on_chain(&self) -> bool {
        !matches!(self, Asset::Card)
    }

    /// The number of decimal places in the smallest on-chain unit (satoshi, wei, token base units).
    pub fn decimals(&self) -> u32 {
        match self {
            Asset::Btc => 8,
            Asset::Eth => 18,
            Asset::Usdc | Asset::Usdt => 6,
            Asset::Card => 2,
        }
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = AssetConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            "USDC" => Ok(Self::Usdc),
            "USDT" => Ok(Self::Usdt),
            "CARD" => Ok(Self::Card),
            _ => Err(AssetConversionError(s.to_string())),
        }
    }
}
