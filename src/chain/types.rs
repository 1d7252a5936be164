//! Chain identifiers, payout variants and minor-unit amounts.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chains the engine knows how to identify.
///
/// Each variant maps to exactly one adapter in the registry at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    BitcoinCash,
    Solana,
    EthereumClassic,
    Tezos,
    Polkadot,
    Ethereum,
    Tron,
    Ripple,
}

impl ChainKind {
    pub const ALL: [ChainKind; 8] = [
        ChainKind::BitcoinCash,
        ChainKind::Solana,
        ChainKind::EthereumClassic,
        ChainKind::Tezos,
        ChainKind::Polkadot,
        ChainKind::Ethereum,
        ChainKind::Tron,
        ChainKind::Ripple,
    ];

    /// Ticker symbol of the native asset.
    pub fn ticker(&self) -> &'static str {
        match self {
            ChainKind::BitcoinCash => "BCH",
            ChainKind::Solana => "SOL",
            ChainKind::EthereumClassic => "ETC",
            ChainKind::Tezos => "XTZ",
            ChainKind::Polkadot => "DOT",
            ChainKind::Ethereum => "ETH",
            ChainKind::Tron => "TRX",
            ChainKind::Ripple => "XRP",
        }
    }

    /// Number of decimal places between the display unit and the minor unit.
    pub fn decimals(&self) -> u32 {
        match self {
            ChainKind::BitcoinCash => 8,
            ChainKind::Solana => 9,
            ChainKind::EthereumClassic | ChainKind::Ethereum => 18,
            ChainKind::Tezos => 6,
            ChainKind::Polkadot => 10,
            ChainKind::Tron => 6,
            ChainKind::Ripple => 6,
        }
    }

    /// Name of the minor unit balances are denominated in.
    pub fn minor_unit(&self) -> &'static str {
        match self {
            ChainKind::BitcoinCash => "satoshi",
            ChainKind::Solana => "lamport",
            ChainKind::EthereumClassic | ChainKind::Ethereum => "wei",
            ChainKind::Tezos => "mutez",
            ChainKind::Polkadot => "planck",
            ChainKind::Tron => "sun",
            ChainKind::Ripple => "drop",
        }
    }

    /// How winnings are released on this chain unless configured otherwise.
    pub fn default_payout_mode(&self) -> PayoutMode {
        match self {
            ChainKind::EthereumClassic | ChainKind::Tron | ChainKind::Ripple => {
                PayoutMode::AuthorizedContract
            }
            _ => PayoutMode::DirectTransfer,
        }
    }

    /// Whether the built-in alloy adapters can serve this chain.
    pub fn is_evm(&self) -> bool {
        matches!(self, ChainKind::Ethereum | ChainKind::EthereumClassic)
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ChainKind::ALL
            .into_iter()
            .find(|c| {
                c.ticker().eq_ignore_ascii_case(&wanted)
                    || serde_json::to_value(c)
                        .ok()
                        .and_then(|v| v.as_str().map(|name| name == wanted))
                        .unwrap_or(false)
            })
            .ok_or_else(|| format!("unknown chain '{}'", s))
    }
}

/// The two ways a settlement can be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    /// The engine holds the escrow key and signs the transfer itself.
    DirectTransfer,
    /// Funds sit behind a contract/hook; the engine only attests the winner.
    AuthorizedContract,
}

impl fmt::Display for PayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutMode::DirectTransfer => f.write_str("direct"),
            PayoutMode::AuthorizedContract => f.write_str("authorized"),
        }
    }
}

/// Errors parsing a human-readable amount.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("invalid amount '{0}'")]
    Invalid(String),

    #[error("amount has more than {0} decimal places")]
    TooPrecise(u32),

    #[error("amount overflows minor-unit range")]
    Overflow,
}

/// An amount in a chain's minor unit (satoshi, wei, drop, ...).
///
/// Serialized as a decimal string since wei balances exceed 64 bits.
/// Deserialization also accepts plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(minor_units: u128) -> Self {
        Self(minor_units)
    }

    pub const fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u128) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Parse a decimal string such as `"1.5"` into minor units.
    pub fn parse_decimal(input: &str, decimals: u32) -> Result<Amount, AmountError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, frac) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Invalid(input.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::Invalid(input.to_string()));
        }
        if frac.len() as u32 > decimals {
            return Err(AmountError::TooPrecise(decimals));
        }

        let scale = 10u128.checked_pow(decimals).ok_or(AmountError::Overflow)?;
        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };

        let mut frac_units: u128 = 0;
        if !frac.is_empty() {
            let padded = format!("{:0<width$}", frac, width = decimals as usize);
            frac_units = padded.parse().map_err(|_| AmountError::Overflow)?;
        }

        whole_units
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac_units))
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    /// Render in display units, trimming trailing zeros.
    pub fn format_decimal(&self, decimals: u32) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let scale = 10u128.pow(decimals);
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:0>width$}", frac, width = decimals as usize);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(v as u128)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer amount in minor units")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(v as u128))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u128::try_from(v)
                    .map(Amount)
                    .map_err(|_| E::custom("amount must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.trim()
                    .parse::<u128>()
                    .map(Amount)
                    .map_err(|_| E::custom(format!("invalid amount '{}'", v)))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
