use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::PollerError;

/// Exchanges with a protocol adapter. Discriminants match the data source ids
/// stored in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeId {
    Binance = 2,
    Bitfinex = 7,
}

impl TryFrom<i64> for ExchangeId {
    type Error = PollerError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        match id {
            2 => Ok(ExchangeId::Binance),
            7 => Ok(ExchangeId::Bitfinex),
            other => Err(PollerError::UnknownExchange(other)),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SymbolPair {
    pub id: i64,
    pub market: Market,
    pub base: Symbol,
    pub quote: Symbol,
}

impl SymbolPair {
    /// Base and quote names glued together, e.g. `BTCUSDT`.
    pub fn concatenated(&self) -> String {
        format!("{}{}", self.base.name, self.quote.name)
    }
}

impl fmt::Display for SymbolPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base.name, self.quote.name)
    }
}

#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// One exchange as described by the repository. Read-only for a poll run.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub connection_string: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Maximum symbol pairs per connection, 0 means unlimited.
    #[serde(default)]
    pub rate_limit: usize,
    #[serde(default)]
    pub symbol_pairs: Vec<SymbolPair>,
}

/// Unified output data format.
///
/// Prices and volume are fixed-point: the decimal value times 10 000.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalQuote {
    pub symbol_pair: SymbolPair,
    pub market: Market,
    pub timestamp: DateTime<Utc>,
    pub rate: u64,
    pub open: u64,
    pub high: u64,
    pub low: u64,
    pub close: u64,
    pub volume: u64,
}

impl CanonicalQuote {
    /// Stamps the quote with the local receive time, for exchanges whose
    /// ticker payload carries no timestamp.
    pub fn new(pair: &SymbolPair, rate: u64, open: u64, high: u64, low: u64, volume: u64) -> Self {
        Self::new_with_timestamp(pair, rate, open, high, low, volume, Utc::now())
    }

    /// If the exchange returns an event time we use it as the quote timestamp.
    /// Otherwise we use current time (see `new` method).
    pub fn new_with_timestamp(
        pair: &SymbolPair,
        rate: u64,
        open: u64,
        high: u64,
        low: u64,
        volume: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol_pair: pair.clone(),
            market: pair.market.clone(),
            timestamp,
            rate,
            open,
            high,
            low,
            // exchanges only publish a last price
            close: rate,
            volume,
        }
    }
}
