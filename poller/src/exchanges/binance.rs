use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::normalizer::{field, to_fixed_point};
use super::{Connection, ExchangeAdapter, Frame};
use crate::error::{ConnectionError, QuoteError};
use crate::model::{CanonicalQuote, SymbolPair};

// Maximal age of connection is 24 hours
const BINANCE_CONNECTION_AGE_LIMIT_SECONDS: u64 = 24 * 60 * 60;
const BINANCE_RECONNECTION_FREQUENCY_SECONDS: u64 = BINANCE_CONNECTION_AGE_LIMIT_SECONDS - 60;

const BINANCE_SUBSCRIBE_METHOD: &str = "SUBSCRIBE";
const BINANCE_TICKER_EVENT: &str = "24hrTicker";
const BINANCE_SUBSCRIBE_REQUEST_ID: u64 = 1;

#[derive(Serialize, Debug)]
struct BinanceSubscribeRequest {
    method: &'static str,
    params: Vec<String>,
    id: u64,
}

/// 24hr rolling window ticker. Only the fields we store are decoded.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BinanceTicker {
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time, epoch milliseconds.
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "o")]
    pub open_price: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "v")]
    pub volume: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct BinanceApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinanceControl {
    /// Acknowledgement of our subscribe request.
    Subscribed { id: u64 },
    /// Response to some other request id.
    Response { id: u64, result: Value },
    Error {
        id: Option<u64>,
        code: i64,
        msg: String,
    },
}

pub struct BinanceAdapter {
    pairs: Vec<SymbolPair>,
    request_id: u64,
}

impl BinanceAdapter {
    pub fn stream_names(&self) -> Vec<String> {
        self.pairs
            .iter()
            .map(|pair| {
                format!(
                    "{}{}@ticker",
                    pair.base.name.to_lowercase(),
                    pair.quote.name.to_lowercase()
                )
            })
            .collect()
    }

    fn find_symbol_pair(&self, symbol: &str) -> Option<&SymbolPair> {
        self.pairs
            .iter()
            .find(|pair| pair.concatenated().eq_ignore_ascii_case(symbol))
    }

    fn classify_error(id: Option<u64>, error: Value) -> Frame<BinanceTicker, BinanceControl> {
        match serde_json::from_value::<BinanceApiError>(error) {
            Ok(error) => Frame::Control(BinanceControl::Error {
                id,
                code: error.code,
                msg: error.msg,
            }),
            Err(error) => Frame::Unrecognized(format!("error response: {}", error)),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    type Update = BinanceTicker;
    type Control = BinanceControl;

    const NAME: &'static str = "binance";
    const MAX_CONNECTION_AGE: Option<Duration> =
        Some(Duration::from_secs(BINANCE_RECONNECTION_FREQUENCY_SECONDS));

    fn for_chunk(pairs: Vec<SymbolPair>) -> Self {
        Self {
            pairs,
            request_id: BINANCE_SUBSCRIBE_REQUEST_ID,
        }
    }

    fn pairs(&self) -> &[SymbolPair] {
        &self.pairs
    }

    async fn subscribe(&mut self, connection: &mut Connection) -> Result<(), ConnectionError> {
        let request = BinanceSubscribeRequest {
            method: BINANCE_SUBSCRIBE_METHOD,
            params: self.stream_names(),
            id: self.request_id,
        };

        // The acknowledgement arrives among the ticker frames.
        connection.send_json(&request).await
    }

    fn classify(&self, raw: &str) -> Frame<BinanceTicker, BinanceControl> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(error) => return Frame::Unrecognized(format!("invalid json: {}", error)),
        };

        let Value::Object(object) = &value else {
            return Frame::Unrecognized("expected a json object".to_string());
        };

        if let Some(event_type) = object.get("e") {
            if event_type.as_str() != Some(BINANCE_TICKER_EVENT) {
                return Frame::Unrecognized(format!("unexpected event type {}", event_type));
            }

            return match serde_json::from_value::<BinanceTicker>(value) {
                Ok(ticker) => Frame::Update(ticker),
                Err(error) => Frame::Unrecognized(format!("ticker: {}", error)),
            };
        }

        let id = object.get("id").and_then(Value::as_u64);

        if let Some(error) = object.get("error") {
            return Self::classify_error(id, error.clone());
        }

        if object.contains_key("code") && object.contains_key("msg") {
            return Self::classify_error(id, value);
        }

        match (id, object.get("result")) {
            (Some(id), Some(_)) if id == self.request_id => {
                Frame::Control(BinanceControl::Subscribed { id })
            }
            (Some(id), Some(result)) => Frame::Control(BinanceControl::Response {
                id,
                result: result.clone(),
            }),
            _ => Frame::Unrecognized("object is neither a ticker nor a response".to_string()),
        }
    }

    fn parse(&self, ticker: BinanceTicker) -> Result<CanonicalQuote, QuoteError> {
        let pair = self
            .find_symbol_pair(&ticker.symbol)
            .ok_or_else(|| QuoteError::UnknownSymbol(ticker.symbol.clone()))?;

        let timestamp = Utc
            .timestamp_millis_opt(ticker.event_time)
            .single()
            .ok_or(QuoteError::InvalidTimestamp(ticker.event_time))?;

        let rate = field("last_price", to_fixed_point(&ticker.last_price))?;
        let open = field("open_price", to_fixed_point(&ticker.open_price))?;
        let high = field("high_price", to_fixed_point(&ticker.high_price))?;
        let low = field("low_price", to_fixed_point(&ticker.low_price))?;
        let volume = field("volume", to_fixed_point(&ticker.volume))?;

        Ok(CanonicalQuote::new_with_timestamp(
            pair, rate, open, high, low, volume, timestamp,
        ))
    }

    fn on_control(&mut self, control: BinanceControl) -> Result<(), ConnectionError> {
        match control {
            BinanceControl::Subscribed { id } => {
                info!(exchange = Self::NAME, id, streams = ?self.stream_names(), "subscribed to Binance streams");
            }
            BinanceControl::Response { id, result } => {
                debug!(exchange = Self::NAME, id, %result, "response to request");
            }
            BinanceControl::Error { id, code, msg } => {
                warn!(exchange = Self::NAME, ?id, code, %msg, "error from Binance API");
            }
        }
        Ok(())
    }
}
