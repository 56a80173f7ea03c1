use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::normalizer::{field, value_to_fixed_point};
use super::tracker::SubscriptionTracker;
use super::{deliver, describe, handle_classified, Connection, ExchangeAdapter, Frame, Incoming};
use crate::error::{ConnectionError, QuoteError};
use crate::model::{CanonicalQuote, SymbolPair};

const BITFINEX_EVENT_SUBSCRIBE: &str = "subscribe";
const BITFINEX_TICKER_CHANNEL: &str = "ticker";
const BITFINEX_HEARTBEAT: &str = "hb";

// [BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE, LAST_PRICE, VOLUME, HIGH, LOW]
const BITFINEX_TICKER_FIELDS: usize = 10;
const BID: usize = 0;
const LAST_PRICE: usize = 6;
const VOLUME: usize = 7;
const HIGH: usize = 8;
const LOW: usize = 9;

#[derive(Serialize, Debug)]
struct BitfinexSubscribeRequest<'a> {
    event: &'static str,
    channel: &'static str,
    symbol: &'a str,
}

/// Error codes of `{"event":"error"}` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitfinexErrorCode {
    UnknownEvent,
    UnknownPair,
    SubscriptionFailed,
    AlreadySubscribed,
    UnknownChannel,
    ChannelLimitReached,
    Unhandled(i64),
}

impl From<i64> for BitfinexErrorCode {
    fn from(code: i64) -> Self {
        match code {
            10000 => BitfinexErrorCode::UnknownEvent,
            10001 => BitfinexErrorCode::UnknownPair,
            10300 => BitfinexErrorCode::SubscriptionFailed,
            10301 => BitfinexErrorCode::AlreadySubscribed,
            10302 => BitfinexErrorCode::UnknownChannel,
            10305 => BitfinexErrorCode::ChannelLimitReached,
            other => BitfinexErrorCode::Unhandled(other),
        }
    }
}

/// Codes of `{"event":"info"}` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitfinexInfoCode {
    /// Websocket server is restarting, reconnect.
    Restart,
    /// Maintenance started, activity should pause.
    MaintenanceStarted,
    /// Maintenance ended, channels must be resubscribed.
    MaintenanceEnded,
    Other(i64),
}

impl From<i64> for BitfinexInfoCode {
    fn from(code: i64) -> Self {
        match code {
            20051 => BitfinexInfoCode::Restart,
            20060 => BitfinexInfoCode::MaintenanceStarted,
            20061 => BitfinexInfoCode::MaintenanceEnded,
            other => BitfinexInfoCode::Other(other),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "event", rename_all = "lowercase")]
enum BitfinexEvent {
    Info {
        code: Option<i64>,
        msg: Option<String>,
        version: Option<u64>,
    },
    Subscribed {
        #[serde(rename = "chanId")]
        chan_id: u64,
        symbol: Option<String>,
    },
    Error {
        code: i64,
        msg: Option<String>,
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BitfinexControl {
    Info {
        code: Option<BitfinexInfoCode>,
        msg: Option<String>,
        version: Option<u64>,
    },
    Subscribed {
        channel_id: u64,
        symbol: Option<String>,
    },
    Error {
        code: BitfinexErrorCode,
        msg: Option<String>,
        symbol: Option<String>,
    },
    Unhandled {
        event: String,
    },
}

impl From<BitfinexEvent> for BitfinexControl {
    fn from(event: BitfinexEvent) -> Self {
        match event {
            BitfinexEvent::Info { code, msg, version } => BitfinexControl::Info {
                code: code.map(BitfinexInfoCode::from),
                msg,
                version,
            },
            BitfinexEvent::Subscribed { chan_id, symbol } => BitfinexControl::Subscribed {
                channel_id: chan_id,
                symbol,
            },
            BitfinexEvent::Error { code, msg, symbol } => BitfinexControl::Error {
                code: BitfinexErrorCode::from(code),
                msg,
                symbol,
            },
        }
    }
}

/// `[CHANNEL_ID, [BID, ..., LOW]]`
#[derive(Debug, Clone, PartialEq)]
pub struct BitfinexUpdate {
    pub channel_id: u64,
    pub fields: Vec<Value>,
}

/// How the handshake for one pair ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Subscribed { channel_id: u64 },
    Rejected(BitfinexErrorCode),
    TimedOut,
    ReadFailed,
    Cancelled,
}

pub struct BitfinexAdapter {
    pairs: Vec<SymbolPair>,
    tracker: SubscriptionTracker,
    /// Pairs whose handshake ended without an ack. A late ack still binds them.
    skipped: Vec<SymbolPair>,
}

/// `tBTCUSD` style trading symbol.
pub fn trading_symbol(pair: &SymbolPair) -> String {
    format!(
        "t{}{}",
        pair.base.name.to_uppercase(),
        pair.quote.name.to_uppercase()
    )
}

impl BitfinexAdapter {
    pub fn tracker(&self) -> &SubscriptionTracker {
        &self.tracker
    }

    pub fn skipped(&self) -> &[SymbolPair] {
        &self.skipped
    }

    /// Binds a late ack to the skipped pair it belongs to. Returns false when
    /// no skipped pair has that symbol.
    fn adopt_late_ack(&mut self, channel_id: u64, symbol: &str) -> bool {
        let Some(position) = self
            .skipped
            .iter()
            .position(|pair| trading_symbol(pair) == symbol)
        else {
            return false;
        };

        let pair = self.skipped.remove(position);
        info!(exchange = Self::NAME, %pair, channel_id, "late subscription acknowledged");
        self.tracker.record(channel_id, pair);
        true
    }

    /// Applies a control message received while `pair` is pending. Returns
    /// the outcome once the exchange has answered for that pair.
    pub fn handshake_step(
        &mut self,
        pair: &SymbolPair,
        symbol: &str,
        control: BitfinexControl,
    ) -> Result<Option<Handshake>, ConnectionError> {
        match control {
            BitfinexControl::Subscribed {
                channel_id,
                symbol: acknowledged,
            } => {
                if let Some(acked) = acknowledged.as_deref().filter(|acked| *acked != symbol) {
                    if self.adopt_late_ack(channel_id, acked) {
                        return Ok(None);
                    }
                    warn!(
                        exchange = Self::NAME,
                        channel_id,
                        expected = symbol,
                        acknowledged = ?acknowledged,
                        "acknowledgement for another symbol"
                    );
                    return Ok(None);
                }

                if let Some(previous) = self.tracker.record(channel_id, pair.clone()) {
                    warn!(exchange = Self::NAME, channel_id, %previous, "channel id reused");
                }
                info!(exchange = Self::NAME, %pair, channel_id, "subscribed");
                Ok(Some(Handshake::Subscribed { channel_id }))
            }
            BitfinexControl::Error {
                code,
                msg,
                symbol: Some(failed),
            } if failed != symbol => {
                warn!(
                    exchange = Self::NAME,
                    code = ?code,
                    ?msg,
                    symbol = %failed,
                    pending = symbol,
                    "error for another symbol"
                );
                Ok(None)
            }
            BitfinexControl::Error { code, msg, .. } => {
                match code {
                    BitfinexErrorCode::SubscriptionFailed => {
                        warn!(exchange = Self::NAME, %pair, ?msg, "generic subscription failure")
                    }
                    BitfinexErrorCode::AlreadySubscribed => {
                        warn!(exchange = Self::NAME, %pair, ?msg, "already subscribed")
                    }
                    BitfinexErrorCode::UnknownChannel => warn!(
                        exchange = Self::NAME,
                        %pair,
                        channel = BITFINEX_TICKER_CHANNEL,
                        ?msg,
                        "unknown channel"
                    ),
                    other => {
                        warn!(exchange = Self::NAME, %pair, code = ?other, ?msg, "unhandled subscription error")
                    }
                }
                Ok(Some(Handshake::Rejected(code)))
            }
            other => {
                self.on_control(other)?;
                Ok(None)
            }
        }
    }

    /// Blocks until the pending pair is acknowledged, rejected, or the
    /// handshake timeout passes. Ticker frames of pairs subscribed earlier
    /// are forwarded as they arrive.
    async fn await_subscription(
        &mut self,
        connection: &mut Connection,
        pair: &SymbolPair,
        symbol: &str,
    ) -> Result<Handshake, ConnectionError> {
        let deadline = Instant::now() + connection.handshake_timeout();

        loop {
            let text = match connection.next_text(Some(deadline)).await {
                Ok(Incoming::Text(text)) => text,
                Ok(Incoming::TimedOut) => return Ok(Handshake::TimedOut),
                Ok(Incoming::Cancelled) => return Ok(Handshake::Cancelled),
                Err(error) => {
                    warn!(exchange = Self::NAME, %pair, %error, "error reading subscription response");
                    return Ok(Handshake::ReadFailed);
                }
            };

            match self.classify(&text) {
                Frame::Control(control) => {
                    if let Some(outcome) = self.handshake_step(pair, symbol, control)? {
                        return Ok(outcome);
                    }
                }
                frame => {
                    let handled = handle_classified(self, connection.chunk(), frame, &text)?;
                    deliver(connection, handled).await?;
                }
            }
        }
    }

    fn classify_event(value: Value) -> Frame<BitfinexUpdate, BitfinexControl> {
        let event = match value.get("event").and_then(Value::as_str) {
            Some(event) => event.to_string(),
            None => return Frame::Unrecognized("object without `event` field".to_string()),
        };

        match event.as_str() {
            "info" | "subscribed" | "error" => match serde_json::from_value::<BitfinexEvent>(value) {
                Ok(event) => Frame::Control(event.into()),
                Err(error) => Frame::Unrecognized(format!("`{}` event: {}", event, error)),
            },
            _ => Frame::Control(BitfinexControl::Unhandled { event }),
        }
    }

    fn classify_update(items: Vec<Value>) -> Frame<BitfinexUpdate, BitfinexControl> {
        let Ok([channel_id, payload]) = <[Value; 2]>::try_from(items) else {
            return Frame::Unrecognized("expected [channelId, payload]".to_string());
        };

        let Some(channel_id) = channel_id.as_u64() else {
            return Frame::Unrecognized(format!("channel id {} is not an integer", channel_id));
        };

        match payload {
            Value::String(marker) if marker == BITFINEX_HEARTBEAT => Frame::Heartbeat,
            Value::Array(fields) if fields.len() == BITFINEX_TICKER_FIELDS => {
                Frame::Update(BitfinexUpdate { channel_id, fields })
            }
            Value::Null => Frame::Unrecognized(format!("channel {} returned null data", channel_id)),
            other => Frame::Unrecognized(format!(
                "channel {} payload is not a ticker: {}",
                channel_id, other
            )),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for BitfinexAdapter {
    type Update = BitfinexUpdate;
    type Control = BitfinexControl;

    const NAME: &'static str = "bitfinex";

    fn for_chunk(pairs: Vec<SymbolPair>) -> Self {
        Self {
            pairs,
            tracker: SubscriptionTracker::new(),
            skipped: Vec::new(),
        }
    }

    fn pairs(&self) -> &[SymbolPair] {
        &self.pairs
    }

    /// One request per pair, each awaited before the next is sent. A pair
    /// that fails its handshake is skipped; the others carry on.
    async fn subscribe(&mut self, connection: &mut Connection) -> Result<(), ConnectionError> {
        let pairs = self.pairs.clone();

        for pair in &pairs {
            let symbol = trading_symbol(pair);
            let request = BitfinexSubscribeRequest {
                event: BITFINEX_EVENT_SUBSCRIBE,
                channel: BITFINEX_TICKER_CHANNEL,
                symbol: &symbol,
            };
            connection.send_json(&request).await?;

            match self.await_subscription(connection, pair, &symbol).await? {
                Handshake::Subscribed { .. } => {}
                Handshake::Cancelled => return Ok(()),
                Handshake::TimedOut => {
                    warn!(
                        exchange = Self::NAME,
                        %pair,
                        timeout = ?connection.handshake_timeout(),
                        "no subscription response"
                    );
                    self.skipped.push(pair.clone());
                }
                Handshake::Rejected(_) | Handshake::ReadFailed => self.skipped.push(pair.clone()),
            }
        }

        info!(
            exchange = Self::NAME,
            chunk = connection.chunk(),
            subscribed = self.tracker.len(),
            skipped = %describe(&self.skipped),
            "handshake finished"
        );
        Ok(())
    }

    fn classify(&self, raw: &str) -> Frame<BitfinexUpdate, BitfinexControl> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => Self::classify_update(items),
            Ok(value @ Value::Object(_)) => Self::classify_event(value),
            Ok(other) => Frame::Unrecognized(format!("unexpected json {}", other)),
            Err(error) => Frame::Unrecognized(format!("invalid json: {}", error)),
        }
    }

    /// Ticker payloads carry no timestamp, the quote is stamped on receipt.
    fn parse(&self, update: BitfinexUpdate) -> Result<CanonicalQuote, QuoteError> {
        let pair = self
            .tracker
            .lookup(update.channel_id)
            .ok_or(QuoteError::UnknownChannel(update.channel_id))?;

        let number = |index: usize, name: &'static str| -> Result<u64, QuoteError> {
            let value = update
                .fields
                .get(index)
                .ok_or_else(|| QuoteError::MalformedUpdate(format!("no {} field", name)))?;
            field(name, value_to_fixed_point(value))
        };

        let rate = number(LAST_PRICE, "last_price")?;
        // no daily open in the ticker, the bid stands in for it
        let open = number(BID, "bid")?;
        let high = number(HIGH, "high")?;
        let low = number(LOW, "low")?;
        let volume = number(VOLUME, "volume")?;

        Ok(CanonicalQuote::new(pair, rate, open, high, low, volume))
    }

    fn on_control(&mut self, control: BitfinexControl) -> Result<(), ConnectionError> {
        match control {
            BitfinexControl::Info {
                code: Some(BitfinexInfoCode::Restart),
                ..
            } => {
                warn!(exchange = Self::NAME, "websocket server restarting");
                Err(ConnectionError::ReconnectRequested(
                    "server restart".to_string(),
                ))
            }
            BitfinexControl::Info {
                code: Some(BitfinexInfoCode::MaintenanceStarted),
                ..
            } => {
                warn!(exchange = Self::NAME, "maintenance started, updates paused");
                Ok(())
            }
            BitfinexControl::Info {
                code: Some(BitfinexInfoCode::MaintenanceEnded),
                ..
            } => {
                info!(exchange = Self::NAME, "maintenance ended");
                Err(ConnectionError::ReconnectRequested(
                    "maintenance ended, resubscribing".to_string(),
                ))
            }
            BitfinexControl::Info { code, msg, version } => {
                info!(exchange = Self::NAME, ?code, ?msg, ?version, "info message");
                Ok(())
            }
            BitfinexControl::Subscribed { channel_id, symbol } => {
                let adopted = symbol
                    .as_deref()
                    .map_or(false, |symbol| self.adopt_late_ack(channel_id, symbol));
                if !adopted {
                    info!(exchange = Self::NAME, channel_id, ?symbol, "subscription confirmation");
                }
                Ok(())
            }
            BitfinexControl::Error { code, msg, symbol } => {
                warn!(exchange = Self::NAME, ?code, ?msg, ?symbol, "error event");
                Ok(())
            }
            BitfinexControl::Unhandled { event } => {
                debug!(exchange = Self::NAME, %event, "unhandled system event");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::{handle_frame, Handled};
    use crate::model::fixtures::pair;

    const TICKER: &str =
        "[5,[7616.5,31.89055171,7617.5,43.358118629999986,-550.8,-0.0674,7617.1,8314.71200815,8257.8,7500]]";

    fn adapter() -> BitfinexAdapter {
        BitfinexAdapter::for_chunk(vec![pair(1, "BTC", "USD"), pair(2, "ETH", "USD")])
    }

    fn ack(adapter: &mut BitfinexAdapter, channel_id: u64, pair: &SymbolPair) {
        let raw = format!(
            r#"{{"event":"subscribed","channel":"ticker","chanId":{},"symbol":"{}","pair":"BTCUSD"}}"#,
            channel_id,
            trading_symbol(pair)
        );
        let Frame::Control(control) = adapter.classify(&raw) else {
            panic!("ack not classified as control");
        };
        let outcome = adapter
            .handshake_step(pair, &trading_symbol(pair), control)
            .unwrap();
        assert_eq!(outcome, Some(Handshake::Subscribed { channel_id }));
    }

    #[test]
    fn trading_symbol_is_prefixed_and_uppercase() {
        assert_eq!(trading_symbol(&pair(1, "btc", "usd")), "tBTCUSD");
    }

    #[test]
    fn subscribe_request_wire_format() {
        let request = BitfinexSubscribeRequest {
            event: BITFINEX_EVENT_SUBSCRIBE,
            channel: BITFINEX_TICKER_CHANNEL,
            symbol: "tBTCUSD",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"event": "subscribe", "channel": "ticker", "symbol": "tBTCUSD"})
        );
    }

    #[test]
    fn classifies_frames() {
        let adapter = adapter();

        assert_eq!(adapter.classify(r#"[5,"hb"]"#), Frame::Heartbeat);
        assert!(matches!(
            adapter.classify(TICKER),
            Frame::Update(BitfinexUpdate { channel_id: 5, ref fields }) if fields.len() == 10
        ));
        assert_eq!(
            adapter.classify(r#"{"event":"info","version":2,"platform":{"status":1}}"#),
            Frame::Control(BitfinexControl::Info {
                code: None,
                msg: None,
                version: Some(2)
            })
        );
        assert_eq!(
            adapter.classify(r#"{"event":"error","msg":"subscribe: dup","code":10301}"#),
            Frame::Control(BitfinexControl::Error {
                code: BitfinexErrorCode::AlreadySubscribed,
                msg: Some("subscribe: dup".to_string()),
                symbol: None
            })
        );
        assert_eq!(
            adapter.classify(r#"{"event":"pong","ts":1}"#),
            Frame::Control(BitfinexControl::Unhandled {
                event: "pong".to_string()
            })
        );
    }

    #[test]
    fn unexpected_shapes_are_unrecognized() {
        let adapter = adapter();
        for raw in [
            "garbage",
            "42",
            "[5]",
            "[5,[1,2,3]]",
            "[5,null]",
            r#"["x",[1,2,3,4,5,6,7,8,9,10]]"#,
            r#"{"chanId":5}"#,
            r#"{"event":"subscribed"}"#,
        ] {
            assert!(
                matches!(adapter.classify(raw), Frame::Unrecognized(_)),
                "{} should be unrecognized",
                raw
            );
        }
    }

    #[test]
    fn ack_then_ticker_yields_quote() {
        let mut adapter = adapter();
        ack(&mut adapter, 5, &pair(1, "BTC", "USD"));

        assert_eq!(adapter.tracker().lookup(5), Some(&pair(1, "BTC", "USD")));

        let Handled::Quote(quote) = handle_frame(&mut adapter, 0, TICKER).unwrap() else {
            panic!("ticker did not produce a quote");
        };
        assert_eq!(quote.symbol_pair, pair(1, "BTC", "USD"));
        assert_eq!(quote.rate, (7617.1_f64 * 10_000.0).round() as u64);
        assert_eq!(quote.close, quote.rate);
        assert_eq!(quote.open, 76_165_000);
        assert_eq!(quote.high, 82_578_000);
        assert_eq!(quote.low, 75_000_000);
        assert_eq!(quote.volume, 83_147_120);
    }

    #[test]
    fn heartbeat_yields_nothing() {
        let mut adapter = adapter();
        ack(&mut adapter, 5, &pair(1, "BTC", "USD"));

        assert_eq!(
            handle_frame(&mut adapter, 0, r#"[5,"hb"]"#).unwrap(),
            Handled::Heartbeat
        );
    }

    #[test]
    fn unmapped_channel_is_dropped() {
        let mut adapter = adapter();
        let raw = TICKER.replacen("[5,", "[99,", 1);

        assert!(matches!(
            adapter.parse(BitfinexUpdate {
                channel_id: 99,
                fields: vec![Value::from(1.0); 10]
            }),
            Err(QuoteError::UnknownChannel(99))
        ));
        assert_eq!(handle_frame(&mut adapter, 0, &raw).unwrap(), Handled::Dropped);
    }

    #[test]
    fn rejection_only_ends_that_pair() {
        let mut adapter = adapter();
        let btc = pair(1, "BTC", "USD");
        let eth = pair(2, "ETH", "USD");

        let Frame::Control(error) =
            adapter.classify(r#"{"event":"error","msg":"subscribe: dup","code":10301}"#)
        else {
            panic!("error not classified as control");
        };
        assert_eq!(
            adapter.handshake_step(&btc, "tBTCUSD", error).unwrap(),
            Some(Handshake::Rejected(BitfinexErrorCode::AlreadySubscribed))
        );

        ack(&mut adapter, 6, &eth);
        assert!(!adapter.tracker().is_subscribed(&btc));
        assert!(adapter.tracker().is_subscribed(&eth));
    }

    #[test]
    fn ack_for_other_symbol_keeps_waiting() {
        let mut adapter = adapter();
        let control = BitfinexControl::Subscribed {
            channel_id: 8,
            symbol: Some("tETHUSD".to_string()),
        };

        assert_eq!(
            adapter
                .handshake_step(&pair(1, "BTC", "USD"), "tBTCUSD", control)
                .unwrap(),
            None
        );
        assert!(adapter.tracker().is_empty());
    }

    #[test]
    fn error_for_other_symbol_keeps_waiting() {
        let mut adapter = adapter();
        let Frame::Control(error) = adapter.classify(
            r#"{"event":"error","msg":"subscribe: dup","code":10301,"symbol":"tBTCUSD"}"#,
        ) else {
            panic!("error not classified as control");
        };

        assert_eq!(
            adapter
                .handshake_step(&pair(2, "ETH", "USD"), "tETHUSD", error)
                .unwrap(),
            None
        );
    }

    #[test]
    fn late_ack_binds_skipped_pair() {
        let mut adapter = adapter();
        let btc = pair(1, "BTC", "USD");
        let eth = pair(2, "ETH", "USD");
        adapter.skipped.push(btc.clone());

        // arrives while ETH is pending
        let during_handshake = BitfinexControl::Subscribed {
            channel_id: 4,
            symbol: Some("tBTCUSD".to_string()),
        };
        assert_eq!(
            adapter.handshake_step(&eth, "tETHUSD", during_handshake).unwrap(),
            None
        );
        assert_eq!(adapter.tracker().lookup(4), Some(&btc));
        assert!(adapter.skipped().is_empty());

        // arrives after the handshake
        adapter.skipped.push(eth.clone());
        let steady_state = BitfinexControl::Subscribed {
            channel_id: 9,
            symbol: Some("tETHUSD".to_string()),
        };
        adapter.on_control(steady_state).unwrap();
        assert_eq!(adapter.tracker().lookup(9), Some(&eth));

        let raw = TICKER.replacen("[5,", "[9,", 1);
        let Handled::Quote(quote) = handle_frame(&mut adapter, 0, &raw).unwrap() else {
            panic!("late-acked channel produced no quote");
        };
        assert_eq!(quote.symbol_pair, eth);
    }

    #[test]
    fn unknown_late_ack_is_ignored() {
        let mut adapter = adapter();
        let stray = BitfinexControl::Subscribed {
            channel_id: 11,
            symbol: Some("tXRPUSD".to_string()),
        };

        adapter.on_control(stray).unwrap();
        assert!(adapter.tracker().is_empty());
    }

    #[test]
    fn info_messages_during_handshake_keep_waiting() {
        let mut adapter = adapter();
        let control = BitfinexControl::Info {
            code: None,
            msg: None,
            version: Some(2),
        };

        assert_eq!(
            adapter
                .handshake_step(&pair(1, "BTC", "USD"), "tBTCUSD", control)
                .unwrap(),
            None
        );
    }

    #[test]
    fn restart_info_ends_connection() {
        let mut adapter = adapter();

        let Frame::Control(control) = adapter.classify(r#"{"event":"info","code":20051,"msg":"restart"}"#) else {
            panic!("info not classified as control");
        };
        assert!(matches!(
            adapter.on_control(control),
            Err(ConnectionError::ReconnectRequested(_))
        ));

        let maintenance = BitfinexControl::Info {
            code: Some(BitfinexInfoCode::MaintenanceStarted),
            msg: None,
            version: None,
        };
        assert!(adapter.on_control(maintenance).is_ok());
    }

    #[test]
    fn error_codes_map() {
        assert_eq!(BitfinexErrorCode::from(10300), BitfinexErrorCode::SubscriptionFailed);
        assert_eq!(BitfinexErrorCode::from(10302), BitfinexErrorCode::UnknownChannel);
        assert_eq!(BitfinexErrorCode::from(10305), BitfinexErrorCode::ChannelLimitReached);
        assert_eq!(BitfinexErrorCode::from(12345), BitfinexErrorCode::Unhandled(12345));
    }

    #[test]
    fn negative_field_drops_quote() {
        let mut adapter = adapter();
        ack(&mut adapter, 5, &pair(1, "BTC", "USD"));
        // low below zero
        let raw = TICKER.replace(",7500]]", ",-1]]");

        assert!(matches!(
            adapter.parse(match adapter.classify(&raw) {
                Frame::Update(update) => update,
                other => panic!("unexpected frame {:?}", other),
            }),
            Err(QuoteError::Conversion { field: "low", .. })
        ));
    }
}
