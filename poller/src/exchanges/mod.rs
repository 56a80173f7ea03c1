use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{ConnectionError, QuoteError};
use crate::model::{CanonicalQuote, SymbolPair};

// Exchanges
pub mod binance;
pub mod bitfinex;

pub mod normalizer;
pub mod tracker;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A decoded wire message after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<U, C> {
    Heartbeat,
    Update(U),
    Control(C),
    Unrecognized(String),
}

/// What became of one frame.
#[derive(Debug, PartialEq)]
pub enum Handled {
    Quote(CanonicalQuote),
    Heartbeat,
    Control,
    Dropped,
}

/// One exchange's wire protocol. A fresh adapter is built for every
/// connection, so adapter state never outlives its socket.
#[async_trait]
pub trait ExchangeAdapter: Send + Sized + 'static {
    /// Ticker payload extracted by `classify`.
    type Update: Send;
    /// System or acknowledgement message extracted by `classify`.
    type Control: Send + fmt::Debug;

    const NAME: &'static str;

    /// Exchanges that drop long-lived connections get recycled before that.
    const MAX_CONNECTION_AGE: Option<Duration> = None;

    fn for_chunk(pairs: Vec<SymbolPair>) -> Self;

    fn pairs(&self) -> &[SymbolPair];

    /// Sends subscribe requests and runs any handshake the exchange needs.
    /// Returns early without error when the connection is cancelled.
    async fn subscribe(&mut self, connection: &mut Connection) -> Result<(), ConnectionError>;

    fn classify(&self, raw: &str) -> Frame<Self::Update, Self::Control>;

    fn parse(&self, update: Self::Update) -> Result<CanonicalQuote, QuoteError>;

    /// Handles a control message outside of the handshake. An error ends the
    /// connection.
    fn on_control(&mut self, control: Self::Control) -> Result<(), ConnectionError>;
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of waiting for the next text frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    TimedOut,
    Cancelled,
}

/// One websocket session of one chunk.
pub struct Connection {
    socket: WsStream,
    exchange: &'static str,
    chunk: usize,
    quotes: flume::Sender<CanonicalQuote>,
    cancel: CancellationToken,
    expires_at: Option<Instant>,
    handshake_timeout: Duration,
    live_frames: usize,
}

impl Connection {
    /// Dials `endpoint`. Returns `Ok(None)` if cancelled while dialing.
    pub async fn open(
        endpoint: &str,
        exchange: &'static str,
        chunk: usize,
        max_age: Option<Duration>,
        settings: &ConnectionSettings,
        quotes: flume::Sender<CanonicalQuote>,
        cancel: CancellationToken,
    ) -> Result<Option<Self>, ConnectionError> {
        let url = Url::parse(endpoint).map_err(|source| ConnectionError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let dial = tokio::time::timeout(settings.connect_timeout, connect_async(url.as_str()));
        let socket = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            dialed = dial => match dialed {
                Ok(Ok((socket, _))) => socket,
                Ok(Err(error)) => return Err(ConnectionError::Connect(error)),
                Err(_) => return Err(ConnectionError::ConnectTimeout(settings.connect_timeout)),
            },
        };

        Ok(Some(Self {
            socket,
            exchange,
            chunk,
            quotes,
            cancel,
            expires_at: max_age.map(|age| Instant::now() + age),
            handshake_timeout: settings.handshake_timeout,
            live_frames: 0,
        }))
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Quotes and heartbeats received so far.
    pub fn live_frames(&self) -> usize {
        self.live_frames
    }

    pub async fn send_json<T: Serialize>(&mut self, request: &T) -> Result<(), ConnectionError> {
        let payload = serde_json::to_string(request)?;
        debug!(exchange = self.exchange, chunk = self.chunk, %payload, "sending request");

        self.socket
            .send(Message::Text(payload))
            .await
            .map_err(ConnectionError::Write)
    }

    /// Waits for the next text frame, answering pings on the way.
    pub async fn next_text(&mut self, deadline: Option<Instant>) -> Result<Incoming, ConnectionError> {
        loop {
            let expires_at = self.expires_at;
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Incoming::Cancelled),
                _ = sleep_until(deadline) => return Ok(Incoming::TimedOut),
                _ = sleep_until(expires_at) => return Err(ConnectionError::Expired),
                message = self.socket.next() => message,
            };

            match message {
                None => return Err(ConnectionError::Closed),
                Some(Err(error)) => return Err(ConnectionError::Read(error)),
                Some(Ok(Message::Text(text))) => return Ok(Incoming::Text(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Incoming::Text(text)),
                    Err(error) => {
                        warn!(exchange = self.exchange, chunk = self.chunk, %error, "binary frame is not utf-8");
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    trace!(exchange = self.exchange, chunk = self.chunk, "ping");
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(ConnectionError::Write)?;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(exchange = self.exchange, chunk = self.chunk, ?frame, "close frame received");
                    return Err(ConnectionError::Closed);
                }
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Hands a quote to the sink writer, waiting if its buffer is full.
    pub async fn forward(&mut self, quote: CanonicalQuote) -> Result<(), ConnectionError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            sent = self.quotes.send_async(quote) => sent.map_err(|_| ConnectionError::QuotesDisconnected),
        }
    }

    pub async fn close(mut self) {
        if let Err(error) = self.socket.close(None).await {
            debug!(exchange = self.exchange, chunk = self.chunk, %error, "error closing connection");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Classifies and parses one frame without touching the socket.
pub fn handle_frame<A: ExchangeAdapter>(
    adapter: &mut A,
    chunk: usize,
    raw: &str,
) -> Result<Handled, ConnectionError> {
    let frame = adapter.classify(raw);
    handle_classified(adapter, chunk, frame, raw)
}

pub fn handle_classified<A: ExchangeAdapter>(
    adapter: &mut A,
    chunk: usize,
    frame: Frame<A::Update, A::Control>,
    raw: &str,
) -> Result<Handled, ConnectionError> {
    match frame {
        Frame::Heartbeat => {
            trace!(exchange = A::NAME, chunk, "heartbeat");
            Ok(Handled::Heartbeat)
        }
        Frame::Update(update) => match adapter.parse(update) {
            Ok(quote) => Ok(Handled::Quote(quote)),
            Err(error) => {
                warn!(exchange = A::NAME, chunk, %error, "dropping ticker update");
                Ok(Handled::Dropped)
            }
        },
        Frame::Control(control) => {
            adapter.on_control(control)?;
            Ok(Handled::Control)
        }
        Frame::Unrecognized(reason) => {
            warn!(exchange = A::NAME, chunk, %reason, frame = raw, "discarding unrecognized frame");
            Ok(Handled::Dropped)
        }
    }
}

/// Forwards the quote a handled frame produced, if any.
pub async fn deliver(connection: &mut Connection, handled: Handled) -> Result<(), ConnectionError> {
    match handled {
        Handled::Quote(quote) => {
            connection.live_frames += 1;
            connection.forward(quote).await
        }
        Handled::Heartbeat => {
            connection.live_frames += 1;
            Ok(())
        }
        Handled::Control | Handled::Dropped => Ok(()),
    }
}

pub async fn dispatch<A: ExchangeAdapter>(
    adapter: &mut A,
    connection: &mut Connection,
    raw: &str,
) -> Result<(), ConnectionError> {
    let handled = handle_frame(adapter, connection.chunk(), raw)?;
    deliver(connection, handled).await
}

/// Steady state: frames are handled strictly in arrival order.
async fn read_loop<A: ExchangeAdapter>(
    adapter: &mut A,
    connection: &mut Connection,
) -> Result<(), ConnectionError> {
    loop {
        match connection.next_text(None).await? {
            Incoming::Text(text) => dispatch(adapter, connection, &text).await?,
            Incoming::Cancelled => return Ok(()),
            Incoming::TimedOut => continue,
        }
    }
}

/// How one connection ended.
#[derive(Debug)]
pub struct Session {
    pub result: Result<(), ConnectionError>,
    /// Quotes and heartbeats received before the end. Zero means the
    /// exchange never streamed anything on this connection.
    pub live_frames: usize,
}

impl Session {
    fn failed(error: ConnectionError) -> Self {
        Self {
            result: Err(error),
            live_frames: 0,
        }
    }

    /// The connection got past the handshake and data flowed.
    pub fn was_healthy(&self) -> bool {
        self.live_frames > 0
    }
}

/// Runs one chunk's connection until it is cancelled (`Ok`) or fails.
pub async fn run_connection<A: ExchangeAdapter>(
    endpoint: &str,
    chunk: usize,
    pairs: Vec<SymbolPair>,
    settings: &ConnectionSettings,
    quotes: flume::Sender<CanonicalQuote>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    run_session::<A>(endpoint, chunk, pairs, settings, quotes, cancel)
        .await
        .result
}

/// Same as [`run_connection`], also reporting how much data the connection
/// carried.
pub async fn run_session<A: ExchangeAdapter>(
    endpoint: &str,
    chunk: usize,
    pairs: Vec<SymbolPair>,
    settings: &ConnectionSettings,
    quotes: flume::Sender<CanonicalQuote>,
    cancel: CancellationToken,
) -> Session {
    let opened = Connection::open(
        endpoint,
        A::NAME,
        chunk,
        A::MAX_CONNECTION_AGE,
        settings,
        quotes,
        cancel,
    )
    .await;

    let mut connection = match opened {
        Ok(Some(connection)) => connection,
        Ok(None) => {
            return Session {
                result: Ok(()),
                live_frames: 0,
            }
        }
        Err(error) => return Session::failed(error),
    };

    let mut adapter = A::for_chunk(pairs);
    info!(
        exchange = A::NAME,
        chunk,
        pairs = %describe(adapter.pairs()),
        "connection opened"
    );

    let result = match adapter.subscribe(&mut connection).await {
        Ok(()) => read_loop(&mut adapter, &mut connection).await,
        Err(error) => Err(error),
    };

    let live_frames = connection.live_frames();
    connection.close().await;
    Session {
        result,
        live_frames,
    }
}

pub(crate) fn describe(pairs: &[SymbolPair]) -> String {
    pairs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
