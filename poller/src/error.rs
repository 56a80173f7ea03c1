use std::io;
use std::time::Duration;

use thiserror::Error;

/// A single numeric field that could not be turned into a fixed-point value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("`{0}` is not a decimal number")]
    Unparseable(String),
    #[error("`{0}` is negative")]
    Negative(String),
    #[error("`{0}` does not fit a fixed-point u64")]
    OutOfRange(String),
}

/// Reasons a ticker update produced no quote. None of these end the connection.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("field `{field}`: {source}")]
    Conversion {
        field: &'static str,
        #[source]
        source: ConversionError,
    },
    #[error("no subscribed symbol pair matches `{0}`")]
    UnknownSymbol(String),
    #[error("channel {0} is not mapped to a symbol pair")]
    UnknownChannel(u64),
    #[error("event time {0} is out of range")]
    InvalidTimestamp(i64),
    #[error("malformed update: {0}")]
    MalformedUpdate(String),
}

/// Connection-fatal failures. They end one chunk's connection and are
/// reported to the supervisor.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid endpoint `{endpoint}`: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("can't connect: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("read failed: {0}")]
    Read(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("write failed: {0}")]
    Write(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("can't encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection closed by server")]
    Closed,
    #[error("connection reached its age limit")]
    Expired,
    #[error("server asked to reconnect: {0}")]
    ReconnectRequested(String),
    #[error("quote channel is disconnected")]
    QuotesDisconnected,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("questdb ingress: {0}")]
    Ingress(#[from] questdb::Error),
    #[error("column {column} can't hold {value}")]
    OutOfRange { column: &'static str, value: u64 },
    #[error("sink task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("sink is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("can't read data sources from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("can't parse data sources: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("data source {0} not found")]
    NotFound(i64),
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("no adapter for exchange id {0}")]
    UnknownExchange(i64),
    #[error("data source `{0}` has no symbol pairs")]
    NoSymbolPairs(String),
    #[error("chunk {chunk} gave up after {attempts} attempts: {source}")]
    ChunkFailed {
        chunk: usize,
        attempts: u32,
        #[source]
        source: ConnectionError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}
