use async_trait::async_trait;
use questdb::ingress::{Buffer, Sender, TimestampMicros, TimestampNanos};
use tracing::{debug, info};

use super::QuoteSink;
use crate::error::SinkError;
use crate::model::CanonicalQuote;

const QUOTES_TABLE: &str = "crypto_quotes";

/// Writes quotes to QuestDB over the InfluxDB line protocol (TCP).
///
/// The sender is created lazily and dropped after any error, so the next
/// write reconnects.
pub struct QuestDbSink {
    addr: String,
    sender: Option<Sender>,
}

impl QuestDbSink {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            sender: None,
        }
    }

    fn conf(&self) -> String {
        format!("tcp::addr={};", self.addr)
    }
}

#[async_trait]
impl QuoteSink for QuestDbSink {
    async fn write(&mut self, quotes: &[CanonicalQuote]) -> Result<(), SinkError> {
        let mut buffer = Buffer::new();
        for quote in quotes {
            append_row(&mut buffer, quote)?;
        }

        let sender = self.sender.take();
        let connecting = sender.is_none();
        let conf = self.conf();

        // the ingress client does blocking socket i/o
        let flushed = tokio::task::spawn_blocking(move || -> Result<Sender, questdb::Error> {
            let mut sender = match sender {
                Some(sender) => sender,
                None => Sender::from_conf(&conf)?,
            };
            sender.flush(&mut buffer)?;
            Ok(sender)
        })
        .await?;

        match flushed {
            Ok(sender) => {
                if connecting {
                    info!(addr = %self.addr, "connected to QuestDB");
                }
                self.sender = Some(sender);
                Ok(())
            }
            Err(error) => {
                debug!(addr = %self.addr, %error, "dropping QuestDB connection");
                Err(error.into())
            }
        }
    }
}

fn int(column: &'static str, value: u64) -> Result<i64, SinkError> {
    i64::try_from(value).map_err(|_| SinkError::OutOfRange { column, value })
}

/// Appends one `crypto_quotes` row for `quote`.
fn append_row(buffer: &mut Buffer, quote: &CanonicalQuote) -> Result<(), SinkError> {
    let pair = &quote.symbol_pair;
    let micros = quote.timestamp.timestamp_micros();
    let nanos = quote
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or(micros.saturating_mul(1_000));

    buffer
        .table(QUOTES_TABLE)?
        .symbol("Base", &pair.base.name)?
        .symbol("Quote", &pair.quote.name)?
        .symbol("MarketName", &quote.market.name)?
        .symbol("BaseQuote", pair.concatenated())?
        .column_i64("BaseId", pair.base.id)?
        .column_i64("QuoteId", pair.quote.id)?
        .column_i64("MarketId", quote.market.id)?
        .column_i64("Rate", int("Rate", quote.rate)?)?
        .column_i64("OpenRate", int("OpenRate", quote.open)?)?
        .column_i64("HighRate", int("HighRate", quote.high)?)?
        .column_i64("LowRate", int("LowRate", quote.low)?)?
        .column_i64("CloseRate", int("CloseRate", quote.close)?)?
        .column_i64("Volume", int("Volume", quote.volume)?)?
        .column_ts("TimeStamp", TimestampMicros::new(micros))?
        .at(TimestampNanos::new(nanos))?;

    Ok(())
}
