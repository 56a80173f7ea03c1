use async_trait::async_trait;
use tracing::info;

use super::QuoteSink;
use crate::error::SinkError;
use crate::exchanges::normalizer::from_fixed_point;
use crate::model::CanonicalQuote;

/// Writes quotes to the log instead of a database. Handy for dry runs.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl QuoteSink for LogSink {
    async fn write(&mut self, quotes: &[CanonicalQuote]) -> Result<(), SinkError> {
        for quote in quotes {
            info!(
                pair = %quote.symbol_pair,
                market = %quote.market.name,
                timestamp = %quote.timestamp,
                rate = %from_fixed_point(quote.rate),
                high = %from_fixed_point(quote.high),
                low = %from_fixed_point(quote.low),
                volume = %from_fixed_point(quote.volume),
                "quote"
            );
        }
        Ok(())
    }
}
