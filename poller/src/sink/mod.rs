use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::SinkError;
use crate::model::CanonicalQuote;

mod log_sink;
mod questdb;

pub use log_sink::LogSink;
pub use questdb::QuestDbSink;

/// Durable destination of canonical quotes.
#[async_trait]
pub trait QuoteSink: Send {
    async fn write(&mut self, quotes: &[CanonicalQuote]) -> Result<(), SinkError>;
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub written: usize,
    pub dropped: usize,
}

/// Spawns the task that batches quotes from all chunks into the sink. It
/// finishes once every sender is gone and the channel is drained.
pub fn spawn_writer<S: QuoteSink + 'static>(
    quotes: flume::Receiver<CanonicalQuote>,
    mut sink: S,
    settings: SinkSettings,
) -> tokio::task::JoinHandle<WriterStats> {
    tokio::spawn(async move {
        let mut stats = WriterStats::default();
        let batch_size = settings.batch_size.max(1);

        while let Ok(first) = quotes.recv_async().await {
            let mut batch = Vec::with_capacity(batch_size);
            batch.push(first);
            batch.extend(quotes.try_iter().take(batch_size - 1));

            if write_with_retry(&mut sink, &batch, &settings).await {
                stats.written += batch.len();
            } else {
                stats.dropped += batch.len();
            }
        }

        info!(written = stats.written, dropped = stats.dropped, "quote writer finished");
        stats
    })
}

async fn write_with_retry<S: QuoteSink>(
    sink: &mut S,
    batch: &[CanonicalQuote],
    settings: &SinkSettings,
) -> bool {
    let mut delay = settings.retry_delay;
    let mut attempt = 0;

    loop {
        match sink.write(batch).await {
            Ok(()) => {
                debug!(quotes = batch.len(), "batch written");
                return true;
            }
            Err(error) if attempt < settings.max_retries => {
                attempt += 1;
                warn!(%error, attempt, ?delay, "sink write failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => {
                error!(%error, dropped = batch.len(), "sink write failed, dropping batch");
                return false;
            }
        }
    }
}
