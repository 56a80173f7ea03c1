use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ConnectionError, PollerError};
use crate::exchanges::binance::BinanceAdapter;
use crate::exchanges::bitfinex::BitfinexAdapter;
use crate::exchanges::{run_session, ConnectionSettings, ExchangeAdapter};
use crate::model::{CanonicalQuote, DataSource, ExchangeId, SymbolPair};
use crate::reconnect::{ReconnectConfig, ReconnectPolicy};

/// Splits pairs into contiguous chunks of at most `rate_limit` pairs, keeping
/// their order. A rate limit of 0 puts every pair on one connection.
pub fn chunk_pairs(pairs: &[SymbolPair], rate_limit: usize) -> Vec<Vec<SymbolPair>> {
    if rate_limit == 0 {
        return vec![pairs.to_vec()];
    }

    pairs.chunks(rate_limit).map(<[SymbolPair]>::to_vec).collect()
}

/// Runs one connection per chunk of a data source and restarts the ones
/// that fail.
pub struct Poller {
    data_source: DataSource,
    connection: ConnectionSettings,
    reconnect: ReconnectConfig,
}

impl Poller {
    pub fn new(
        data_source: DataSource,
        connection: ConnectionSettings,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            data_source,
            connection,
            reconnect,
        }
    }

    /// Picks the adapter for `exchange` and polls until `cancel` fires.
    pub async fn poll_exchange(
        &self,
        exchange: ExchangeId,
        quotes: flume::Sender<CanonicalQuote>,
        cancel: CancellationToken,
    ) -> Result<(), PollerError> {
        match exchange {
            ExchangeId::Binance => self.poll::<BinanceAdapter>(quotes, cancel).await,
            ExchangeId::Bitfinex => self.poll::<BitfinexAdapter>(quotes, cancel).await,
        }
    }

    /// Returns once every chunk has stopped. Chunks that ran out of restart
    /// attempts are reported through the first such error.
    pub async fn poll<A: ExchangeAdapter>(
        &self,
        quotes: flume::Sender<CanonicalQuote>,
        cancel: CancellationToken,
    ) -> Result<(), PollerError> {
        let pairs = &self.data_source.symbol_pairs;
        if pairs.is_empty() {
            return Err(PollerError::NoSymbolPairs(self.data_source.name.clone()));
        }

        let chunks = chunk_pairs(pairs, self.data_source.rate_limit);
        info!(
            exchange = A::NAME,
            data_source = %self.data_source.name,
            pairs = pairs.len(),
            chunks = chunks.len(),
            rate_limit = self.data_source.rate_limit,
            "starting poller"
        );

        let endpoint: Arc<str> = Arc::from(self.data_source.connection_string.as_str());
        let mut tasks = JoinSet::new();

        for (chunk, pairs) in chunks.into_iter().enumerate() {
            tasks.spawn(supervise_chunk::<A>(
                chunk,
                pairs,
                endpoint.clone(),
                self.connection.clone(),
                self.reconnect.clone(),
                quotes.clone(),
                cancel.clone(),
            ));
        }
        drop(quotes);

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(chunk_error)) => {
                    error!(exchange = A::NAME, error = %chunk_error, "chunk stopped for good");
                    failure.get_or_insert(chunk_error);
                }
                Err(join_error) => {
                    error!(exchange = A::NAME, error = %join_error, "chunk task panicked");
                }
            }
        }

        info!(exchange = A::NAME, "poller stopped");
        failure.map_or(Ok(()), Err)
    }
}

async fn supervise_chunk<A: ExchangeAdapter>(
    chunk: usize,
    pairs: Vec<SymbolPair>,
    endpoint: Arc<str>,
    settings: ConnectionSettings,
    reconnect: ReconnectConfig,
    quotes: flume::Sender<CanonicalQuote>,
    cancel: CancellationToken,
) -> Result<(), PollerError> {
    let mut policy = ReconnectPolicy::new(reconnect);

    loop {
        let session = run_session::<A>(
            &endpoint,
            chunk,
            pairs.clone(),
            &settings,
            quotes.clone(),
            cancel.clone(),
        )
        .await;
        let healthy = session.was_healthy();

        let error = match session.result {
            Ok(()) => return Ok(()),
            Err(ConnectionError::QuotesDisconnected) => {
                warn!(exchange = A::NAME, chunk, "quote channel closed, stopping chunk");
                return Ok(());
            }
            Err(error) => error,
        };

        if cancel.is_cancelled() {
            return Ok(());
        }

        // a connection that dies before streaming anything keeps backing off
        if healthy {
            policy.reset();
        }

        if matches!(error, ConnectionError::Expired) {
            info!(exchange = A::NAME, chunk, reason = %error, "reconnecting");
            continue;
        }

        let Some(delay) = policy.next_delay() else {
            return Err(PollerError::ChunkFailed {
                chunk,
                attempts: policy.attempt_count(),
                source: error,
            });
        };

        error!(
            exchange = A::NAME,
            chunk,
            %error,
            attempt = policy.attempt_count(),
            ?delay,
            "connection failed, restarting"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::fixtures::pair;

    fn pairs(count: usize) -> Vec<SymbolPair> {
        (0..count)
            .map(|i| pair(i as i64, &format!("B{}", i), "USD"))
            .collect()
    }

    fn data_source(endpoint: &str, count: usize) -> DataSource {
        DataSource {
            id: 2,
            name: "binance".to_string(),
            connection_string: endpoint.to_string(),
            credentials: None,
            rate_limit: 2,
            symbol_pairs: pairs(count),
        }
    }

    #[test]
    fn chunks_respect_rate_limit_and_order() {
        for (count, rate_limit) in [(0, 3), (1, 1), (5, 2), (6, 3), (7, 10), (10, 1)] {
            let input = pairs(count);
            let chunks = chunk_pairs(&input, rate_limit);

            assert_eq!(chunks.len(), (count + rate_limit - 1) / rate_limit);
            assert!(chunks.iter().all(|chunk| chunk.len() <= rate_limit && !chunk.is_empty()));
            assert_eq!(chunks.concat(), input);
        }
    }

    #[test]
    fn last_chunk_may_be_shorter() {
        let chunks = chunk_pairs(&pairs(5), 2);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn zero_rate_limit_means_one_chunk() {
        let input = pairs(7);
        let chunks = chunk_pairs(&input, 0);
        assert_eq!(chunks, vec![input]);

        assert_eq!(chunk_pairs(&[], 0).len(), 1);
    }

    #[tokio::test]
    async fn empty_data_source_is_rejected() {
        let poller = Poller::new(
            data_source("ws://127.0.0.1:1", 0),
            ConnectionSettings::default(),
            ReconnectConfig::default(),
        );
        let (tx, _rx) = flume::bounded(1);

        assert!(matches!(
            poller.poll_exchange(ExchangeId::Binance, tx, CancellationToken::new()).await,
            Err(PollerError::NoSymbolPairs(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_chunks_surface_after_retries() {
        let poller = Poller::new(
            data_source("ws://127.0.0.1:1", 3),
            ConnectionSettings {
                connect_timeout: Duration::from_millis(500),
                ..ConnectionSettings::default()
            },
            ReconnectConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts: 2,
            },
        );
        let (tx, _rx) = flume::bounded(1);

        let result = poller
            .poll_exchange(ExchangeId::Bitfinex, tx, CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(PollerError::ChunkFailed { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_retrying_chunks() {
        let poller = Poller::new(
            data_source("ws://127.0.0.1:1", 4),
            ConnectionSettings::default(),
            ReconnectConfig {
                initial_delay: Duration::from_secs(30),
                ..ReconnectConfig::default()
            },
        );
        let (tx, _rx) = flume::bounded(1);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            poller.poll_exchange(ExchangeId::Binance, tx, cancel),
        )
        .await
        .expect("poller ignored cancellation");

        assert!(result.is_ok());
        canceller.await.unwrap();
    }
}
