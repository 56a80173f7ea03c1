use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quote_poller::config::{Settings, SinkKind};
use quote_poller::model::ExchangeId;
use quote_poller::orchestrator::Poller;
use quote_poller::repository::{DataSourceRepository, JsonFileRepository};
use quote_poller::sink::{spawn_writer, LogSink, QuestDbSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let exchange = ExchangeId::try_from(settings.exchange_id)?;

    let repository = JsonFileRepository::new(&settings.data_sources_path);
    let data_source = repository.find_by_id(settings.exchange_id)?;
    info!(
        ?exchange,
        data_source = %data_source.name,
        pairs = data_source.symbol_pairs.len(),
        sink = %settings.sink,
        "starting quote poller"
    );

    let (quotes_tx, quotes_rx) = flume::bounded(settings.quote_buffer);
    let writer = match settings.sink {
        SinkKind::Log => spawn_writer(quotes_rx, LogSink, settings.sink_settings.clone()),
        SinkKind::QuestDb => spawn_writer(
            quotes_rx,
            QuestDbSink::new(settings.questdb_addr.clone()),
            settings.sink_settings.clone(),
        ),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "can't listen for ctrl-c");
                return;
            }
            info!("shutdown requested");
            cancel.cancel();
        });
    }

    let poller = Poller::new(data_source, settings.connection, settings.reconnect);
    let result = poller.poll_exchange(exchange, quotes_tx, cancel.clone()).await;
    cancel.cancel();

    // every sender is gone once the poller returns, so the writer drains and stops
    match writer.await {
        Ok(stats) => info!(written = stats.written, dropped = stats.dropped, "quote poller stopped"),
        Err(join_error) => error!(error = %join_error, "quote writer panicked"),
    }

    result?;
    Ok(())
}
