use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bridge_api::{BatchSink, Codec, PluginError, mask_uri_credentials};
use codec_json::JsonCodec;
use pipeline::{BridgeHandle, PipelineError, StatsSnapshot, spawn_bridge};
use storage_memory::MemoryStorage;
use storage_mongodb::MongoStorage;
use transport_mqtt::MqttSource;

use crate::config::{BridgeArgs, Settings, StorageKind};
use crate::error::BridgeError;

pub async fn run(args: BridgeArgs) -> Result<(), BridgeError> {
    tracing::info!("telemetry-bridge starting");

    // --- Settings: проверяются до любого подключения ---
    let settings = Settings::resolve(&args)?;

    // --- Store ---
    let sink = open_sink(&settings).await?;
    sink.init().await.map_err(|source| PipelineError::SinkInit {
        sink: sink.name().to_string(),
        source,
    })?;
    tracing::info!(sink = %sink.name(), "storage ready");

    // --- Broker ---
    let source = MqttSource::connect(&settings.mqtt).await.inspect_err(|e| {
        tracing::error!(broker = %settings.mqtt.address(), error = %e, "FATAL: cannot connect to mqtt broker");
    })?;

    // --- Bridge ---
    let token = CancellationToken::new();
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
    let handle = spawn_bridge(Box::new(source), codec, sink, &settings.flush, token.clone())?;
    tracing::info!(
        topic = %settings.mqtt.topic,
        interval_ms = settings.flush.interval_ms,
        "bridge ready"
    );

    // --- Ожидание Ctrl+C или остановки ingest'а ---
    wait_for_shutdown(tokio::signal::ctrl_c(), &token).await;
    let result = shutdown(handle, settings.shutdown_grace).await;

    log_stats(&result.snapshot);
    result.outcome?;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Ждать Ctrl+C или самостоятельной остановки bridge'а, затем отменить `token`.
///
/// Ошибка установки обработчика сигнала не прерывает остановку: ingest
/// всё равно гасится, а накопленные записи уходят в финальный flush.
async fn wait_for_shutdown<S>(signal: S, token: &CancellationToken)
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        signal = signal => match signal {
            Ok(()) => tracing::info!("shutting down..."),
            Err(e) => tracing::error!(error = %e, "cannot listen for ctrl-c, shutting down"),
        },
        _ = token.cancelled() => {
            tracing::info!("bridge stopped, shutting down...");
        }
    }
    token.cancel();
}

struct Shutdown {
    snapshot: StatsSnapshot,
    outcome: Result<(), PluginError>,
}

/// Ingest останавливается первым, затем финальный flush; после grace period abort.
async fn shutdown(handle: BridgeHandle, grace: Duration) -> Shutdown {
    let stats = handle.stats();
    let abort = handle.abort_handle();
    let outcome = match tokio::time::timeout(grace, handle.join()).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "tasks did not stop in time, aborting");
            abort.abort();
            Ok(())
        }
    };
    Shutdown {
        snapshot: stats.snapshot(),
        outcome,
    }
}

async fn open_sink(settings: &Settings) -> Result<Arc<dyn BatchSink>, BridgeError> {
    match (settings.storage, &settings.mongo) {
        (StorageKind::Mongodb, Some(mongo)) => {
            tracing::info!(
                uri = %mask_uri_credentials(&mongo.uri),
                database = %mongo.database,
                collection = %mongo.collection,
                "connecting to mongodb"
            );
            Ok(Arc::new(MongoStorage::connect(mongo).await?))
        }
        (StorageKind::Mongodb, None) => Err(BridgeError::MissingSettings(vec![
            "MONGO_URI",
            "MONGO_DATABASE",
            "MONGO_COLLECTION",
        ])),
        (StorageKind::Memory, _) => {
            tracing::info!(max_records = settings.memory.max_records, "using in-memory storage");
            Ok(Arc::new(MemoryStorage::from_config(&settings.memory)))
        }
    }
}

fn log_stats(s: &StatsSnapshot) {
    tracing::info!(
        received = s.messages_received,
        accepted = s.records_accepted,
        rejected = s.payloads_rejected,
        batches_written = s.batches_written,
        records_written = s.records_written,
        batches_failed = s.batches_failed,
        records_dropped = s.records_dropped,
        "bridge stats"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;

    use bridge_api::{InboundMessage, MessageSource};
    use pipeline::config::FlushConfig;

    /// Отдаёт заранее заданные сообщения, затем молчит до отмены.
    struct Scripted(Vec<InboundMessage>);

    impl MessageSource for Scripted {
        fn next_message(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, PluginError>> + Send + '_>> {
            Box::pin(async move {
                match self.0.pop() {
                    Some(message) => Ok(Some(message)),
                    None => std::future::pending().await,
                }
            })
        }

        fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn signal_handler_error_still_cancels() {
        let token = CancellationToken::new();
        wait_for_shutdown(async { Err(std::io::Error::other("no signal driver")) }, &token).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn signal_handler_error_still_flushes_buffer() {
        let sink = Arc::new(MemoryStorage::new(16));
        let source = Scripted(vec![InboundMessage::new("sensors/data", br#"{"UUID":"SOLO-1","ph":6.5}"#.to_vec())]);
        let config = FlushConfig {
            interval_ms: 60_000,
            final_flush: true,
        };
        let token = CancellationToken::new();
        let handle = spawn_bridge(Box::new(source), Arc::new(JsonCodec), sink.clone(), &config, token.clone()).unwrap();

        // Дать ingest'у принять сообщение; интервальный flush ещё не наступил.
        while handle.stats().snapshot().records_accepted == 0 {
            tokio::task::yield_now().await;
        }

        wait_for_shutdown(async { Err(std::io::Error::other("no signal driver")) }, &token).await;
        let result = shutdown(handle, Duration::from_secs(5)).await;

        assert!(result.outcome.is_ok());
        assert_eq!(result.snapshot.records_written, 1);
        assert_eq!(sink.records().await.len(), 1);
    }
}
