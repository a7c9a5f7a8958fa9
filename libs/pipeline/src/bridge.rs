use std::sync::Arc;

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use bridge_api::{BatchSink, Codec, MessageSource, PluginError};

use crate::buffer::SharedBuffer;
use crate::config::FlushConfig;
use crate::sink::{FlushScheduler, spawn_flush_task};
use crate::source::{IngestPath, spawn_ingest_task};
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Bridge: ingest task + flush task над одним SharedBuffer
// ═══════════════════════════════════════════════════════════════

/// Запустить bridge: ingest task (source → buffer) и flush task
/// (buffer → sink), связанные только через SharedBuffer.
///
/// Отмена `token` останавливает ingest; flush task останавливается
/// только после завершения ingest'а, поэтому финальный flush видит
/// все принятые записи.
pub fn spawn_bridge(
    source: Box<dyn MessageSource>,
    codec: Arc<dyn Codec>,
    sink: Arc<dyn BatchSink>,
    config: &FlushConfig,
    token: CancellationToken,
) -> Result<BridgeHandle, PipelineError> {
    config.validate()?;

    let buffer = Arc::new(SharedBuffer::new());
    let stats = Arc::new(BridgeStats::new());

    let ingest = IngestPath::new(codec, buffer.clone(), stats.clone());
    let scheduler = FlushScheduler::new(buffer, sink, stats.clone(), config.interval());

    let flush_token = CancellationToken::new();
    let ingest = spawn_ingest_task(source, ingest, token);
    let flush = spawn_flush_task(scheduler, config.final_flush, flush_token.clone());

    Ok(BridgeHandle {
        stats,
        ingest,
        flush,
        flush_token,
    })
}

pub struct BridgeHandle {
    stats: Arc<BridgeStats>,
    ingest: JoinHandle<Result<(), PluginError>>,
    flush: JoinHandle<()>,
    flush_token: CancellationToken,
}

/// Принудительная остановка обоих task'ов (после истечения grace period).
#[derive(Clone)]
pub struct BridgeAbort {
    ingest: AbortHandle,
    flush: AbortHandle,
}

impl BridgeAbort {
    pub fn abort(&self) {
        self.ingest.abort();
        self.flush.abort();
    }
}

impl BridgeHandle {
    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }

    pub fn abort_handle(&self) -> BridgeAbort {
        BridgeAbort {
            ingest: self.ingest.abort_handle(),
            flush: self.flush.abort_handle(),
        }
    }

    /// Дождаться остановки: сначала ingest, затем flush (с финальным flush'ем).
    ///
    /// Возвращает ошибку subscriber'а, если ingest остановился из-за неё.
    pub async fn join(self) -> Result<StatsSnapshot, PluginError> {
        let ingest_result = match self.ingest.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "ingest task failed");
                Ok(())
            }
        };

        self.flush_token.cancel();
        if let Err(e) = self.flush.await {
            tracing::error!(error = %e, "flush task failed");
        }

        ingest_result.map(|()| self.stats.snapshot())
    }
}
