use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_api::BatchSink;

use crate::buffer::SharedBuffer;
use crate::stats::BridgeStats;

// ═══════════════════════════════════════════════════════════════
//  Flush scheduler: buffer.drain() → sink.write(batch)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Буфер был пуст, sink не вызывался.
    Empty,
    /// Batch записан целиком.
    Written(usize),
    /// Sink вернул ошибку, batch отброшен.
    Dropped(usize),
}

/// Один цикл flush'а: drain → write → лог результата.
///
/// Доставка at-most-once: batch после `write` отбрасывается при любом
/// исходе, повторов и fallback'а нет.
pub struct FlushScheduler {
    buffer: Arc<SharedBuffer>,
    sink: Arc<dyn BatchSink>,
    stats: Arc<BridgeStats>,
    interval: Duration,
}

impl FlushScheduler {
    pub fn new(
        buffer: Arc<SharedBuffer>,
        sink: Arc<dyn BatchSink>,
        stats: Arc<BridgeStats>,
        interval: Duration,
    ) -> Self {
        Self { buffer, sink, stats, interval }
    }

    pub async fn flush_once(&self) -> FlushOutcome {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            tracing::debug!(sink = %self.sink.name(), "nothing to flush");
            return FlushOutcome::Empty;
        }

        let count = batch.len();
        match self.sink.write(batch).await {
            Ok(()) => {
                self.stats.batch_written(count as u64);
                tracing::info!(sink = %self.sink.name(), records = count, "batch written");
                FlushOutcome::Written(count)
            }
            Err(e) => {
                self.stats.batch_failed(count as u64);
                tracing::error!(
                    sink = %self.sink.name(),
                    records = count,
                    error = %e,
                    "bulk write failed, batch discarded"
                );
                FlushOutcome::Dropped(count)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Flush task: sleep(interval) → flush_once(), until cancelled
// ═══════════════════════════════════════════════════════════════

/// Запустить flush task. Интервал отсчитывается после завершения
/// предыдущей записи: зависший sink задерживает следующие flush'и,
/// но не ingest.
///
/// После отмены `token` выполняет финальный flush (если `final_flush`).
pub fn spawn_flush_task(
    scheduler: FlushScheduler,
    final_flush: bool,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            sink = %scheduler.sink.name(),
            interval_ms = scheduler.interval.as_millis() as u64,
            "flush worker started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(scheduler.interval) => {
                    scheduler.flush_once().await;
                }
                _ = token.cancelled() => break,
            }
        }

        if final_flush {
            match scheduler.flush_once().await {
                FlushOutcome::Empty => {}
                outcome => tracing::info!(?outcome, "final flush"),
            }
        }
        tracing::info!(sink = %scheduler.sink.name(), "flush worker stopped");
    })
}
