use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_api::{Codec, ErrorKind, InboundMessage, MessageSource, PluginError, Record};

use crate::buffer::SharedBuffer;
use crate::stats::BridgeStats;

/// Сколько байт payload'а показывать в warn-логе при ошибке декодирования.
const PAYLOAD_PREVIEW: usize = 256;

// ═══════════════════════════════════════════════════════════════
//  Ingest path: payload → codec.decode → buffer.append
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Запись добавлена в буфер.
    Accepted,
    /// Payload отброшен (ошибка формата), буфер не изменён.
    Rejected,
}

/// Обработчик одного входящего сообщения.
///
/// Вызывается синхронно из ingest task'а, по одному сообщению за раз.
/// Никогда не возвращает ошибку наружу: плохой payload логируется
/// и отбрасывается.
#[derive(Clone)]
pub struct IngestPath {
    codec: Arc<dyn Codec>,
    buffer: Arc<SharedBuffer>,
    stats: Arc<BridgeStats>,
}

impl IngestPath {
    pub fn new(codec: Arc<dyn Codec>, buffer: Arc<SharedBuffer>, stats: Arc<BridgeStats>) -> Self {
        Self { codec, buffer, stats }
    }

    pub fn on_message(&self, message: &InboundMessage) -> IngestOutcome {
        self.stats.message_received();

        match self.decode(&message.payload) {
            Ok(record) => {
                self.buffer.append(record);
                self.stats.record_accepted();
                IngestOutcome::Accepted
            }
            Err(e) => {
                let preview = &message.payload[..message.payload.len().min(PAYLOAD_PREVIEW)];
                tracing::warn!(
                    topic = %message.topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(preview),
                    "payload is not a valid reading, discarded"
                );
                self.stats.payload_rejected();
                IngestOutcome::Rejected
            }
        }
    }

    // Паника в codec'е не должна уронить ingest task.
    fn decode(&self, payload: &[u8]) -> Result<Record, PluginError> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.codec.decode(payload)))
            .unwrap_or_else(|_| Err(PluginError::format_err("codec panicked while decoding payload")))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ingest task: source.next_message() → ingest.on_message()
// ═══════════════════════════════════════════════════════════════

/// Запустить ingest task: читает сообщения из subscriber adapter'а
/// и передаёт их в IngestPath, пока не отменён `token`.
///
/// Завершение source'а (None) или фатальная ошибка соединения
/// отменяют `token`, чтобы остановить весь bridge.
pub fn spawn_ingest_task(
    mut source: Box<dyn MessageSource>,
    ingest: IngestPath,
    token: CancellationToken,
) -> JoinHandle<Result<(), PluginError>> {
    tokio::spawn(async move {
        tracing::info!("ingest started");

        let result = loop {
            tokio::select! {
                message = source.next_message() => {
                    match message {
                        Ok(Some(message)) => {
                            ingest.on_message(&message);
                        }
                        Ok(None) => {
                            tracing::info!("subscriber closed, stopping bridge");
                            token.cancel();
                            break Ok(());
                        }
                        Err(e) => {
                            if e.kind() == ErrorKind::Connection {
                                tracing::error!(error = %e, "FATAL: subscriber connection lost, stopping bridge");
                            } else {
                                tracing::error!(error = ?e, "subscriber failed, stopping bridge");
                            }
                            token.cancel();
                            break Err(e);
                        }
                    }
                }
                _ = token.cancelled() => break Ok(()),
            }
        };

        if let Err(e) = source.close().await {
            tracing::warn!(error = %e, "subscriber close error");
        }
        tracing::info!("ingest stopped");
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec_json::JsonCodec;

    fn ingest() -> (IngestPath, Arc<SharedBuffer>, Arc<BridgeStats>) {
        let buffer = Arc::new(SharedBuffer::new());
        let stats = Arc::new(BridgeStats::new());
        let path = IngestPath::new(Arc::new(JsonCodec), buffer.clone(), stats.clone());
        (path, buffer, stats)
    }

    struct PanickingCodec;

    impl Codec for PanickingCodec {
        fn decode(&self, _payload: &[u8]) -> Result<Record, PluginError> {
            panic!("boom")
        }

        fn encode(&self, _record: &Record) -> Result<Vec<u8>, PluginError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn valid_payload_is_appended() {
        let (path, buffer, stats) = ingest();
        let outcome = path.on_message(&InboundMessage::new("sensors", r#"{"UUID":"SOLO-1","ph":6.1}"#));
        assert_eq!(outcome, IngestOutcome::Accepted);

        let batch = buffer.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records()[0].get("UUID").and_then(|v| v.as_str()), Some("SOLO-1"));
        assert_eq!(stats.snapshot().records_accepted, 1);
    }

    #[test]
    fn malformed_payload_leaves_buffer_untouched() {
        let (path, buffer, stats) = ingest();
        path.on_message(&InboundMessage::new("sensors", r#"{"n":1}"#));
        let outcome = path.on_message(&InboundMessage::new("sensors", "{\"n\": 2,"));
        assert_eq!(outcome, IngestOutcome::Rejected);

        let batch = buffer.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records()[0].get("n").and_then(|v| v.as_i64()), Some(1));

        let snap = stats.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.payloads_rejected, 1);
    }

    #[test]
    fn codec_panic_is_contained() {
        let buffer = Arc::new(SharedBuffer::new());
        let stats = Arc::new(BridgeStats::new());
        let path = IngestPath::new(Arc::new(PanickingCodec), buffer.clone(), stats.clone());

        let outcome = path.on_message(&InboundMessage::new("sensors", "{}"));
        assert_eq!(outcome, IngestOutcome::Rejected);
        assert!(buffer.drain().is_empty());
        assert_eq!(stats.snapshot().payloads_rejected, 1);
    }
}
