use std::future::Future;
use std::pin::Pin;

use crate::{Batch, InboundMessage, PluginError, Record};

// ════════════════════════════════════════════════════════════════
//  Bridge Plugin Traits
// ════════════════════════════════════════════════════════════════

/// Codec, парсер формата payload (bytes ↔ Record).
///
/// Реализации должны быть stateless: один экземпляр используется
/// ingest task'ом и генератором нагрузки.
pub trait Codec: Send + Sync {
    /// Парсинг: сырые байты → Record. Любая ошибка имеет вид `ErrorKind::Format`,
    /// payload не должен попасть в буфер даже частично.
    fn decode(&self, payload: &[u8]) -> Result<Record, PluginError>;

    /// Сериализация Record → байты (используется генератором нагрузки).
    fn encode(&self, record: &Record) -> Result<Vec<u8>, PluginError>;
}

/// Persistence sink: bulk запись batch'а в store.
///
/// Вызывается flush task'ом только для непустого batch'а, ровно один раз:
/// повторов нет, поэтому идемпотентность не требуется.
pub trait BatchSink: Send + Sync {
    /// Имя sink'а (для логирования).
    fn name(&self) -> &str;

    /// Проверка store перед стартом (ping, создание коллекции и т.д.).
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    /// Записать batch одной операцией. После возврата batch отбрасывается
    /// независимо от результата.
    fn write(&self, batch: Batch) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}

/// Subscriber adapter: владеет соединением с брокером и отдаёт
/// входящие сообщения по одному, в порядке получения.
///
/// Переподключение: ответственность адаптера. Ошибка из `next_message`
/// означает, что адаптер сдался (`ErrorKind::Connection`).
pub trait MessageSource: Send {
    /// Дождаться следующего сообщения. None = соединение закрыто штатно.
    #[allow(clippy::type_complexity)]
    fn next_message(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, PluginError>> + Send + '_>>;

    /// Закрыть соединение (graceful shutdown).
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}

/// Publisher: исходящая сторона транспорта (генератор нагрузки).
pub trait MessagePublisher: Send + Sync {
    fn publish(&self, payload: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}
