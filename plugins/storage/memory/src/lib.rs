use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use bridge_api::{Batch, BatchSink, PluginError, Record};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryStorageConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorage
// ═══════════════════════════════════════════════════════════════

/// In-memory ring-buffer storage. Для dry run без MongoDB:
/// хранит последние `max_records` записей, старые вытесняются.
pub struct MemoryStorage {
    records: RwLock<VecDeque<Record>>,
    max_records: usize,
    writes: AtomicU64,
}

impl MemoryStorage {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(max_records.min(65536))),
            max_records,
            writes: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &MemoryStorageConfig) -> Self {
        Self::new(config.max_records)
    }

    /// Копия сохранённых записей, от старых к новым.
    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.iter().cloned().collect()
    }

    /// Количество успешных вызовов `write`.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BatchSink for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.max_records == 0 {
                return Err(PluginError::config("memory storage: max_records must be > 0"));
            }
            Ok(())
        })
    }

    fn write(&self, batch: Batch) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            let mut buf = self.records.write().await;
            for record in batch {
                if buf.len() >= self.max_records {
                    buf.pop_front();
                }
                buf.push_back(record);
            }
            self.writes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}
