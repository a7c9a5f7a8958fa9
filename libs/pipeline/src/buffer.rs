use std::sync::{Mutex, MutexGuard, PoisonError};

use bridge_api::{Batch, Record};

// ═══════════════════════════════════════════════════════════════
//  SharedBuffer
// ═══════════════════════════════════════════════════════════════

/// Накопитель записей между flush'ами.
///
/// Один экземпляр на процесс, разделяется через `Arc` между ingest
/// task'ом (append) и flush task'ом (drain). Append и drain выполняются
/// под одним mutex'ом: запись либо попадает в текущий drain целиком,
/// либо остаётся для следующего. Ёмкость не ограничена.
#[derive(Default)]
pub struct SharedBuffer {
    records: Mutex<Vec<Record>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить запись в конец. Критическая секция: один `push`.
    pub fn append(&self, record: Record) {
        self.lock().push(record);
    }

    /// Атомарно забрать всё содержимое и оставить буфер пустым.
    ///
    /// Пустой буфер даёт пустой Batch, это no-op для вызывающего.
    pub fn drain(&self) -> Batch {
        let records = std::mem::take(&mut *self.lock());
        Batch::from(records)
    }

    // Паника внутри push/take не оставляет Vec в несогласованном
    // состоянии, поэтому poisoned lock безопасно продолжать использовать.
    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn reading(n: i64) -> Record {
        Record::new().with("seq", n)
    }

    fn seqs(batch: &Batch) -> Vec<i64> {
        batch.iter().filter_map(|r| r.get("seq")?.as_i64()).collect()
    }

    #[test]
    fn drain_empty_returns_empty_batch() {
        let buf = SharedBuffer::new();
        assert!(buf.drain().is_empty());
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn drain_preserves_append_order_and_resets() {
        let buf = SharedBuffer::new();
        for n in 0..5 {
            buf.append(reading(n));
        }
        let batch = buf.drain();
        assert_eq!(seqs(&batch), vec![0, 1, 2, 3, 4]);
        assert!(buf.drain().is_empty());

        buf.append(reading(10));
        assert_eq!(seqs(&buf.drain()), vec![10]);
    }

    #[test]
    fn concurrent_appends_and_drains_lose_and_duplicate_nothing() {
        const WRITERS: i64 = 4;
        const PER_WRITER: i64 = 2_000;

        let buf = Arc::new(SharedBuffer::new());

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let buf = buf.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_WRITER {
                        buf.append(reading(w * PER_WRITER + i));
                    }
                })
            })
            .collect();

        let drainer = {
            let buf = buf.clone();
            std::thread::spawn(move || {
                let mut batches = Vec::new();
                for _ in 0..200 {
                    batches.push(buf.drain());
                    std::thread::yield_now();
                }
                batches
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        let mut batches = drainer.join().unwrap();
        batches.push(buf.drain());

        let mut seen = HashSet::new();
        for batch in &batches {
            let batch_seqs = seqs(batch);
            for s in &batch_seqs {
                assert!(seen.insert(*s), "record {s} observed by two drains");
            }
            // Внутри одного writer'а порядок сохраняется.
            for w in 0..WRITERS {
                let own: Vec<_> = batch_seqs.iter().filter(|s| **s / PER_WRITER == w).collect();
                assert!(own.windows(2).all(|p| p[0] < p[1]));
            }
        }
        assert_eq!(seen.len() as i64, WRITERS * PER_WRITER);
    }
}
