use std::sync::atomic::{AtomicU64, Ordering};

/// Счётчики bridge'а: ingest и flush стороны.
///
/// Обновляются без блокировок, читаются через `snapshot()`.
#[derive(Debug, Default)]
pub struct BridgeStats {
    messages_received: AtomicU64,
    records_accepted: AtomicU64,
    payloads_rejected: AtomicU64,
    batches_written: AtomicU64,
    records_written: AtomicU64,
    batches_failed: AtomicU64,
    records_dropped: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub records_accepted: u64,
    pub payloads_rejected: u64,
    pub batches_written: u64,
    pub records_written: u64,
    pub batches_failed: u64,
    pub records_dropped: u64,
}

impl BridgeStats {
    pub const fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            payloads_rejected: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_accepted(&self) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn payload_rejected(&self) {
        self.payloads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn batch_written(&self, records: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.records_written.fetch_add(records, Ordering::Relaxed);
    }

    #[inline]
    pub fn batch_failed(&self, records: u64) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.records_dropped.fetch_add(records, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            payloads_rejected: self.payloads_rejected.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = BridgeStats::new();
        stats.message_received();
        stats.message_received();
        stats.record_accepted();
        stats.payload_rejected();
        stats.batch_written(7);
        stats.batch_failed(3);
        stats.batch_written(2);

        let snap = stats.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.records_accepted, 1);
        assert_eq!(snap.payloads_rejected, 1);
        assert_eq!(snap.batches_written, 2);
        assert_eq!(snap.records_written, 9);
        assert_eq!(snap.batches_failed, 1);
        assert_eq!(snap.records_dropped, 3);
    }
}
