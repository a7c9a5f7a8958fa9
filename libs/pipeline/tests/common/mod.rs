#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use bridge_api::{Batch, BatchSink, InboundMessage, MessageSource, PluginError};

pub const TOPIC: &str = "sensors/readings";

// ═══════════════════════════════════════════════════════════════
//  ChannelSource: subscriber adapter поверх mpsc
// ═══════════════════════════════════════════════════════════════

pub enum Feed {
    Message(InboundMessage),
    Fail(PluginError),
}

pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Feed>,
}

#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<Feed>,
}

impl Publisher {
    pub fn send(&self, payload: &str) {
        let _ = self.tx.send(Feed::Message(InboundMessage::new(TOPIC, payload)));
    }

    pub fn fail(&self, error: PluginError) {
        let _ = self.tx.send(Feed::Fail(error));
    }
}

pub fn channel_source() -> (Publisher, Box<dyn MessageSource>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Publisher { tx }, Box::new(ChannelSource { rx }))
}

impl MessageSource for ChannelSource {
    fn next_message(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(Feed::Message(m)) => Ok(Some(m)),
                Some(Feed::Fail(e)) => Err(e),
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        self.rx.close();
        Box::pin(async { Ok(()) })
    }
}

// ═══════════════════════════════════════════════════════════════
//  RecordingSink: запоминает каждый вызов write
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<Batch>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Все вызовы write, включая неуспешные.
    pub fn writes(&self) -> Vec<Batch> {
        self.writes.lock().unwrap().clone()
    }
}

impl BatchSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn write(&self, batch: Batch) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.writes.lock().unwrap().push(batch);
            if self.fail.load(Ordering::SeqCst) {
                Err(PluginError::persistence("store unavailable"))
            } else {
                Ok(())
            }
        })
    }
}

pub fn reading(seq: i64) -> String {
    format!(r#"{{"UUID":"SOLO-{seq}","unixtime":1718000000,"seq":{seq}}}"#)
}

pub fn seqs(batch: &Batch) -> Vec<i64> {
    batch.iter().filter_map(|r| r.get("seq")?.as_i64()).collect()
}
