pub mod config;
pub mod error;
mod bridge;
mod buffer;
mod sink;
mod source;
mod stats;

pub use error::PipelineError;
pub use bridge::{BridgeAbort, BridgeHandle, spawn_bridge};
pub use buffer::SharedBuffer;
pub use sink::{FlushOutcome, FlushScheduler, spawn_flush_task};
pub use source::{IngestOutcome, IngestPath, spawn_ingest_task};
pub use stats::{BridgeStats, StatsSnapshot};
