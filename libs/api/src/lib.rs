mod error;
mod pipeline;
mod types;
mod util;

pub use error::{ErrorKind, PluginError};
pub use pipeline::{BatchSink, Codec, MessagePublisher, MessageSource};
pub use types::{Batch, InboundMessage, Record};
pub use util::{mask_uri_credentials, now_ms};
