#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid flush config: {0}")]
    InvalidConfig(String),

    #[error("sink init ({sink}): {source}")]
    SinkInit { sink: String, source: bridge_api::PluginError },
}
