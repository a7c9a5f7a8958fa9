#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),

    #[error("plugin: {0}")]
    Plugin(#[from] bridge_api::PluginError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),
}
