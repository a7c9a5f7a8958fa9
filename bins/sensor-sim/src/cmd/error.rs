use bridge_api::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Plugin(#[from] PluginError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
