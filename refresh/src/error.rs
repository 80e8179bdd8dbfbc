use fsimage_exporter_stats::TranslationError;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum RefreshError {
    /// Fatal. Raised while constructing the engine, the exporter must not start.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Failed to list image directory {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Fetching the image failed: {0:#}")]
    FetchFailed(eyre::Report),
    #[error("Analyzing the image failed: {0:#}")]
    ParseFailed(eyre::Report),
    #[error("The refresh cycle panicked: {0}")]
    Panicked(String),
    #[error("Translating the snapshot into metrics failed: {0}")]
    TranslationFailed(#[from] TranslationError),
}

impl RefreshError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}
