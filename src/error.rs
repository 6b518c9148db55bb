use std::path::PathBuf;
use thiserror::Error;

/// Run-level failures. Everything else the scrape loop meets (empty pages,
/// broken pagination, unparseable cells) is absorbed and logged.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("page never reached a ready state: {url}")]
    LoadFailure { url: String },

    #[error("browser session could not be started: {0:#}")]
    Browser(anyhow::Error),

    #[error("failed to write artifact {path}: {source:#}")]
    Persist {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
