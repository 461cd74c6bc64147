use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

/// Error taxonomy for a single crawl run.
///
/// Variants map directly onto the fallback behavior the orchestrator applies:
/// `Transient` and `PermanentFetch` are recorded against the offending URL and the
/// run continues; `LlmProvider` triggers a downgrade to the heuristic tier; `Dedup`
/// is fatal; `SubscriberWrite` and `Persist` are logged and swallowed.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("transient fetch error for {url}: {source}")]
    Transient {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("permanent fetch failure for {url}: {reason}")]
    PermanentFetch { url: String, reason: String },

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("dedup state corruption: {0}")]
    Dedup(String),

    #[error("subscriber write failed: {0}")]
    SubscriberWrite(String),

    #[error("failed to persist page {url}: {source}")]
    Persist {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Whether this error should abort the whole run rather than just the
    /// URL or subscriber it was raised against.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::Dedup(_))
    }
}
