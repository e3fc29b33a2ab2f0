use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetectError>;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend model is loading, retry in {retry_after_secs}s")]
    UpstreamLoading { retry_after_secs: f64 },

    #[error("Credential rejected by backend")]
    UpstreamAuth,

    #[error("Backend unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

impl DetectError {
    /// Short tag for metrics labels and failover records
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::Config(_) => "config",
            DetectError::UpstreamLoading { .. } => "loading",
            DetectError::UpstreamAuth => "auth",
            DetectError::UpstreamUnavailable(_) => "unavailable",
            DetectError::MalformedResponse(_) => "malformed",
        }
    }
}
