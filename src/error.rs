#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("No access token available")]
    MissingToken,
    #[error("Token decode error: {0}")]
    Decode(String),
    #[error("Session persistence error: {0}")]
    Persistence(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[cfg(feature = "api")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error during {operation} (status {status:?}): {detail}")]
    Api {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
}

impl Error {
    pub(crate) fn persistence(e: impl std::fmt::Display) -> Self {
        Self::Persistence(e.to_string())
    }
}
