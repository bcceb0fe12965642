/// Terminal failures of the OAuth hand-off.
///
/// Reported to the UI as state, never retried: the user restarts the flow
/// from the login page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The fragment was empty or carried no access token.
    #[error("Missing access token in callback")]
    MissingToken,

    /// The access token payload was unreadable and the orchestrator runs
    /// with [`DecodeFailure::Abort`](super::DecodeFailure::Abort).
    #[error("Unreadable access token: {0}")]
    Decode(String),

    /// The session could not be written to storage.
    #[error("Session could not be saved: {0}")]
    Persistence(String),
}

impl CallbackError {
    /// Message suitable for the callback page.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingToken | Self::Decode(_) => {
                "This sign-in link is invalid or has expired. Please sign in again."
            }
            Self::Persistence(_) => {
                "We couldn't save your session on this device. Please sign in again."
            }
        }
    }
}
