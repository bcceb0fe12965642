/// Steps of the OAuth hand-off, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackPhase {
    Idle,
    ExtractingTokens,
    Decoding,
    Persisting,
    InvalidatingCache,
    ResolvingRedirect,
    Navigating,
    Done,
    Error,
}

impl CallbackPhase {
    /// Whether the hand-off may move from `self` to `next`.
    ///
    /// `Error` is reachable only from extraction, decoding and persistence.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use CallbackPhase::*;

        matches!(
            (self, next),
            (Idle, ExtractingTokens)
                | (ExtractingTokens, Decoding | Error)
                | (Decoding, Persisting | Error)
                | (Persisting, InvalidatingCache | Error)
                | (InvalidatingCache, ResolvingRedirect)
                | (ResolvingRedirect, Navigating)
                | (Navigating, Done)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}
