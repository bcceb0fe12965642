use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use super::error::CallbackError;
use super::phase::CallbackPhase;
use super::traits::{Navigator, ProfileCache};
use crate::fragment;
use crate::redirect;
use crate::session::SessionStore;
use crate::storage::KeyValueStore;
use crate::token;
use crate::types::DecodedIdentity;

/// What to do when the access token payload cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Log it and finish the hand-off without an identity.
    #[default]
    Continue,
    /// Stop with [`CallbackError::Decode`].
    Abort,
}

/// Result of one [`CallbackOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Session established and the router sent to `destination`.
    Completed {
        destination: String,
        identity: Option<DecodedIdentity>,
    },
    /// Stopped in the `Error` phase.
    Failed(CallbackError),
    /// This orchestrator already handled a fragment; nothing was done.
    AlreadyProcessed,
}

/// Drives the OAuth hand-off from fragment to navigation.
///
/// Create one per callback mount. [`run`](Self::run) executes once; repeat
/// invocations (duplicate effects, remounts sharing the instance) return
/// [`CallbackOutcome::AlreadyProcessed`] without touching storage.
pub struct CallbackOrchestrator<D, E, C, N> {
    session: Arc<SessionStore<D>>,
    ephemeral: E,
    cache: C,
    navigator: N,
    decode_failure: DecodeFailure,
    processed: AtomicBool,
    phase: watch::Sender<CallbackPhase>,
}

impl<D, E, C, N> CallbackOrchestrator<D, E, C, N>
where
    D: KeyValueStore,
    E: KeyValueStore,
    C: ProfileCache,
    N: Navigator,
{
    /// `ephemeral` is the tab-scoped store holding the pending redirect.
    #[must_use]
    pub fn new(session: Arc<SessionStore<D>>, ephemeral: E, cache: C, navigator: N) -> Self {
        let (phase, _) = watch::channel(CallbackPhase::Idle);
        Self {
            session,
            ephemeral,
            cache,
            navigator,
            decode_failure: DecodeFailure::default(),
            processed: AtomicBool::new(false),
            phase,
        }
    }

    #[must_use]
    pub fn with_decode_failure(mut self, policy: DecodeFailure) -> Self {
        self.decode_failure = policy;
        self
    }

    #[must_use]
    pub fn phase(&self) -> CallbackPhase {
        *self.phase.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallbackPhase> {
        self.phase.subscribe()
    }

    /// Whether a run has already started.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::SeqCst)
    }

    /// Runs the hand-off for `fragment`, strictly step by step.
    pub async fn run(&self, fragment: &str) -> CallbackOutcome {
        if self.processed.swap(true, Ordering::SeqCst) {
            tracing::debug!("OAuth callback already processed");
            return CallbackOutcome::AlreadyProcessed;
        }

        self.advance(CallbackPhase::ExtractingTokens);
        let Some(tokens) = fragment::extract_tokens(fragment) else {
            tracing::warn!("OAuth callback without access token");
            return self.fail(CallbackError::MissingToken);
        };

        self.advance(CallbackPhase::Decoding);
        let identity = match token::decode_identity(tokens.access_token()) {
            Ok(identity) => Some(identity),
            Err(e) if self.decode_failure == DecodeFailure::Abort => {
                tracing::warn!(error = %e, "Access token payload unreadable");
                self.discard_redirect().await;
                return self.fail(CallbackError::Decode(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Access token payload unreadable, continuing without identity"
                );
                None
            }
        };

        self.advance(CallbackPhase::Persisting);
        if let Err(e) = self.session.login_with_oauth(tokens, identity.clone()).await {
            tracing::error!(error = %e, "Session persistence failed");
            self.discard_redirect().await;
            return self.fail(CallbackError::Persistence(e.to_string()));
        }

        self.advance(CallbackPhase::InvalidatingCache);
        self.cache.invalidate().await;

        self.advance(CallbackPhase::ResolvingRedirect);
        let config = self.session.config();
        let stored = redirect::take_redirect(&self.ephemeral, config.redirect_key()).await;
        let destination = stored
            .as_deref()
            .and_then(|path| redirect::validate_redirect(path, config.allowed_redirect_prefixes()))
            .unwrap_or(config.default_landing())
            .to_owned();

        self.advance(CallbackPhase::Navigating);
        self.navigator.clear_fragment();
        let delay = config.settle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.navigator.navigate(&destination);

        self.advance(CallbackPhase::Done);
        tracing::info!(
            destination = %destination,
            user_id = ?identity.as_ref().map(|i| i.id),
            "OAuth hand-off complete"
        );

        CallbackOutcome::Completed {
            destination,
            identity,
        }
    }

    fn advance(&self, next: CallbackPhase) {
        let previous = self.phase.send_replace(next);
        debug_assert!(
            previous.can_transition_to(next),
            "invalid callback transition {previous:?} -> {next:?}"
        );
        tracing::trace!(from = ?previous, to = ?next, "Callback phase");
    }

    /// Drops the pending redirect of a hand-off that will not navigate.
    async fn discard_redirect(&self) {
        let config = self.session.config();
        if let Some(path) = redirect::take_redirect(&self.ephemeral, config.redirect_key()).await {
            tracing::debug!(path = %path, "Discarded pending redirect of failed hand-off");
        }
    }

    fn fail(&self, error: CallbackError) -> CallbackOutcome {
        self.advance(CallbackPhase::Error);
        CallbackOutcome::Failed(error)
    }
}
