//! OAuth hand-off: from the callback URL fragment to an established session.
//!
//! The backend finishes the provider flow and redirects the browser to a
//! client route with the tokens in the fragment. [`CallbackOrchestrator`]
//! picks them up, records the session, invalidates cached account data,
//! resolves the stashed destination and navigates there.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use vestis_auth::callback::{CallbackOrchestrator, CallbackOutcome};
//!
//! let orchestrator = CallbackOrchestrator::new(session, tab_storage, account_cache, router);
//! match orchestrator.run(&location_hash).await {
//!     CallbackOutcome::Failed(err) => show_error(err.user_message()),
//!     _ => {}
//! }
//! ```

#[cfg(feature = "api")]
mod cache;
mod error;
mod orchestrator;
mod phase;
mod traits;

#[cfg(feature = "api")]
pub use cache::CachedAccount;
pub use error::CallbackError;
pub use orchestrator::{CallbackOrchestrator, CallbackOutcome, DecodeFailure};
pub use phase::CallbackPhase;
pub use traits::{Navigator, ProfileCache};
