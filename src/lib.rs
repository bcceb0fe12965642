#![doc = include_str!("../README.md")]

#[cfg(feature = "api")]
pub mod api;
pub mod callback;
pub mod error;
pub mod fragment;
pub mod guard;
pub mod redirect;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "api")]
pub use api::{ApiClient, ApiConfig, PasswordLogin};
#[cfg(feature = "api")]
pub use callback::CachedAccount;
pub use callback::{
    CallbackError, CallbackOrchestrator, CallbackOutcome, CallbackPhase, DecodeFailure, Navigator,
    ProfileCache,
};
pub use error::Error;
pub use fragment::extract_tokens;
pub use guard::{AccessDecision, evaluate_access};
pub use redirect::{stash_redirect, take_redirect, validate_redirect};
pub use session::{Lifecycle, SessionConfig, SessionState, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use token::{decode_identity, token_expiry};
pub use types::{DecodedIdentity, SessionUser, TokenBundle, UserId, UserProfile};
