//! Persisted authentication state.
//!
//! [`SessionStore`] is an explicit container rather than a global: build one
//! at startup, share it as an `Arc`, and pass it to whatever needs it.
//!
//! ```rust,ignore
//! use vestis_auth::session::{SessionConfig, SessionStore};
//! use vestis_auth::storage::FileStore;
//!
//! let config = SessionConfig::from_env()?;
//! let store = Arc::new(SessionStore::new(FileStore::new("session.json"), config));
//! store.initialize().await;
//! if store.state().is_authenticated { /* ... */ }
//! ```

mod config;
mod state;
mod store;

pub use config::SessionConfig;
pub use state::{Lifecycle, SessionState};
pub use store::SessionStore;
