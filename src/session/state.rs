use serde::{Deserialize, Serialize};

use crate::types::SessionUser;

/// Where a session store is in its startup lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Persisted snapshot not restored yet.
    Uninitialized,
    /// Snapshot restored, token check still pending.
    Hydrating,
    /// Values reflect real persisted state.
    Ready,
}

/// Observable authentication state.
///
/// Until `has_hydrated` is true the other fields are defaults, not facts:
/// consumers must not render a "logged out" view on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user: Option<SessionUser>,
    pub is_initialized: bool,
    pub has_hydrated: bool,
}

impl SessionState {
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        match (self.has_hydrated, self.is_initialized) {
            (false, _) => Lifecycle::Uninitialized,
            (true, false) => Lifecycle::Hydrating,
            (true, true) => Lifecycle::Ready,
        }
    }

    /// Whether values can be trusted for rendering decisions.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lifecycle() == Lifecycle::Ready
    }

    pub(crate) fn authenticate(&mut self, user: SessionUser) {
        self.is_authenticated = true;
        self.user = Some(user);
    }

    pub(crate) fn clear_auth(&mut self) {
        self.is_authenticated = false;
        self.user = None;
    }
}

/// The slice of `SessionState` written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PersistedSession {
    pub(crate) is_authenticated: bool,
    #[serde(default)]
    pub(crate) user: Option<SessionUser>,
}

/// Versioned envelope around the persisted slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub(crate) state: PersistedSession,
    pub(crate) version: u32,
}

pub(crate) const SNAPSHOT_VERSION: u32 = 1;

impl Snapshot {
    pub(crate) fn of(state: &SessionState) -> Self {
        Self {
            state: PersistedSession {
                is_authenticated: state.is_authenticated,
                user: state.user.clone(),
            },
            version: SNAPSHOT_VERSION,
        }
    }

    /// Parses a stored snapshot, discarding unknown versions.
    pub(crate) fn parse(raw: &str) -> Result<PersistedSession, String> {
        let snapshot: Snapshot = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(format!("unsupported snapshot version {}", snapshot.version));
        }
        Ok(snapshot.state)
    }
}
