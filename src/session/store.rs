use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};

use super::config::SessionConfig;
use super::state::{SessionState, Snapshot};
use crate::error::Error;
use crate::storage::KeyValueStore;
use crate::token;
use crate::types::{DecodedIdentity, SessionUser, TokenBundle, UserProfile};

/// Authentication state container with write-through persistence.
///
/// One instance per application, shared as `Arc<SessionStore<_>>` and handed
/// to consumers explicitly. All mutations are serialized; observers read
/// snapshots or subscribe to changes.
pub struct SessionStore<D> {
    storage: D,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    write_lock: Mutex<()>,
}

impl<D: KeyValueStore> SessionStore<D> {
    /// Create an uninitialized store over durable `storage`.
    #[must_use]
    pub fn new(storage: D, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            storage,
            config,
            state,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The durable storage backing this store.
    #[must_use]
    pub fn storage(&self) -> &D {
        &self.storage
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Waits until the persisted snapshot has been restored.
    pub async fn wait_until_hydrated(&self) -> SessionState {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| s.has_hydrated).await {
            Ok(state) => state.clone(),
            // Unreachable while `self` owns the sender.
            Err(_) => self.state(),
        }
    }

    /// Restores the last persisted snapshot.
    ///
    /// `has_hydrated` flips to true exactly once. A missing, unreadable or
    /// corrupt snapshot hydrates to a logged-out state.
    pub async fn hydrate(&self) {
        let _guard = self.write_lock.lock().await;
        if self.state.borrow().has_hydrated {
            return;
        }

        let restored = match self.storage.get(&self.config.snapshot_key).await {
            Ok(Some(raw)) => match Snapshot::parse(&raw) {
                Ok(persisted) => Some(persisted),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable session snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Session snapshot read failed");
                None
            }
        };

        self.state.send_modify(|state| {
            if let Some(persisted) = restored {
                // A login that completed before hydration wins over the snapshot.
                if persisted.is_authenticated && !state.is_authenticated {
                    if let Some(user) = persisted.user {
                        state.authenticate(user);
                    }
                }
            }
            state.has_hydrated = true;
        });
        tracing::debug!(authenticated = self.state.borrow().is_authenticated, "Session hydrated");
    }

    /// Checks durable storage for a usable access token.
    ///
    /// Hydrates first if needed. Only the first call has any effect; later
    /// calls return the current state.
    pub async fn initialize(&self) -> SessionState {
        self.hydrate().await;

        let _guard = self.write_lock.lock().await;
        if self.state.borrow().is_initialized {
            return self.state();
        }

        let access_token = match self.storage.get(&self.config.access_token_key).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Access token read failed during initialization");
                None
            }
        };
        let access_token = access_token.filter(|t| {
            let expired = token::is_expired(t, OffsetDateTime::now_utc());
            if expired {
                tracing::info!("Persisted access token has expired");
            }
            !expired
        });

        let mut next = self.state();
        let was_authenticated = next.is_authenticated;
        match &access_token {
            Some(t) => {
                let user = next
                    .user
                    .clone()
                    .or_else(|| token::decode_identity(t).ok().map(SessionUser::Provisional))
                    .unwrap_or(SessionUser::Unresolved);
                next.authenticate(user);
            }
            None => next.clear_auth(),
        }
        next.is_initialized = true;

        if next.is_authenticated != was_authenticated {
            if let Err(e) = self.write_snapshot(&next).await {
                tracing::warn!(error = %e, "Session snapshot update failed during initialization");
            }
        }
        self.state.send_replace(next);
        self.state()
    }

    /// Records a password login with the authoritative profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if storage rejects the write. The
    /// previous tokens are put back and the in-memory state is left unchanged.
    pub async fn login_with_password(
        &self,
        profile: UserProfile,
        tokens: TokenBundle,
    ) -> Result<(), Error> {
        self.login(tokens, SessionUser::Profile(profile)).await
    }

    /// Records an OAuth hand-off.
    ///
    /// `identity` is the advisory identity decoded from the token, if any;
    /// without it the session user stays unresolved until the profile is
    /// fetched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if storage rejects the write. The
    /// previous tokens are put back and the in-memory state is left unchanged.
    pub async fn login_with_oauth(
        &self,
        tokens: TokenBundle,
        identity: Option<DecodedIdentity>,
    ) -> Result<(), Error> {
        let user = identity.map_or(SessionUser::Unresolved, SessionUser::Provisional);
        self.login(tokens, user).await
    }

    async fn login(&self, tokens: TokenBundle, user: SessionUser) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.state();
        next.authenticate(user);
        next.is_initialized = true;

        let previous = self.read_tokens().await?;
        let written = match self.write_tokens(&tokens).await {
            Ok(()) => self.write_snapshot(&next).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if !self.restore_tokens(&previous).await {
                // Stored tokens no longer match the active session.
                tracing::error!("Token rollback failed, clearing session");
                self.state.send_modify(SessionState::clear_auth);
            }
            return Err(e);
        }

        let user_id = next.user.as_ref().and_then(SessionUser::id);
        self.state.send_replace(next);
        tracing::info!(user_id = ?user_id, "Session established");
        Ok(())
    }

    /// Replaces the provisional user with the authoritative profile.
    ///
    /// Ignored when no session is active, e.g. a profile response that lands
    /// after logout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the snapshot cannot be written.
    pub async fn set_profile(&self, profile: UserProfile) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        if !self.state.borrow().is_authenticated {
            tracing::debug!("Ignoring profile for inactive session");
            return Ok(());
        }

        let mut next = self.state();
        next.user = Some(SessionUser::Profile(profile));
        self.write_snapshot(&next).await?;
        self.state.send_replace(next);
        Ok(())
    }

    /// Clears tokens and user from memory and storage.
    ///
    /// Cached server-derived data (profile, credits) is not touched here;
    /// callers clear it alongside.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if a stored value could not be removed.
    /// The in-memory state is cleared regardless.
    pub async fn logout(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        self.state.send_modify(SessionState::clear_auth);

        let mut first_error = None;
        for key in [
            &self.config.access_token_key,
            &self.config.refresh_token_key,
            &self.config.snapshot_key,
        ] {
            if let Err(e) = self.storage.remove(key).await {
                tracing::error!(error = %e, key = %key, "Failed to clear session storage");
                first_error.get_or_insert(Error::persistence(e));
            }
        }

        tracing::info!("Session cleared");
        first_error.map_or(Ok(()), Err)
    }

    /// The persisted access token, for authenticated API calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if storage cannot be read.
    pub async fn access_token(&self) -> Result<Option<String>, Error> {
        self.storage
            .get(&self.config.access_token_key)
            .await
            .map_err(Error::persistence)
    }

    async fn write_tokens(&self, tokens: &TokenBundle) -> Result<(), Error> {
        self.storage
            .set(&self.config.access_token_key, tokens.access_token())
            .await
            .map_err(Error::persistence)?;

        let refresh = match tokens.refresh_token() {
            Some(refresh) => self.storage.set(&self.config.refresh_token_key, refresh).await,
            None => self.storage.remove(&self.config.refresh_token_key).await,
        };
        refresh.map_err(Error::persistence)
    }

    async fn write_snapshot(&self, state: &SessionState) -> Result<(), Error> {
        let raw = serde_json::to_string(&Snapshot::of(state)).map_err(Error::persistence)?;
        self.storage
            .set(&self.config.snapshot_key, &raw)
            .await
            .map_err(Error::persistence)
    }

    async fn read_tokens(&self) -> Result<[Option<String>; 2], Error> {
        let mut values = [None, None];
        for (slot, key) in values
            .iter_mut()
            .zip([&self.config.access_token_key, &self.config.refresh_token_key])
        {
            *slot = self.storage.get(key).await.map_err(Error::persistence)?;
        }
        Ok(values)
    }

    /// Rolls a partially written login back to `previous` token values.
    ///
    /// Keys already holding their previous value are left alone. Returns
    /// false if any key could not be restored.
    async fn restore_tokens(&self, previous: &[Option<String>; 2]) -> bool {
        let mut restored = true;
        let keys = [&self.config.access_token_key, &self.config.refresh_token_key];
        for (key, value) in keys.into_iter().zip(previous) {
            match self.storage.get(key).await {
                Ok(current) if current.as_deref() == value.as_deref() => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Token read failed during rollback");
                }
            }
            let result = match value {
                Some(value) => self.storage.set(key, value).await,
                None => self.storage.remove(key).await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, key = %key, "Token rollback failed");
                restored = false;
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::fixtures::ProbeStore;
    use crate::token::tests::token_with_payload;
    use crate::types::UserId;

    fn store() -> SessionStore<ProbeStore> {
        SessionStore::new(ProbeStore::new(), SessionConfig::new())
    }

    fn identity() -> DecodedIdentity {
        DecodedIdentity {
            id: UserId(7),
            email: "a@b.com".into(),
            name: "a".into(),
        }
    }

    fn assert_invariant(state: &SessionState) {
        assert!(!state.is_authenticated || state.user.is_some());
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let store = store();
        let state = store.state();
        assert!(!state.has_hydrated);
        assert!(!state.is_initialized);
        assert!(!state.is_authenticated);
    }

    #[tokio::test]
    async fn hydrate_restores_snapshot_once() {
        let store = store();
        let mut persisted = SessionState::default();
        persisted.authenticate(SessionUser::Provisional(identity()));
        store
            .storage()
            .seed("auth-storage", &serde_json::to_string(&Snapshot::of(&persisted)).unwrap())
            .await;

        store.hydrate().await;
        let state = store.state();
        assert!(state.has_hydrated);
        assert!(state.is_authenticated);
        assert_eq!(state.user, persisted.user);

        let reads = store.storage().gets.load(std::sync::atomic::Ordering::SeqCst);
        store.hydrate().await;
        assert_eq!(
            store.storage().gets.load(std::sync::atomic::Ordering::SeqCst),
            reads
        );
    }

    #[tokio::test]
    async fn corrupt_snapshot_hydrates_logged_out() {
        let store = store();
        store.storage().seed("auth-storage", "{broken").await;

        store.hydrate().await;
        let state = store.state();
        assert!(state.has_hydrated);
        assert!(!state.is_authenticated);
    }

    #[tokio::test]
    async fn wait_until_hydrated_resolves_after_hydration() {
        let store = Arc::new(store());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_until_hydrated().await })
        };

        store.hydrate().await;
        let state = waiter.await.unwrap();
        assert!(state.has_hydrated);
    }

    #[tokio::test]
    async fn initialize_without_token_is_logged_out() {
        let store = store();
        let state = store.initialize().await;
        assert!(state.has_hydrated);
        assert!(state.is_initialized);
        assert!(!state.is_authenticated);
        assert!(state.user.is_none());
    }

    #[tokio::test]
    async fn initialize_decodes_user_from_token() {
        let store = store();
        let token = token_with_payload(r#"{"user_id":7,"email":"a@b.com"}"#);
        store.storage().seed("access_token", &token).await;

        let state = store.initialize().await;
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(SessionUser::Provisional(identity())));
    }

    #[tokio::test]
    async fn initialize_keeps_opaque_token_unresolved() {
        let store = store();
        store.storage().seed("access_token", "opaque").await;

        let state = store.initialize().await;
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(SessionUser::Unresolved));
        assert_invariant(&state);
    }

    #[tokio::test]
    async fn initialize_drops_expired_token() {
        let store = store();
        let token = token_with_payload(r#"{"user_id":7,"email":"a@b.com","exp":1000}"#);
        store.storage().seed("access_token", &token).await;

        let state = store.initialize().await;
        assert!(state.is_initialized);
        assert!(!state.is_authenticated);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = store();
        let first = store.initialize().await;
        assert!(!first.is_authenticated);

        store.storage().seed("access_token", "late-token").await;
        let second = store.initialize().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn oauth_login_writes_through() {
        let store = store();
        store
            .login_with_oauth(
                TokenBundle::new("a.b.c").with_refresh_token("r1"),
                Some(identity()),
            )
            .await
            .unwrap();

        let state = store.state();
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(SessionUser::Provisional(identity())));
        assert_eq!(store.storage().peek("access_token").await.as_deref(), Some("a.b.c"));
        assert_eq!(store.storage().peek("refresh_token").await.as_deref(), Some("r1"));
        assert!(store.storage().contains("auth-storage"));
        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("a.b.c"));
    }

    #[tokio::test]
    async fn oauth_login_without_identity_is_unresolved() {
        let store = store();
        store
            .login_with_oauth(TokenBundle::new("opaque"), None)
            .await
            .unwrap();

        let state = store.state();
        assert_eq!(state.user, Some(SessionUser::Unresolved));
        assert_invariant(&state);
    }

    #[tokio::test]
    async fn password_login_stores_profile() {
        let store = store();
        let profile = UserProfile::new(UserId(3), "p@vestis.ai").with_credits(40);
        store
            .login_with_password(profile.clone(), TokenBundle::new("t"))
            .await
            .unwrap();

        assert_eq!(store.state().user, Some(SessionUser::Profile(profile)));
        assert!(!store.storage().contains("refresh_token"));
    }

    #[tokio::test]
    async fn failed_write_leaves_state_unchanged() {
        let store = store();
        store.storage().fail_writes(true);

        let result = store
            .login_with_oauth(TokenBundle::new("a.b.c"), Some(identity()))
            .await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        let state = store.state();
        assert!(!state.is_authenticated);
        assert!(state.user.is_none());
        assert!(!store.storage().contains("access_token"));
    }

    #[tokio::test]
    async fn failed_relogin_keeps_previous_session() {
        let store = store();
        store
            .login_with_oauth(
                TokenBundle::new("old.tok.en").with_refresh_token("r0"),
                Some(identity()),
            )
            .await
            .unwrap();
        store.storage().fail_writes(true);

        let result = store
            .login_with_oauth(TokenBundle::new("new.tok.en"), None)
            .await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        let state = store.state();
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(SessionUser::Provisional(identity())));
        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("old.tok.en"));
        assert_eq!(store.storage().peek("refresh_token").await.as_deref(), Some("r0"));
    }

    #[tokio::test]
    async fn failed_snapshot_write_restores_previous_tokens() {
        let storage = Arc::new(ProbeStore::new());
        let first = SessionStore::new(Arc::clone(&storage), SessionConfig::new());
        first
            .login_with_oauth(
                TokenBundle::new("old.tok.en").with_refresh_token("r0"),
                Some(identity()),
            )
            .await
            .unwrap();
        storage.fail_writes_to("auth-storage");

        let result = first
            .login_with_oauth(TokenBundle::new("new.tok.en"), None)
            .await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(storage.peek("access_token").await.as_deref(), Some("old.tok.en"));
        assert_eq!(storage.peek("refresh_token").await.as_deref(), Some("r0"));
        assert!(first.state().is_authenticated);

        let restarted = SessionStore::new(storage, SessionConfig::new());
        let state = restarted.initialize().await;
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(SessionUser::Provisional(identity())));
    }

    #[tokio::test]
    async fn set_profile_replaces_provisional_user() {
        let store = store();
        store
            .login_with_oauth(TokenBundle::new("a.b.c"), Some(identity()))
            .await
            .unwrap();

        let profile = UserProfile::new(UserId(7), "a@b.com").with_name("Ada");
        store.set_profile(profile.clone()).await.unwrap();
        assert_eq!(store.state().user, Some(SessionUser::Profile(profile)));
    }

    #[tokio::test]
    async fn set_profile_after_logout_is_ignored() {
        let store = store();
        store
            .set_profile(UserProfile::new(UserId(7), "a@b.com"))
            .await
            .unwrap();
        assert!(store.state().user.is_none());
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let store = store();
        store
            .login_with_oauth(TokenBundle::new("a.b.c").with_refresh_token("r1"), Some(identity()))
            .await
            .unwrap();

        store.logout().await.unwrap();

        let state = store.state();
        assert!(!state.is_authenticated);
        assert!(state.user.is_none());
        assert!(!store.storage().contains("access_token"));
        assert!(!store.storage().contains("refresh_token"));
        assert!(!store.storage().contains("auth-storage"));
    }

    #[tokio::test]
    async fn login_survives_rehydration() {
        let storage = Arc::new(crate::storage::MemoryStore::new());
        let first = SessionStore::new(Arc::clone(&storage), SessionConfig::new());
        first
            .login_with_oauth(TokenBundle::new("opaque"), Some(identity()))
            .await
            .unwrap();

        let second = SessionStore::new(storage, SessionConfig::new());
        let state = second.initialize().await;
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(SessionUser::Provisional(identity())));
    }
}
