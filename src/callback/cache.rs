use std::sync::Arc;

use tokio::sync::Mutex;

use super::traits::ProfileCache;
use crate::api::ApiClient;
use crate::error::Error;
use crate::session::SessionStore;
use crate::storage::KeyValueStore;
use crate::types::UserProfile;

/// Memoized profile and credits for the signed-in user.
///
/// Reads hit the backend once and are served from memory afterwards, until
/// [`invalidate`](ProfileCache::invalidate) drops them. A fetched profile is
/// also written into the session, replacing any provisional identity.
pub struct CachedAccount<D> {
    client: Arc<ApiClient>,
    session: Arc<SessionStore<D>>,
    profile: Mutex<Option<UserProfile>>,
    credits: Mutex<Option<i64>>,
}

impl<D: KeyValueStore> CachedAccount<D> {
    #[must_use]
    pub fn new(client: Arc<ApiClient>, session: Arc<SessionStore<D>>) -> Self {
        Self {
            client,
            session,
            profile: Mutex::new(None),
            credits: Mutex::new(None),
        }
    }

    /// The authoritative profile, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingToken`] when signed out, or the API error of
    /// the profile request.
    pub async fn profile(&self) -> Result<UserProfile, Error> {
        let mut cached = self.profile.lock().await;
        if let Some(profile) = cached.as_ref() {
            return Ok(profile.clone());
        }

        let token = self.token().await?;
        let profile = self.client.fetch_profile(&token).await?;
        self.session.set_profile(profile.clone()).await?;
        *cached = Some(profile.clone());
        Ok(profile)
    }

    /// The credit balance, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingToken`] when signed out, or the API error of
    /// the credits request.
    pub async fn credits(&self) -> Result<i64, Error> {
        let mut cached = self.credits.lock().await;
        if let Some(balance) = *cached {
            return Ok(balance);
        }

        let token = self.token().await?;
        let balance = self.client.fetch_credits(&token).await?;
        *cached = Some(balance);
        Ok(balance)
    }

    async fn token(&self) -> Result<String, Error> {
        self.session
            .access_token()
            .await?
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingToken)
    }
}

impl<D: KeyValueStore> ProfileCache for CachedAccount<D> {
    async fn invalidate(&self) {
        *self.profile.lock().await = None;
        *self.credits.lock().await = None;
        tracing::debug!("Account cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::ApiConfig;
    use crate::session::SessionConfig;
    use crate::storage::MemoryStore;
    use crate::types::{SessionUser, TokenBundle, UserId};

    async fn signed_in(server: &MockServer) -> CachedAccount<MemoryStore> {
        let session = Arc::new(SessionStore::new(MemoryStore::new(), SessionConfig::new()));
        session
            .login_with_oauth(TokenBundle::new("tok"), None)
            .await
            .unwrap();
        let client = ApiClient::new(ApiConfig::new(server.uri().parse().unwrap()));
        CachedAccount::new(Arc::new(client), session)
    }

    #[tokio::test]
    async fn profile_is_fetched_once_until_invalidated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7, "email": "a@b.com", "name": "Ada", "credits": 10
            })))
            .expect(2)
            .mount(&server)
            .await;

        let account = signed_in(&server).await;
        let first = account.profile().await.unwrap();
        let second = account.profile().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, UserId(7));

        account.invalidate().await;
        account.profile().await.unwrap();
    }

    #[tokio::test]
    async fn fetched_profile_replaces_unresolved_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7, "email": "a@b.com"
            })))
            .mount(&server)
            .await;

        let account = signed_in(&server).await;
        assert_eq!(account.session.state().user, Some(SessionUser::Unresolved));

        let profile = account.profile().await.unwrap();
        assert_eq!(account.session.state().user, Some(SessionUser::Profile(profile)));
    }

    #[tokio::test]
    async fn credits_are_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/credits/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balance": 55
            })))
            .expect(1)
            .mount(&server)
            .await;

        let account = signed_in(&server).await;
        assert_eq!(account.credits().await.unwrap(), 55);
        assert_eq!(account.credits().await.unwrap(), 55);
    }

    #[tokio::test]
    async fn signed_out_reads_fail_without_request() {
        let server = MockServer::start().await;
        let session = Arc::new(SessionStore::new(MemoryStore::new(), SessionConfig::new()));
        let client = ApiClient::new(ApiConfig::new(server.uri().parse().unwrap()));
        let account = CachedAccount::new(Arc::new(client), session);

        assert!(matches!(account.profile().await, Err(Error::MissingToken)));
        assert!(matches!(account.credits().await, Err(Error::MissingToken)));
    }
}
