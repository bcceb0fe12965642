use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::redirect;
use crate::storage::KeyValueStore;
use crate::types::{TokenBundle, UserProfile};

/// Vestis backend API configuration.
///
/// The base URL is the only required field; endpoint paths default to the
/// backend's routes and can be overridden by chaining.
///
/// ```rust,ignore
/// use vestis_auth::api::ApiConfig;
///
/// let config = ApiConfig::new("https://api.vestis.ai".parse()?)
///     .with_profile_path("/v2/auth/me");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
    pub(crate) oauth_path: String,
    pub(crate) login_path: String,
    pub(crate) profile_path: String,
    pub(crate) credits_path: String,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            oauth_path: "/auth".into(),
            login_path: "/auth/login".into(),
            profile_path: "/auth/me".into(),
            credits_path: "/credits/balance".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `VESTIS_API_URL`: backend base URL
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `VESTIS_API_URL` is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let raw = std::env::var("VESTIS_API_URL")
            .map_err(|_| Error::Config("VESTIS_API_URL is required".into()))?;
        let base_url: Url = raw
            .parse()
            .map_err(|e| Error::Config(format!("VESTIS_API_URL: {e}")))?;
        Ok(Self::new(base_url))
    }

    /// Path under which provider-specific OAuth entry points live.
    #[must_use]
    pub fn with_oauth_path(mut self, path: impl Into<String>) -> Self {
        self.oauth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.profile_path = path.into();
        self
    }

    #[must_use]
    pub fn with_credits_path(mut self, path: impl Into<String>) -> Self {
        self.credits_path = path.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Tokens and profile returned by a password login.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PasswordLogin {
    pub tokens: TokenBundle,
    pub profile: UserProfile,
}

#[derive(Serialize)]
struct PasswordLoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    user: UserProfile,
}

#[derive(Deserialize)]
struct CreditBalance {
    balance: i64,
}

/// HTTP client for the Vestis backend.
pub struct ApiClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Backend URL that starts the OAuth flow for `provider` (e.g. `google`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the provider name is empty or the base
    /// URL cannot carry a path.
    pub fn oauth_start_url(&self, provider: &str) -> Result<Url, Error> {
        let valid = !provider.is_empty()
            && provider
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Config(format!("invalid OAuth provider '{provider}'")));
        }
        self.endpoint(&format!("{}/{provider}", self.config.oauth_path))
    }

    /// Stashes the return destination, then yields the provider entry URL.
    ///
    /// The browser is expected to leave for the returned URL right away; the
    /// stashed path is consumed by the callback orchestrator on return. With
    /// no `return_to`, a redirect left by an earlier attempt is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid provider, or
    /// [`Error::Persistence`] if the redirect cannot be stored or cleared.
    pub async fn begin_oauth<S: KeyValueStore>(
        &self,
        provider: &str,
        return_to: Option<&str>,
        ephemeral: &S,
        redirect_key: &str,
    ) -> Result<Url, Error> {
        let url = self.oauth_start_url(provider)?;
        match return_to {
            Some(path) => redirect::stash_redirect(ephemeral, redirect_key, path).await?,
            None => ephemeral
                .remove(redirect_key)
                .await
                .map_err(Error::persistence)?,
        }
        tracing::debug!(provider = %provider, "Starting OAuth flow");
        Ok(url)
    }

    /// Exchange email and password for tokens and the user profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Api`] if the backend rejects the credentials.
    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<PasswordLogin, Error> {
        let response = self
            .http
            .post(self.endpoint(&self.config.login_path)?)
            .json(&PasswordLoginRequest { email, password })
            .send()
            .await?;

        let response = Self::ensure_success(response, "password login").await?;
        let body: LoginResponse = response.json().await?;

        let mut tokens = TokenBundle::new(body.access_token);
        if let Some(refresh) = body.refresh_token {
            tokens = tokens.with_refresh_token(refresh);
        }
        if let Some(kind) = body.token_type {
            tokens = tokens.with_token_type(kind);
        }
        if let Some(expires_in) = body.expires_in {
            tokens = tokens.with_expires_in(expires_in.to_string());
        }

        Ok(PasswordLogin {
            tokens,
            profile: body.user,
        })
    }

    /// Fetch the authoritative profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Api`] if the backend returns an error.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, Error> {
        let response = self
            .http
            .get(self.endpoint(&self.config.profile_path)?)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "profile request").await?;
        response.json::<UserProfile>().await.map_err(Into::into)
    }

    /// Fetch the current credit balance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Api`] if the backend returns an error.
    pub async fn fetch_credits(&self, access_token: &str) -> Result<i64, Error> {
        let response = self
            .http
            .get(self.endpoint(&self.config.credits_path)?)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "credits request").await?;
        let balance: CreditBalance = response.json().await?;
        Ok(balance.balance)
    }

    /// Appends `path` to the base URL, keeping any base path prefix.
    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
