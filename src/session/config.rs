use std::time::Duration;

use crate::error::Error;

/// Storage keys, routes and timing shared by the session store, the
/// callback orchestrator and the route gate.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) snapshot_key: String,
    pub(crate) access_token_key: String,
    pub(crate) refresh_token_key: String,
    pub(crate) redirect_key: String,
    pub(crate) default_landing: String,
    pub(crate) login_route: String,
    pub(crate) allowed_redirect_prefixes: Vec<String>,
    pub(crate) settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snapshot_key: "auth-storage".into(),
            access_token_key: "access_token".into(),
            refresh_token_key: "refresh_token".into(),
            redirect_key: "oauth_redirect".into(),
            default_landing: "/dashboard".into(),
            login_route: "/login".into(),
            allowed_redirect_prefixes: [
                "/dashboard",
                "/shop",
                "/onboarding",
                "/settings",
                "/billing",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            settle_delay: Duration::from_millis(100),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `VESTIS_DEFAULT_LANDING`: route after a hand-off with no usable redirect
    /// - `VESTIS_LOGIN_ROUTE`: login entry point for unauthenticated visitors
    /// - `VESTIS_REDIRECT_PREFIXES`: comma-separated redirect allow-list
    /// - `VESTIS_SETTLE_DELAY_MS`: pause before navigating after a hand-off
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is present but malformed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(route) = lookup("VESTIS_DEFAULT_LANDING") {
            config = config.with_default_landing(require_path("VESTIS_DEFAULT_LANDING", route)?);
        }
        if let Some(route) = lookup("VESTIS_LOGIN_ROUTE") {
            config = config.with_login_route(require_path("VESTIS_LOGIN_ROUTE", route)?);
        }
        if let Some(prefixes) = lookup("VESTIS_REDIRECT_PREFIXES") {
            let prefixes = prefixes
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| require_path("VESTIS_REDIRECT_PREFIXES", p.to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            config = config.with_allowed_redirect_prefixes(prefixes);
        }
        if let Some(ms) = lookup("VESTIS_SETTLE_DELAY_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("VESTIS_SETTLE_DELAY_MS: {e}")))?;
            config = config.with_settle_delay(Duration::from_millis(ms));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_snapshot_key(mut self, key: impl Into<String>) -> Self {
        self.snapshot_key = key.into();
        self
    }

    #[must_use]
    pub fn with_access_token_key(mut self, key: impl Into<String>) -> Self {
        self.access_token_key = key.into();
        self
    }

    #[must_use]
    pub fn with_refresh_token_key(mut self, key: impl Into<String>) -> Self {
        self.refresh_token_key = key.into();
        self
    }

    #[must_use]
    pub fn with_redirect_key(mut self, key: impl Into<String>) -> Self {
        self.redirect_key = key.into();
        self
    }

    #[must_use]
    pub fn with_default_landing(mut self, route: impl Into<String>) -> Self {
        self.default_landing = route.into();
        self
    }

    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    #[must_use]
    pub fn with_allowed_redirect_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_redirect_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn snapshot_key(&self) -> &str {
        &self.snapshot_key
    }

    #[must_use]
    pub fn access_token_key(&self) -> &str {
        &self.access_token_key
    }

    #[must_use]
    pub fn refresh_token_key(&self) -> &str {
        &self.refresh_token_key
    }

    /// Tab-scoped storage key of the pending redirect.
    #[must_use]
    pub fn redirect_key(&self) -> &str {
        &self.redirect_key
    }

    #[must_use]
    pub fn default_landing(&self) -> &str {
        &self.default_landing
    }

    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    #[must_use]
    pub fn allowed_redirect_prefixes(&self) -> &[String] {
        &self.allowed_redirect_prefixes
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

fn require_path(var: &str, value: String) -> Result<String, Error> {
    if value.starts_with('/') && !value.starts_with("//") {
        Ok(value)
    } else {
        Err(Error::Config(format!("{var}: expected an absolute path, got '{value}'")))
    }
}
