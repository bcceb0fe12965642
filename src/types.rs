use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

/// Vestis backend user identifier (`user_id` claim).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Tokens handed to the client at the end of an OAuth flow.
///
/// Immutable once extracted. Ownership moves into the session store on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

impl TokenBundle {
    /// Create a bundle holding only the required access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
            expires_in: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    #[must_use]
    pub fn with_expires_in(mut self, expires_in: impl Into<String>) -> Self {
        self.expires_in = Some(expires_in.into());
        self
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    #[must_use]
    pub fn expires_in(&self) -> Option<&str> {
        self.expires_in.as_deref()
    }
}

/// Identity read from the unverified payload of an access token.
///
/// A display hint only. It exists so the UI can show a name before the
/// authoritative profile request resolves, and must never gate an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedIdentity {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

/// Authoritative profile as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub credits: i64,
}

impl UserProfile {
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
            avatar_url: None,
            credits: 0,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_credits(mut self, credits: i64) -> Self {
        self.credits = credits;
        self
    }
}

/// The user attached to an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SessionUser {
    /// Decoded from the access token; replaced once the profile is fetched.
    Provisional(DecodedIdentity),
    /// Fetched from the backend.
    Profile(UserProfile),
    /// Authenticated, but the token carried no readable identity yet.
    Unresolved,
}

impl SessionUser {
    #[must_use]
    pub fn id(&self) -> Option<UserId> {
        match self {
            Self::Provisional(identity) => Some(identity.id),
            Self::Profile(profile) => Some(profile.id),
            Self::Unresolved => None,
        }
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Provisional(identity) => Some(&identity.email),
            Self::Profile(profile) => Some(&profile.email),
            Self::Unresolved => None,
        }
    }

    /// Name for display, falling back to the email local part.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Provisional(identity) => Some(&identity.name),
            Self::Profile(profile) => profile
                .name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .or_else(|| Some(email_local_part(&profile.email))),
            Self::Unresolved => None,
        }
    }

    /// Whether the authoritative profile has been loaded.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Profile(_))
    }
}

/// The part of an email address before `@`.
pub(crate) fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}
