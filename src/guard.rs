use crate::fragment::has_access_token;
use crate::redirect;
use crate::session::{SessionConfig, SessionState};

/// What a protected route should do with the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The URL carries OAuth tokens: run the callback orchestrator first.
    HandOff,
    /// Session not ready; render a placeholder, not a logged-out view.
    Wait,
    /// Render the route.
    Allow,
    /// Send the visitor to the login entry point.
    RedirectToLogin { to: String },
}

/// Decides access for a protected route.
///
/// `fragment` is the current URL fragment, if any. `current_path` is carried
/// to the login page as `?redirect=` when it is a safe destination, so the
/// login flow can return there.
#[must_use]
pub fn evaluate_access(
    state: &SessionState,
    fragment: Option<&str>,
    current_path: Option<&str>,
    config: &SessionConfig,
) -> AccessDecision {
    if fragment.is_some_and(has_access_token) {
        return AccessDecision::HandOff;
    }
    if !state.is_ready() {
        return AccessDecision::Wait;
    }
    if state.is_authenticated {
        return AccessDecision::Allow;
    }

    let return_to = current_path
        .and_then(|path| redirect::validate_redirect(path, config.allowed_redirect_prefixes()));
    let to = match return_to {
        Some(path) => format!(
            "{}?redirect={}",
            config.login_route(),
            urlencoding::encode(path)
        ),
        None => config.login_route().to_owned(),
    };
    AccessDecision::RedirectToLogin { to }
}
