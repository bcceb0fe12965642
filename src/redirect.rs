use crate::error::Error;
use crate::storage::KeyValueStore;

/// Stores the destination to return to after the OAuth round trip.
///
/// Written to tab-scoped storage right before the browser leaves for the
/// provider.
///
/// # Errors
///
/// Returns `Error::Persistence` if the storage write fails.
pub async fn stash_redirect<S: KeyValueStore>(
    store: &S,
    key: &str,
    path: &str,
) -> Result<(), Error> {
    store.set(key, path).await.map_err(Error::persistence)
}

/// Reads the pending redirect and removes it in the same step.
///
/// The value is removed whether or not the caller ends up using it, so a
/// stale destination never leaks into a later login. Storage failures are
/// logged and treated as "no redirect".
pub async fn take_redirect<S: KeyValueStore>(store: &S, key: &str) -> Option<String> {
    let value = match store.get(key).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Pending redirect read failed");
            None
        }
    };
    if let Err(e) = store.remove(key).await {
        tracing::warn!(error = %e, "Pending redirect removal failed");
    }
    value
}

/// Returns `path` if it is a safe in-app destination.
///
/// A safe path starts with a single `/`, carries no scheme separator,
/// backslash or dot-segment, and sits under one of `allowed_prefixes` on a
/// segment boundary (`/shop` admits `/shop` and `/shop/abc`, not `/shopping`).
#[must_use]
pub fn validate_redirect<'a, P: AsRef<str>>(
    path: &'a str,
    allowed_prefixes: &[P],
) -> Option<&'a str> {
    let safe_shape = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains("://")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
        && !has_dot_segment(path);
    if !safe_shape {
        tracing::debug!(path = %path, "Rejected redirect: unsafe shape");
        return None;
    }

    let allowed = allowed_prefixes
        .iter()
        .map(AsRef::as_ref)
        .any(|prefix| matches_prefix(path, prefix));
    if !allowed {
        tracing::debug!(path = %path, "Rejected redirect: not in allow-list");
        return None;
    }
    Some(path)
}

/// `.` and `..` segments (plain or percent-encoded) would let the router
/// resolve an allow-listed prefix to somewhere else.
fn has_dot_segment(path: &str) -> bool {
    let route = path.split(['?', '#']).next().unwrap_or_default();
    route.split('/').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        // A bare "/" entry admits only the root itself.
        return path == "/" || path.starts_with("/?") || path.starts_with("/#");
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}
