use crate::types::TokenBundle;

/// Extracts the OAuth token bundle from a URL fragment.
///
/// The fragment is read as `application/x-www-form-urlencoded` pairs, with or
/// without its leading `#`. Returns `None` when no non-empty `access_token`
/// is present. When a key repeats, the first occurrence wins.
#[must_use]
pub fn extract_tokens(fragment: &str) -> Option<TokenBundle> {
    let raw = fragment
        .strip_prefix('#')
        .unwrap_or(fragment)
        .trim_start_matches('?');
    if raw.is_empty() {
        return None;
    }

    let mut access_token = None;
    let mut refresh_token = None;
    let mut token_type = None;
    let mut expires_in = None;

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let slot = match &*key {
            "access_token" => &mut access_token,
            "refresh_token" => &mut refresh_token,
            "token_type" => &mut token_type,
            "expires_in" => &mut expires_in,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let mut bundle = TokenBundle::new(access_token.filter(|t| !t.is_empty())?);
    if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
        bundle = bundle.with_refresh_token(token);
    }
    if let Some(kind) = token_type.filter(|t| !t.is_empty()) {
        bundle = bundle.with_token_type(kind);
    }
    if let Some(expiry) = expires_in.filter(|t| !t.is_empty()) {
        bundle = bundle.with_expires_in(expiry);
    }
    Some(bundle)
}

/// Whether the fragment carries an access token, without building a bundle.
#[must_use]
pub fn has_access_token(fragment: &str) -> bool {
    extract_tokens(fragment).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_fields() {
        let bundle = extract_tokens(
            "#access_token=a.b.c&refresh_token=r1&token_type=bearer&expires_in=3600",
        )
        .unwrap();

        assert_eq!(bundle.access_token(), "a.b.c");
        assert_eq!(bundle.refresh_token(), Some("r1"));
        assert_eq!(bundle.token_type(), Some("bearer"));
        assert_eq!(bundle.expires_in(), Some("3600"));
    }

    #[test]
    fn leading_hash_is_optional() {
        let with = extract_tokens("#access_token=tok").unwrap();
        let without = extract_tokens("access_token=tok").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let bundle = extract_tokens("access_token=ab%2Bc%3D&refresh_token=r%201").unwrap();
        assert_eq!(bundle.access_token(), "ab+c=");
        assert_eq!(bundle.refresh_token(), Some("r 1"));
    }

    #[test]
    fn missing_access_token_is_absent() {
        assert!(extract_tokens("").is_none());
        assert!(extract_tokens("#").is_none());
        assert!(extract_tokens("#refresh_token=r1&token_type=bearer").is_none());
        assert!(extract_tokens("#access_token=").is_none());
        assert!(extract_tokens("#section-2").is_none());
    }

    #[test]
    fn optional_fields_default_to_none() {
        let bundle = extract_tokens("#access_token=tok&utm_source=mail").unwrap();
        assert_eq!(bundle.refresh_token(), None);
        assert_eq!(bundle.token_type(), None);
        assert_eq!(bundle.expires_in(), None);
    }

    #[test]
    fn first_occurrence_wins() {
        let bundle = extract_tokens("access_token=first&access_token=second").unwrap();
        assert_eq!(bundle.access_token(), "first");
    }

    #[test]
    fn has_access_token_matches_extraction() {
        assert!(has_access_token("#access_token=x"));
        assert!(!has_access_token("#error=denied"));
    }
}
