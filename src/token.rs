use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::error::Error;
use crate::types::{DecodedIdentity, UserId, email_local_part};

/// Decodes the identity embedded in an access token's payload.
///
/// The signature is NOT verified. The result is a display hint for the
/// window before the authoritative profile request resolves, and must not
/// be used to authorize anything.
///
/// # Errors
///
/// Returns `Error::Decode` if the token is not three dot-separated segments,
/// the payload is not base64url JSON, or `user_id`/`email` are missing.
pub fn decode_identity(access_token: &str) -> Result<DecodedIdentity, Error> {
    let claims = decode_untrusted_payload(access_token)?;

    let id = claims
        .get("user_id")
        .and_then(claim_as_i64)
        .map(UserId)
        .ok_or_else(|| Error::Decode("missing claim: user_id".into()))?;

    let email = claims
        .get("email")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Decode("missing claim: email".into()))?
        .to_owned();

    let name = claims
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|n| !n.trim().is_empty())
        .map_or_else(|| email_local_part(&email).to_owned(), str::to_owned);

    Ok(DecodedIdentity { id, email, name })
}

/// Reads the `exp` claim of an access token without verifying it.
///
/// Returns `None` if the token cannot be decoded or carries no `exp`.
#[must_use]
pub fn token_expiry(access_token: &str) -> Option<OffsetDateTime> {
    let claims = decode_untrusted_payload(access_token).ok()?;
    let exp = claims.get("exp").and_then(claim_as_i64)?;
    OffsetDateTime::from_unix_timestamp(exp).ok()
}

/// Whether the token's `exp` claim lies in the past. Tokens without a
/// readable `exp` are not considered expired.
#[must_use]
pub fn is_expired(access_token: &str, now: OffsetDateTime) -> bool {
    token_expiry(access_token).is_some_and(|exp| exp <= now)
}

/// Decodes the middle segment of a three-part token into JSON.
fn decode_untrusted_payload(token: &str) -> Result<JsonValue, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Decode(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let payload_b64 = parts[1].trim_end_matches('=');
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| Error::Decode(format!("invalid base64url payload: {e}")))?;

    let claims: JsonValue = serde_json::from_slice(&payload)
        .map_err(|e| Error::Decode(format!("invalid payload JSON: {e}")))?;
    if !claims.is_object() {
        return Err(Error::Decode("payload is not a JSON object".into()));
    }
    Ok(claims)
}

/// Integer claims arrive as numbers, but some issuers emit numeric strings.
fn claim_as_i64(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
