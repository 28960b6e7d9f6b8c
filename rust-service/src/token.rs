//! Opaque token codec for verify/unsubscribe links.
//!
//! Encodes a recipient identity plus an issued-at timestamp into a URL-safe
//! string: `base64url(email|timestampMillis)` without padding. The token is
//! an opaque identifier, not a credential; there is no signature and no
//! expiry check.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;

/// Token that does not decode into a valid identity.
#[derive(Debug, Error)]
#[error("malformed token")]
pub struct MalformedToken;

/// Encode a recipient email and issue timestamp into an opaque token.
///
/// The result contains only URL-safe characters and can be embedded in a
/// query parameter without percent-encoding.
pub fn encode(email: &str, timestamp_millis: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", email, timestamp_millis))
}

/// Encode a token issued at the current time.
pub fn issue(email: &str) -> String {
    encode(email, chrono::Utc::now().timestamp_millis())
}

/// Decode a token back into `(email, timestampMillis)`.
///
/// Fails unless the payload splits into exactly two parts, the email
/// segment contains an `@`, and the timestamp parses as an integer.
pub fn decode(token: &str) -> Result<(String, i64), MalformedToken> {
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| MalformedToken)?;
    let decoded = String::from_utf8(bytes).map_err(|_| MalformedToken)?;

    let mut parts = decoded.splitn(2, '|');
    let email = parts.next().ok_or(MalformedToken)?;
    let timestamp = parts.next().ok_or(MalformedToken)?;

    if email.is_empty() || !email.contains('@') || timestamp.contains('|') {
        return Err(MalformedToken);
    }

    let timestamp_millis: i64 = timestamp.parse().map_err(|_| MalformedToken)?;

    Ok((email.to_string(), timestamp_millis))
}

/// Decode a token and return the email lowercased and trimmed, the form the
/// subscriber sheet is matched against.
pub fn decode_email(token: &str) -> Result<String, MalformedToken> {
    let (email, _) = decode(token)?;
    Ok(email.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let token = encode("user@example.com", 1700000000000);
        let (email, ts) = decode(&token).unwrap();
        assert_eq!(email, "user@example.com");
        assert_eq!(ts, 1700000000000);
    }

    #[test]
    fn test_token_is_url_safe() {
        // '+' and '/' in standard base64 come from bytes like 0xfb; make
        // sure the url-safe alphabet is in use and no padding is emitted
        let token = encode("weird+address@example.com", i64::MAX);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("!!!not-base64!!!").is_err());
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        let token = URL_SAFE_NO_PAD.encode("user@example.com");
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_decode_rejects_email_without_at() {
        let token = URL_SAFE_NO_PAD.encode("not-an-email|1700000000000");
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_decode_rejects_non_numeric_timestamp() {
        let token = URL_SAFE_NO_PAD.encode("user@example.com|yesterday");
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_decode_rejects_extra_parts() {
        let token = URL_SAFE_NO_PAD.encode("user@example.com|123|456");
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_decode_email_normalizes() {
        let token = encode(" User@Example.COM ", 1);
        assert_eq!(decode_email(&token).unwrap(), "user@example.com");
    }
}
