//! Slack request signature verification.
//!
//! Slack signs every request with HMAC-SHA256 over `v0:{timestamp}:{body}`
//! and sends the result as `X-Slack-Signature: v0={hex}`. Verification must
//! run on the raw body bytes; a parsed and re-serialized body is not
//! guaranteed to match what Slack signed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Version tag prefixed to both the base string and the signature header.
pub const SIGNATURE_VERSION: &str = "v0";

/// Header carrying the request timestamp (seconds since the Unix epoch).
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Reasons an inbound request failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing request timestamp header")]
    MissingTimestamp,

    #[error("missing request signature header")]
    MissingSignature,

    #[error("request timestamp is not a number: {0:?}")]
    MalformedTimestamp(String),

    #[error("request timestamp is {skew}s away from the local clock (tolerance {tolerance}s)")]
    Stale { skew: u64, tolerance: u64 },

    #[error("signature header is not a v0 hex digest")]
    MalformedSignature,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies inbound requests against a signing secret.
#[derive(Clone)]
pub struct Verifier {
    signing_secret: Vec<u8>,
    tolerance_seconds: u64,
}

impl Verifier {
    pub fn new(signing_secret: impl Into<Vec<u8>>, tolerance_seconds: u64) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            tolerance_seconds,
        }
    }

    /// Verify against the system clock.
    pub fn verify(
        &self,
        body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), AuthError> {
        self.verify_at(body, timestamp, signature, chrono::Utc::now().timestamp())
    }

    /// Verify against an explicit clock reading (Unix seconds).
    pub fn verify_at(
        &self,
        body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
        now: i64,
    ) -> Result<(), AuthError> {
        let timestamp = timestamp
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingTimestamp)?;
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSignature)?;

        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::MalformedTimestamp(timestamp.to_string()))?;
        let skew = now.abs_diff(issued_at);
        if skew > self.tolerance_seconds {
            return Err(AuthError::Stale {
                skew,
                tolerance: self.tolerance_seconds,
            });
        }

        verify(body, timestamp, signature, &self.signing_secret)
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish_non_exhaustive()
    }
}

/// Check `signature` against the HMAC of `v0:{timestamp}:{body}`.
///
/// Pure function of its inputs; does not look at the clock.
pub fn verify(
    body: &[u8],
    timestamp: &str,
    signature: &str,
    signing_secret: &[u8],
) -> Result<(), AuthError> {
    let digest = signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or(AuthError::MalformedSignature)?;
    let provided = hex::decode(digest)
        .map_err(|_| AuthError::MalformedSignature)?;

    let expected = mac(signing_secret, timestamp, body).finalize().into_bytes();

    // Lengths are not secret; `ct_eq` returns false on mismatch.
    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Ok(())
    } else {
        Err(AuthError::Mismatch)
    }
}

/// Compute the `X-Slack-Signature` header value for a request.
pub fn sign(signing_secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let digest = mac(signing_secret, timestamp, body).finalize().into_bytes();
    format!("{SIGNATURE_VERSION}={}", hex::encode(digest))
}

fn mac(signing_secret: &[u8], timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(signing_secret)
        .expect("HMAC can take key of any size");
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"8f742231b10e8888abcd99yyyzzz85a5";
    const TIMESTAMP: &str = "1531420618";
    const BODY: &[u8] = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";

    fn flip_bit(bytes: &[u8], index: usize, bit: u8) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out[index] ^= 1 << bit;
        out
    }

    #[test]
    fn test_known_slack_vector() {
        // Example from Slack's "Verifying requests from Slack" guide.
        let expected = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";
        assert_eq!(sign(SECRET, TIMESTAMP, BODY), expected);
        assert!(verify(BODY, TIMESTAMP, expected, SECRET).is_ok());
    }

    #[test]
    fn test_accepts_reference_signature() {
        let body = br#"{"type":"event_callback","event":{"type":"app_mention"}}"#;
        let sig = sign(b"secret", "1700000000", body);
        assert_eq!(verify(body, "1700000000", &sig, b"secret"), Ok(()));
    }

    #[test]
    fn test_rejects_body_bit_flips() {
        let body = br#"{"type":"event_callback"}"#;
        let sig = sign(b"secret", "1700000000", body);
        for index in [0, body.len() / 2, body.len() - 1] {
            for bit in [0, 3, 7] {
                let mutated = flip_bit(body, index, bit);
                assert_eq!(
                    verify(&mutated, "1700000000", &sig, b"secret"),
                    Err(AuthError::Mismatch),
                    "body byte {index} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn test_rejects_timestamp_bit_flips() {
        let body = b"{}";
        let sig = sign(b"secret", "1700000000", body);
        for index in 0.."1700000000".len() {
            let mutated = flip_bit(b"1700000000", index, 0);
            let mutated = String::from_utf8(mutated).unwrap();
            assert_eq!(
                verify(body, &mutated, &sig, b"secret"),
                Err(AuthError::Mismatch)
            );
        }
    }

    #[test]
    fn test_rejects_signature_bit_flips() {
        let body = b"{}";
        let sig = sign(b"secret", "1700000000", body);
        let digest = hex::decode(&sig[3..]).unwrap();
        for index in [0, 15, 31] {
            let mutated = format!("v0={}", hex::encode(flip_bit(&digest, index, 4)));
            assert_eq!(
                verify(body, "1700000000", &mutated, b"secret"),
                Err(AuthError::Mismatch)
            );
        }
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let sig = sign(b"secret", "1700000000", b"{}");
        assert_eq!(
            verify(b"{}", "1700000000", &sig, b"other"),
            Err(AuthError::Mismatch)
        );
    }

    #[test]
    fn test_rejects_malformed_signatures() {
        for sig in ["", "v1=abcd", "v0abcd", "v0=not-hex", "a2114d57b48eac39"] {
            assert_eq!(
                verify(b"{}", "1700000000", sig, b"secret"),
                Err(AuthError::MalformedSignature),
                "{sig:?}"
            );
        }
    }

    #[test]
    fn test_rejects_truncated_digest() {
        let sig = sign(b"secret", "1700000000", b"{}");
        let truncated = &sig[..sig.len() - 2];
        assert_eq!(
            verify(b"{}", "1700000000", truncated, b"secret"),
            Err(AuthError::Mismatch)
        );
    }

    #[test]
    fn test_verifier_requires_headers() {
        let verifier = Verifier::new("secret", 300);
        let sig = sign(b"secret", "1700000000", b"{}");
        assert_eq!(
            verifier.verify_at(b"{}", None, Some(&sig), 1_700_000_000),
            Err(AuthError::MissingTimestamp)
        );
        assert_eq!(
            verifier.verify_at(b"{}", Some("1700000000"), None, 1_700_000_000),
            Err(AuthError::MissingSignature)
        );
        assert_eq!(
            verifier.verify_at(b"{}", Some(" "), Some(&sig), 1_700_000_000),
            Err(AuthError::MissingTimestamp)
        );
    }

    #[test]
    fn test_verifier_rejects_non_numeric_timestamp() {
        let verifier = Verifier::new("secret", 300);
        let sig = sign(b"secret", "yesterday", b"{}");
        assert_eq!(
            verifier.verify_at(b"{}", Some("yesterday"), Some(&sig), 1_700_000_000),
            Err(AuthError::MalformedTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn test_verifier_enforces_tolerance_window() {
        let verifier = Verifier::new("secret", 300);
        let sig = sign(b"secret", "1700000000", b"{}");

        assert!(
            verifier
                .verify_at(b"{}", Some("1700000000"), Some(&sig), 1_700_000_300)
                .is_ok()
        );
        assert_eq!(
            verifier.verify_at(b"{}", Some("1700000000"), Some(&sig), 1_700_000_301),
            Err(AuthError::Stale {
                skew: 301,
                tolerance: 300
            })
        );
        // Timestamps from the future are bounded too.
        assert!(matches!(
            verifier.verify_at(b"{}", Some("1700000000"), Some(&sig), 1_699_999_000),
            Err(AuthError::Stale { .. })
        ));
    }

    #[test]
    fn test_verifier_uses_system_clock() {
        let verifier = Verifier::new("secret", 300);
        let now = chrono::Utc::now().timestamp().to_string();
        let sig = sign(b"secret", &now, b"{}");
        assert!(verifier.verify(b"{}", Some(&now), Some(&sig)).is_ok());
    }

    #[test]
    fn test_verifier_debug_hides_secret() {
        let verifier = Verifier::new("super-secret", 300);
        assert!(!format!("{verifier:?}").contains("super-secret"));
    }
}
