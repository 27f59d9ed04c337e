//! HMAC-SHA256 request authentication.
//!
//! Each outbound call carries `Authorization: MPC-KMS {access_key_id}:{sig}`
//! where `sig` is the base64 HMAC-SHA256, keyed with the shared secret,
//! over the canonical string
//!
//! ```text
//! METHOD \n Content-SHA256 \n Content-Type \n Date
//! ```
//!
//! `Content-SHA256` is the base64 SHA-256 of the exact body bytes (the
//! empty body for GETs) and `Date` is RFC 1123 in GMT.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Authentication scheme name on the `Authorization` header.
pub const SCHEME: &str = "MPC-KMS";

/// Content type assumed when a request does not set one explicitly.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// The KMS access key pair. The secret never leaves this struct: it is
/// excluded from `Debug` output and only consumed by the HMAC.
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Credentials {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Builds the `Authorization` header value for a canonical string.
    pub fn authorization(&self, canonical: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        format!("{SCHEME} {}:{signature}", self.access_key_id)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Base64 SHA-256 of the request body bytes.
pub fn content_sha256(body: &[u8]) -> String {
    BASE64.encode(Sha256::digest(body))
}

/// RFC 1123 date in GMT, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The four-line string fed to the HMAC.
pub fn canonical_string(
    method: &str,
    content_sha256: &str,
    content_type: &str,
    date: &str,
) -> String {
    format!("{method}\n{content_sha256}\n{content_type}\n{date}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_body_digest_constant() {
        assert_eq!(
            content_sha256(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_http_date_format() {
        let at = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(http_date(at), "Mon, 02 Jan 2006 15:04:05 GMT");
    }

    #[test]
    fn test_canonical_string_layout() {
        let canonical = canonical_string(
            "POST",
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=",
            DEFAULT_CONTENT_TYPE,
            "Mon, 02 Jan 2006 15:04:05 GMT",
        );
        let lines: Vec<&str> = canonical.split('\n').collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "POST");
        assert_eq!(lines[2], "application/json");
    }

    #[test]
    fn test_authorization_header_shape() {
        let credentials = Credentials::new("ak-test", "sk-test");
        let header = credentials.authorization("POST\nx\napplication/json\ny");
        let rest = header.strip_prefix("MPC-KMS ak-test:").unwrap();
        // The signature is the base64 of a 32-byte MAC.
        let mac = BASE64.decode(rest).unwrap();
        assert_eq!(mac.len(), 32);
    }

    #[test]
    fn test_authorization_is_deterministic_and_keyed() {
        let credentials = Credentials::new("ak", "secret-a");
        let first = credentials.authorization("canonical");
        let second = credentials.authorization("canonical");
        assert_eq!(first, second);

        let other_key = Credentials::new("ak", "secret-b");
        assert_ne!(first, other_key.authorization("canonical"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = Credentials::new("ak", "super-secret");
        let formatted = format!("{credentials:?}");
        assert!(!formatted.contains("super-secret"));
        assert!(formatted.contains("<redacted>"));
    }
}
