//! Signed session cookies.
//!
//! A session value is `v1.{user_id}.{expires_unix}.{hex hmac}` where the MAC
//! covers the first three fields. The key is the daemon's persisted signing
//! key, so sessions survive restarts.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "holocene_session";
pub const SESSION_LIFETIME_DAYS: i64 = 30;

/// Signs and verifies session values with an HMAC key.
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    #[must_use]
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    fn mac(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Create a session value for a user, expiring after the standard
    /// lifetime.
    #[must_use]
    pub fn sign(&self, user_id: i64, now: DateTime<Utc>) -> String {
        let expires = (now + Duration::days(SESSION_LIFETIME_DAYS)).timestamp();
        let payload = format!("v1.{user_id}.{expires}");
        let mac = self.mac(&payload);
        format!("{payload}.{mac}")
    }

    /// Verify a session value and return the user id if the signature holds
    /// and the session has not expired.
    #[must_use]
    pub fn verify(&self, value: &str, now: DateTime<Utc>) -> Option<i64> {
        let mut parts = value.splitn(4, '.');
        let version = parts.next()?;
        let user_id = parts.next()?;
        let expires = parts.next()?;
        let mac = parts.next()?;
        if version != "v1" {
            return None;
        }

        let payload = format!("v1.{user_id}.{expires}");
        let expected = self.mac(&payload);
        if expected.as_bytes().ct_eq(mac.as_bytes()).unwrap_u8() != 1 {
            return None;
        }

        let expires: i64 = expires.parse().ok()?;
        if expires <= now.timestamp() {
            return None;
        }
        user_id.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SessionSigner {
        SessionSigner::new(b"test-signing-key".to_vec())
    }

    #[test]
    fn roundtrip() {
        let signer = signer();
        let now = Utc::now();
        let value = signer.sign(42, now);
        assert_eq!(signer.verify(&value, now), Some(42));
    }

    #[test]
    fn tampering_with_user_id_is_rejected() {
        let signer = signer();
        let now = Utc::now();
        let value = signer.sign(42, now);

        let mut parts: Vec<&str> = value.split('.').collect();
        parts[1] = "1";
        let forged = parts.join(".");
        assert_eq!(signer.verify(&forged, now), None);
    }

    #[test]
    fn expired_session_is_rejected() {
        let signer = signer();
        let issued = Utc::now() - Duration::days(SESSION_LIFETIME_DAYS + 1);
        let value = signer.sign(42, issued);
        assert_eq!(signer.verify(&value, Utc::now()), None);
    }

    #[test]
    fn different_key_is_rejected() {
        let value = signer().sign(42, Utc::now());
        let other = SessionSigner::new(b"other-key".to_vec());
        assert_eq!(other.verify(&value, Utc::now()), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(signer().verify("", Utc::now()), None);
        assert_eq!(signer().verify("v1.42", Utc::now()), None);
        assert_eq!(signer().verify("v2.42.9999999999.abcd", Utc::now()), None);
    }
}
