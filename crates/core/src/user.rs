use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account known to the daemon. The process assumes one administrative
/// user plus session guests; users are keyed by their messaging identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub telegram_user_id: i64,
    pub telegram_username: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// A single-use magic-link token. Valid iff `used_at` is null and
/// `expires_at` is in the future.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuthToken {
    /// Whether the token can still open a session at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// A long-lived bearer credential. Valid iff not revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Process-wide persisted key/value state, notably the session signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSetting {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
