//! Magic-link issuance, session cookies, and bearer-token validation.

pub mod middleware;
pub mod session;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tracing::{info, warn};

use holocene_core::ApiToken;
use holocene_store::{Store, StoreError};

use self::session::{SESSION_COOKIE, SessionSigner};

/// Magic-link tokens are single-use and short-lived.
pub const MAGIC_LINK_TTL_MINUTES: i64 = 5;

/// The persisted signing-key setting. The key name predates this daemon's
/// current shape and is kept for database compatibility.
const SIGNING_KEY_SETTING: &str = "flask_secret_key";

/// `User-Agent` substrings of link-preview fetchers. These prefetch magic
/// links to render previews and would consume single-use tokens; they get a
/// static page instead.
const PREVIEW_BOT_MARKERS: &[&str] = &[
    "telegrambot",
    "discordbot",
    "slackbot",
    "facebookexternalhit",
    "twitterbot",
    "whatsapp",
    "bot",
    "preview",
    "crawler",
];

/// How a request authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Session,
    Bearer,
}

/// Identity attached to authenticated requests.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
    pub method: AuthMethod,
}

/// Magic-link + session + bearer authentication over the store.
pub struct AuthService {
    store: Store,
    signer: SessionSigner,
    base_url: String,
}

impl AuthService {
    /// Load (or generate and persist) the session signing key and build the
    /// service. Sessions survive restarts because the key is stored.
    pub async fn bootstrap(store: Store, base_url: String) -> Result<Self, StoreError> {
        let key_hex = match store.get_setting(SIGNING_KEY_SETTING).await? {
            Some(existing) => existing,
            None => {
                let mut key = [0_u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                let encoded = hex::encode(key);
                store.set_setting(SIGNING_KEY_SETTING, &encoded).await?;
                info!("generated new session signing key");
                encoded
            }
        };
        let key = hex::decode(&key_hex).unwrap_or_else(|_| key_hex.clone().into_bytes());

        Ok(Self {
            store,
            signer: SessionSigner::new(key),
            base_url,
        })
    }

    /// Generate a fresh 256-bit URL-safe token.
    #[must_use]
    pub fn generate_token() -> String {
        let mut bytes = [0_u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Issue a magic link for a user. Invoked through a trusted side channel
    /// (the messaging bot), never through the HTTP surface itself.
    pub async fn issue_magic_link(&self, user_id: i64) -> Result<String, StoreError> {
        let token = Self::generate_token();
        let expires_at = Utc::now() + Duration::minutes(MAGIC_LINK_TTL_MINUTES);
        self.store
            .create_auth_token(user_id, &token, expires_at)
            .await?;
        info!(user_id, "issued magic link");
        Ok(format!("{}/auth/login?token={token}", self.base_url))
    }

    /// Whether a `User-Agent` looks like a link-preview fetcher.
    #[must_use]
    pub fn is_preview_bot(user_agent: &str) -> bool {
        let lowered = user_agent.to_lowercase();
        PREVIEW_BOT_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
    }

    /// Atomically consume a magic-link token and mint a session cookie
    /// value. Returns `None` for unknown, used, or expired tokens.
    pub async fn login_with_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Option<(i64, String)>, StoreError> {
        let Some(user_id) = self
            .store
            .consume_auth_token(token, now, ip_address, user_agent)
            .await?
        else {
            warn!("login attempt with invalid or expired token");
            return Ok(None);
        };

        let cookie = self.signer.sign(user_id, now);
        info!(user_id, "magic link login succeeded");
        Ok(Some((user_id, cookie)))
    }

    /// Verify a session cookie value.
    #[must_use]
    pub fn verify_session(&self, value: &str, now: DateTime<Utc>) -> Option<i64> {
        self.signer.verify(value, now)
    }

    /// Validate a bearer token; refreshes `last_used_at` on success.
    pub async fn validate_bearer(&self, token: &str) -> Result<Option<ApiToken>, StoreError> {
        self.store.validate_api_token(token).await
    }

    /// Build the `Set-Cookie` header value for a session.
    #[must_use]
    pub fn session_cookie(value: &str) -> String {
        format!(
            "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            session::SESSION_LIFETIME_DAYS * 86_400
        )
    }

    /// Build the `Set-Cookie` header value that clears the session.
    #[must_use]
    pub fn clear_session_cookie() -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// Pull the session value out of a `Cookie` header.
#[must_use]
pub fn session_from_cookie_header(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_bot_detection() {
        assert!(AuthService::is_preview_bot("TelegramBot (like TwitterBot)"));
        assert!(AuthService::is_preview_bot("Slackbot-LinkExpanding 1.0"));
        assert!(AuthService::is_preview_bot("WhatsApp/2.23.20"));
        assert!(!AuthService::is_preview_bot(
            "Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0"
        ));
    }

    #[test]
    fn tokens_are_urlsafe_and_unique() {
        let a = AuthService::generate_token();
        let b = AuthService::generate_token();
        assert_ne!(a, b);
        assert!(a.len() >= 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn cookie_header_parsing() {
        let header = "theme=dark; holocene_session=v1.42.99.abcd; other=1";
        assert_eq!(session_from_cookie_header(header), Some("v1.42.99.abcd"));
        assert_eq!(session_from_cookie_header("theme=dark"), None);
    }

    #[tokio::test]
    async fn magic_link_flow() {
        let store = Store::open_in_memory().await.unwrap();
        let user = store.get_or_create_user(7, Some("ada")).await.unwrap();
        let auth = AuthService::bootstrap(store.clone(), "https://holo.example.org".to_owned())
            .await
            .unwrap();

        let link = auth.issue_magic_link(user.id).await.unwrap();
        assert!(link.starts_with("https://holo.example.org/auth/login?token="));
        let token = link.split("token=").nth(1).unwrap();

        let now = Utc::now();
        let (user_id, cookie) = auth
            .login_with_token(token, now, Some("127.0.0.1"), Some("firefox"))
            .await
            .unwrap()
            .expect("first use succeeds");
        assert_eq!(user_id, user.id);
        assert_eq!(auth.verify_session(&cookie, now), Some(user.id));

        // Single use.
        let second = auth.login_with_token(token, now, None, None).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn signing_key_survives_rebootstrap() {
        let store = Store::open_in_memory().await.unwrap();
        let user = store.get_or_create_user(7, None).await.unwrap();

        let auth1 = AuthService::bootstrap(store.clone(), "http://localhost".to_owned())
            .await
            .unwrap();
        let link = auth1.issue_magic_link(user.id).await.unwrap();
        let token = link.split("token=").nth(1).unwrap();
        let now = Utc::now();
        let (_, cookie) = auth1
            .login_with_token(token, now, None, None)
            .await
            .unwrap()
            .unwrap();

        // A second bootstrap over the same store loads the same key, so the
        // session stays valid across restarts.
        let auth2 = AuthService::bootstrap(store, "http://localhost".to_owned())
            .await
            .unwrap();
        assert_eq!(auth2.verify_session(&cookie, now), Some(user.id));
    }
}
