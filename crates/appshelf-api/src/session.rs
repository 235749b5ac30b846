//! Server-side sessions.
//!
//! The browser only ever holds `token.signature`. The token is 32 random
//! bytes; the signature is an HMAC-SHA256 of the token under the process
//! secret, so a forged or edited cookie is rejected before the session map
//! is even consulted. Sessions live in memory and end with the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use appshelf_types::models::User;

pub const SESSION_COOKIE: &str = "appshelf_session";

type HmacSha256 = Hmac<Sha256>;

/// An established session, as handed back by [`SessionStore::login`].
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub cookie_value: String,
    pub user: User,
}

struct SessionEntry {
    user: User,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    mac: HmacSha256,
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(secret: &[u8], ttl: Duration) -> anyhow::Result<Self> {
        let mac = <HmacSha256 as Mac>::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;
        Ok(Self {
            inner: Arc::new(SessionStoreInner {
                mac,
                ttl,
                sessions: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Start a session for `user`.
    pub async fn login(&self, user: User) -> Session {
        let token = B64.encode(rand::random::<[u8; 32]>());
        let cookie_value = format!("{}.{}", token, self.sign(&token));

        self.inner.sessions.write().await.insert(
            token.clone(),
            SessionEntry {
                user: user.clone(),
                last_seen: Instant::now(),
            },
        );

        info!("Session started for {}", user.username);
        Session {
            token,
            cookie_value,
            user,
        }
    }

    /// Resolve a cookie value to its user. Bad signatures, unknown tokens
    /// and idle-expired sessions all resolve to `None`.
    pub async fn lookup(&self, cookie_value: &str) -> Option<User> {
        let token = self.verified_token(cookie_value)?;

        let mut sessions = self.inner.sessions.write().await;
        let entry = sessions.get_mut(token)?;
        if entry.last_seen.elapsed() > self.inner.ttl {
            debug!("Session for {} expired", entry.user.username);
            sessions.remove(token);
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.user.clone())
    }

    /// End a session. Returns whether there was one to end; ending an
    /// absent session is not an error.
    pub async fn logout(&self, cookie_value: &str) -> bool {
        let Some(token) = self.verified_token(cookie_value) else {
            return false;
        };
        match self.inner.sessions.write().await.remove(token) {
            Some(entry) => {
                info!("Session ended for {}", entry.user.username);
                true
            }
            None => false,
        }
    }

    /// Drop every idle-expired session. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let ttl = self.inner.ttl;
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    fn sign(&self, token: &str) -> String {
        hex::encode(self.mac(token).finalize().into_bytes())
    }

    fn verified_token<'a>(&self, cookie_value: &'a str) -> Option<&'a str> {
        let (token, signature) = cookie_value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        match self.mac(token).verify_slice(&signature) {
            Ok(()) => Some(token),
            Err(_) => {
                warn!("Rejected session cookie with bad signature");
                None
            }
        }
    }

    fn mac(&self, token: &str) -> HmacSha256 {
        let mut mac = self.inner.mac.clone();
        mac.update(token.as_bytes());
        mac
    }
}

/// Cookie carrying an established session.
pub fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie that clears the session cookie in the browser.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Background task that drops idle sessions.
pub async fn run_sweep_loop(store: SessionStore, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let count = store.purge_expired().await;
        if count > 0 {
            info!("Session sweep: dropped {} idle sessions", count);
        }
    }
}
