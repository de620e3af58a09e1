//! Session-gated authentication for the single operator account.
//!
//! A session is an opaque id (carried in a cookie by the HTTP layer) that
//! maps to server-side state. Credentials are compared with plain equality
//! and there is no login throttling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::captcha::CaptchaVerifier;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please complete the reCAPTCHA")]
    CaptchaRejected,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub authenticated: bool,
    last_seen: Instant,
}

/// In-memory session store with idle expiry.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the live session for `id`, refreshing its idle timer.
    /// Expired sessions are dropped and reported as absent.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get_mut(id) {
            None => return None,
            Some(session) if session.last_seen.elapsed() > self.ttl => true,
            Some(session) => {
                session.last_seen = Instant::now();
                false
            }
        };
        if expired {
            debug!("session expired");
            sessions.remove(id);
            return None;
        }
        sessions.get(id).cloned()
    }

    pub async fn set(&self, id: SessionId, authenticated: bool) {
        let session = Session {
            authenticated,
            last_seen: Instant::now(),
        };
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.last_seen.elapsed() <= self.ttl);
        sessions.insert(id, session);
    }

    pub async fn destroy(&self, id: &SessionId) {
        self.sessions.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Guards privileged actions behind a captcha-checked login.
#[derive(Clone)]
pub struct AuthGate {
    credential: Arc<Credential>,
    captcha: Arc<dyn CaptchaVerifier>,
    sessions: SessionStore,
}

impl AuthGate {
    pub fn new(credential: Credential, captcha: Arc<dyn CaptchaVerifier>, sessions: SessionStore) -> Self {
        Self {
            credential: Arc::new(credential),
            captcha,
            sessions,
        }
    }

    /// Checks the captcha first, then the credentials. On success a fresh
    /// authenticated session is created and its id returned; the previous
    /// session, if any, is dropped.
    pub async fn login(
        &self,
        current: Option<&SessionId>,
        username: &str,
        password: &str,
        captcha_token: &str,
    ) -> Result<SessionId, AuthError> {
        if !self.captcha.verify(captcha_token).await {
            warn!("Login rejected for '{}': captcha failed", username);
            return Err(AuthError::CaptchaRejected);
        }
        if !self.credential.matches(username, password) {
            warn!("Login rejected for '{}': invalid credentials", username);
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(old) = current {
            self.sessions.destroy(old).await;
        }
        let id = SessionId::generate();
        self.sessions.set(id.clone(), true).await;
        info!("User '{}' logged in", username);
        Ok(id)
    }

    pub async fn is_authenticated(&self, session: Option<&SessionId>) -> bool {
        match session {
            Some(id) => self
                .sessions
                .get(id)
                .await
                .is_some_and(|s| s.authenticated),
            None => false,
        }
    }

    pub async fn logout(&self, session: Option<&SessionId>) {
        if let Some(id) = session {
            self.sessions.destroy(id).await;
            info!("Session logged out");
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
