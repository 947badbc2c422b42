// Per-client session state: cached credentials and the last-issued token.

use std::sync::{Arc, Mutex};

use crate::error::KnechtError;

/// Credentials captured at the start of a relogin attempt.
#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub username: String,
    pub password: String,
}

/// Snapshot of the authenticated identity, taken immediately before a
/// request is built. A relogin completing mid-flight never changes what an
/// already-built request sends; the next request picks up the new token.
#[derive(Debug, Clone)]
pub(crate) struct AuthSnapshot {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Default)]
struct SessionInner {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

/// Thread-safe session state shared by all clones of one client.
/// The lock is only held to copy values in or out, never across an await.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    inner: Arc<Mutex<SessionInner>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache credentials for a login attempt. Any previous token is
    /// cleared: it belongs to a session the caller is abandoning.
    pub fn begin_login(&self, username: &str, password: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.username = Some(username.to_string());
        inner.password = Some(password.to_string());
        inner.token = None;
    }

    /// Record the token issued by a successful authentication.
    pub fn set_token(&self, token: String) {
        self.inner.lock().unwrap().token = Some(token);
    }

    /// Update the cached password after a successful password change, so
    /// a later relogin uses the credentials the server now expects.
    pub fn set_password(&self, password: &str) {
        self.inner.lock().unwrap().password = Some(password.to_string());
    }

    /// Drop all cached state (logout, unregister).
    pub fn clear(&self) {
        *self.inner.lock().unwrap() = SessionInner::default();
    }

    /// Username and current token, or `NotLoggedIn` if either is missing.
    pub fn snapshot(&self) -> Result<AuthSnapshot, KnechtError> {
        let inner = self.inner.lock().unwrap();
        match (&inner.username, &inner.token) {
            (Some(username), Some(token)) => Ok(AuthSnapshot {
                username: username.clone(),
                token: token.clone(),
            }),
            _ => Err(KnechtError::NotLoggedIn),
        }
    }

    /// Cached credentials for a relogin attempt.
    pub fn credentials(&self) -> Result<Credentials, KnechtError> {
        let inner = self.inner.lock().unwrap();
        match (&inner.username, &inner.password) {
            (Some(username), Some(password)) => Ok(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(KnechtError::NotLoggedIn),
        }
    }
}
