// Client handle and account operations: registration, sessions, user data.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::config::Config;
use crate::error::{KnechtError, Status};
use crate::session::{AuthSnapshot, SessionState};
use crate::transport::{ApiResponse, Dispatcher};

/// Asynchronous client for a JSON-over-HTTP game-state server.
///
/// Cheap to clone; all clones share one session, so a login performed
/// through one clone is visible to the others. Several independent
/// sessions in one process are just several `Knecht` instances.
#[derive(Debug, Clone)]
pub struct Knecht {
    dispatcher: Dispatcher,
    pub(crate) session: SessionState,
}

impl Knecht {
    /// Create a client for the given configuration.
    pub fn new(config: Config) -> Self {
        Knecht {
            dispatcher: Dispatcher::new(config),
            session: SessionState::new(),
        }
    }

    /// Create a client configured from environment variables
    /// (see [`Config::from_env`]).
    pub fn from_env() -> Result<Self, KnechtError> {
        Ok(Knecht::new(Config::from_env()?))
    }

    pub fn config(&self) -> &Config {
        self.dispatcher.config()
    }

    // ── Request plumbing ─────────────────────────────────────────────

    /// Dispatch with the `app` namespace attached. Every outgoing request
    /// funnels through here.
    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        extra: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ApiResponse {
        let app = self.config().app.clone();
        let mut query: Vec<(&str, &str)> = vec![("app", app.as_str())];
        query.extend_from_slice(extra);
        self.dispatcher.dispatch(method, path, &query, body).await
    }

    /// Dispatch an authenticated request carrying the identity captured in
    /// `auth`. The token is whatever the snapshot holds; a relogin that
    /// finishes after the snapshot was taken does not retroactively apply.
    pub(crate) async fn request_auth(
        &self,
        auth: &AuthSnapshot,
        method: Method,
        path: &str,
        extra: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ApiResponse {
        let mut query: Vec<(&str, &str)> =
            vec![("username", &auth.username), ("session", &auth.token)];
        query.extend_from_slice(extra);
        self.request(method, path, &query, body).await
    }

    /// Turn a response into `Ok` or the matching error.
    pub(crate) fn check(resp: ApiResponse) -> Result<ApiResponse, KnechtError> {
        match resp.status {
            Status::Ok => Ok(resp),
            _ => Err(resp.into_error()),
        }
    }

    /// Run `op` with the current session snapshot, retrying exactly once
    /// after a transparent relogin if the server rejects the session.
    ///
    /// The retry is bounded: if the relogin fails, the original
    /// authentication failure is surfaced; if the retried operation fails
    /// again - even with another authentication failure - that outcome is
    /// surfaced as-is. No second relogin is ever attempted for one call.
    pub(crate) async fn with_relogin<T, F, Fut>(&self, op: F) -> Result<T, KnechtError>
    where
        F: Fn(AuthSnapshot) -> Fut,
        Fut: Future<Output = Result<T, KnechtError>>,
    {
        let auth = self.session.snapshot()?;
        match op(auth).await {
            Err(original) if original.is_unauthorized() => {
                // Capture credentials before the relogin attempt, so a
                // concurrent login cannot hand this retry a token that
                // belongs to someone else.
                let creds = match self.session.credentials() {
                    Ok(c) => c,
                    Err(_) => return Err(original),
                };
                tracing::warn!(
                    "session for {} rejected, attempting relogin",
                    creds.username
                );
                if self.login(&creds.username, &creds.password).await.is_err() {
                    return Err(original);
                }
                let auth = self.session.snapshot()?;
                op(auth).await
            }
            outcome => outcome,
        }
    }

    // ── Accounts ─────────────────────────────────────────────────────

    /// Whether `username` is already registered for this application.
    pub async fn check_registered(&self, username: &str) -> Result<bool, KnechtError> {
        let resp = self
            .request(Method::GET, "/users", &[("username", username)], None)
            .await;
        Self::check(resp)?.bool_field("registered")
    }

    /// Register a new account and cache its credentials. `timeout` is the
    /// server-side retention period for the account's data; the server
    /// default applies when `None`. A server that issues a session token
    /// with registration leaves the client logged in.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        timeout: Option<Duration>,
    ) -> Result<(), KnechtError> {
        let secs = timeout.map(|t| t.as_secs().to_string());
        let mut query: Vec<(&str, &str)> = vec![("username", username)];
        if let Some(secs) = &secs {
            query.push(("timeout", secs));
        }
        let body = Value::String(password.to_string());
        let resp = self
            .request(Method::POST, "/users", &query, Some(&body))
            .await;
        let resp = Self::check(resp)?;

        self.session.begin_login(username, password);
        if let Ok(token) = resp.str_field("session") {
            self.session.set_token(token);
        }
        tracing::info!("registered account {username}");
        Ok(())
    }

    /// Log in and cache the issued session token. A failed login leaves no
    /// stale token behind.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), KnechtError> {
        self.session.begin_login(username, password);
        let body = Value::String(password.to_string());
        let resp = self
            .request(
                Method::PUT,
                "/users/session",
                &[("username", username)],
                Some(&body),
            )
            .await;
        let token = Self::check(resp)?.str_field("session")?;
        self.session.set_token(token);
        tracing::info!("logged in as {username}");
        Ok(())
    }

    /// End the current session. Local state is cleared even when the
    /// server reports an error: the token is unusable either way. Not
    /// retried on an authentication failure - an unauthorized logout is
    /// already logged out.
    pub async fn logout(&self) -> Result<(), KnechtError> {
        let auth = self.session.snapshot()?;
        let resp = self
            .request_auth(&auth, Method::DELETE, "/users/session", &[], None)
            .await;
        self.session.clear();
        Self::check(resp)?;
        tracing::info!("logged out {}", auth.username);
        Ok(())
    }

    /// Delete the account of the logged-in user. Local session state is
    /// cleared regardless of the outcome.
    pub async fn unregister(&self) -> Result<(), KnechtError> {
        let result = self
            .with_relogin(|auth| async move {
                let resp = self
                    .request_auth(&auth, Method::DELETE, "/users", &[], None)
                    .await;
                Self::check(resp).map(drop)
            })
            .await;
        self.session.clear();
        result
    }

    /// Ask the server to start password recovery for `username`.
    pub async fn recover_password(&self, username: &str) -> Result<(), KnechtError> {
        let resp = self
            .request(
                Method::GET,
                "/users/password",
                &[("username", username)],
                None,
            )
            .await;
        Self::check(resp).map(drop)
    }

    /// Change the password of the logged-in user. The cached credentials
    /// are updated so a later relogin uses the new password.
    pub async fn change_password(&self, new_password: &str) -> Result<(), KnechtError> {
        let body = Value::String(new_password.to_string());
        self.with_relogin(|auth| {
            let body = &body;
            async move {
                let resp = self
                    .request_auth(&auth, Method::PUT, "/users/password", &[], Some(body))
                    .await;
                Self::check(resp).map(drop)
            }
        })
        .await?;
        self.session.set_password(new_password);
        Ok(())
    }

    // ── User data ────────────────────────────────────────────────────

    /// Store a JSON value under `field` for the logged-in user.
    pub async fn put_user_data(&self, field: &str, value: &Value) -> Result<(), KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(
                    &auth,
                    Method::PUT,
                    "/users/data",
                    &[("field", field)],
                    Some(value),
                )
                .await;
            Self::check(resp).map(drop)
        })
        .await
    }

    /// Fetch the JSON value stored under `field`.
    pub async fn get_user_data(&self, field: &str) -> Result<Value, KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(&auth, Method::GET, "/users/data", &[("field", field)], None)
                .await;
            Self::check(resp)?.field("data")
        })
        .await
    }

    /// Delete the value stored under `field`.
    pub async fn delete_user_data(&self, field: &str) -> Result<(), KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(
                    &auth,
                    Method::DELETE,
                    "/users/data",
                    &[("field", field)],
                    None,
                )
                .await;
            Self::check(resp).map(drop)
        })
        .await
    }
}
