// Request dispatch: one HTTP round trip in, one classified response out.
//
// Transport failures and non-JSON bodies never escape as errors; they are
// synthesized into responses so every call delivers exactly one outcome.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::{KnechtError, Status};

/// A parsed (or synthesized) server response. Consumed by the operation
/// that issued the request; never retained.
#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub status: Status,
    /// Full response body; operations pick their payload fields out of it.
    pub body: Value,
    pub message: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ApiResponse {
    /// Synthesize a response for a failure that produced no valid JSON.
    fn server_error(message: String) -> Self {
        ApiResponse {
            status: Status::ServerError,
            body: Value::Null,
            message: Some(message),
            received_at: Utc::now(),
        }
    }

    /// Error for a non-`Ok` response.
    pub fn into_error(self) -> KnechtError {
        KnechtError::from_status(self.status, self.message)
    }

    /// Payload field from the response body, or `Server` if it is missing.
    pub fn field(&self, name: &str) -> Result<Value, KnechtError> {
        self.body
            .get(name)
            .cloned()
            .ok_or_else(|| KnechtError::Server(format!("response is missing the `{name}` field")))
    }

    /// String payload field.
    pub fn str_field(&self, name: &str) -> Result<String, KnechtError> {
        match self.field(name)? {
            Value::String(s) => Ok(s),
            other => Err(KnechtError::Server(format!(
                "response field `{name}` is not a string: {other}"
            ))),
        }
    }

    /// Boolean payload field.
    pub fn bool_field(&self, name: &str) -> Result<bool, KnechtError> {
        match self.field(name)? {
            Value::Bool(b) => Ok(b),
            other => Err(KnechtError::Server(format!(
                "response field `{name}` is not a boolean: {other}"
            ))),
        }
    }
}

/// Issues HTTP calls and classifies every outcome into an [`ApiResponse`].
/// Application code never touches this directly; the operation methods on
/// [`Knecht`](crate::Knecht) do.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    http: reqwest::Client,
    config: Config,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Dispatcher {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build `{server}{path}` with the given query pairs appended.
    /// `query_pairs_mut` percent-encodes each name and value exactly once;
    /// stored config values are raw, so nothing is double-encoded.
    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.config.server.clone();
        let full_path = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&full_path);
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        url
    }

    /// Send one request and classify the outcome.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ApiResponse {
        let url = self.build_url(path, query);
        let mut request = self
            .http
            .request(method.clone(), url)
            .timeout(self.config.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("{method} {path}: transport failure: {e}");
                return ApiResponse::server_error(format!("transport failure: {e}"));
            }
        };

        let http_status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("{method} {path}: failed to read body: {e}");
                return ApiResponse::server_error(format!("failed to read response body: {e}"));
            }
        };

        let resp = parse_body(http_status, &text);
        tracing::debug!(
            "{method} {path} -> {} at {}",
            resp.status,
            resp.received_at.to_rfc3339()
        );
        resp
    }
}

/// Classify a raw response body. A non-JSON or empty body, or a body with
/// no recognizable `status` field, becomes a synthesized server error.
fn parse_body(http_status: reqwest::StatusCode, text: &str) -> ApiResponse {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            return ApiResponse::server_error(format!("non-JSON response (http {http_status})"));
        }
    };

    let status = parsed
        .get("status")
        .and_then(|s| serde_json::from_value::<Status>(s.clone()).ok());
    let Some(status) = status else {
        return ApiResponse::server_error(format!(
            "response has no status classification (http {http_status})"
        ));
    };

    let message = parsed
        .get("message")
        .and_then(|m| m.as_str())
        .map(String::from);

    ApiResponse {
        status,
        body: parsed,
        message,
        received_at: Utc::now(),
    }
}
