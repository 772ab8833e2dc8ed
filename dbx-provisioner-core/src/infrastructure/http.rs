// dbx-provisioner-core/src/infrastructure/http.rs
//
// Shared outbound transport: one reqwest client per trust domain, bounded by a
// request timeout, with exponential backoff on transient failures only.

use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::error::ApiError;
use crate::infrastructure::error::InfrastructureError;

// --- RETRY POLICY ---

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Exponential backoff: `min(base * 2^retry, max) ± jitter`.
///
/// ```text
/// retry   delay (base=500ms)   with jitter (±10%)
///   0          500ms             450ms - 550ms
///   1            1s              900ms - 1.1s
///   2            2s              1.8s  - 2.2s
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryPolicy(attempts={}, base={}ms, max={}ms, jitter={:.1}%)",
            self.max_attempts,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor * 100.0
        )
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let raw = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.min(32)));
        let delay = raw.min(self.max_delay_ms);

        let jitter_range = (delay as f64 * self.jitter_factor) as i64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        Duration::from_millis((delay as i64 + jitter).max(0) as u64)
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && self.can_retry(attempt) => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        call = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "⏳ Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// --- TRANSPORT ---

/// JSON-over-HTTP client for one downstream service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    service: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(
        service: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, InfrastructureError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dbx-provisioner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            service: service.into(),
            retry,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sends a bearer-authenticated JSON request. An empty 2xx body yields `Value::Null`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        bearer: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.send_with(&self.retry, method, url, query, bearer, body).await
    }

    /// Single attempt, for non-idempotent creates. A create that timed out may
    /// still have been applied server-side; the next reconcile finds it by name.
    pub async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        bearer: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.send_with(&RetryPolicy::none(), method, url, query, bearer, body).await
    }

    async fn send_with(
        &self,
        retry: &RetryPolicy,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        bearer: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let what = format!("{} {}", method, url);
        retry
            .run(&what, || {
                debug!(service = %self.service, %method, url, "→ request");
                let mut request = self
                    .client
                    .request(method.clone(), url)
                    .bearer_auth(bearer);
                if !query.is_empty() {
                    request = request.query(query);
                }
                if let Some(payload) = body {
                    request = request.json(payload);
                }
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| ApiError::network(&self.service, e.to_string()))?;
                    self.decode(response).await
                }
            })
            .await
    }

    /// Form POST, used by the OAuth token endpoint.
    pub async fn send_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.retry
            .run(url, || {
                let request = self.client.post(url).form(form);
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| ApiError::network(&self.service, e.to_string()))?;
                    self.decode(response).await
                }
            })
            .await
    }

    async fn decode(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(&self.service, e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::http(
                &self.service,
                status.as_u16(),
                error_message(status, &text),
            ));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            ApiError::network(&self.service, format!("invalid JSON response: {}", e))
        })
    }
}

/// Extracts the readable part of ARM / Graph / Databricks error payloads.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error_description"))
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
        None => body.trim().to_string(),
    }
}

/// String or number id field, as Databricks returns both.
pub fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn str_field<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}
