// Rate-limited bridge HTTP client
//
// Every call is sent as an envelope to a single coordinator task. The
// coordinator routes it to a worker task owning the `CallState` of the
// target host, so rate-limit bookkeeping is never shared and calls to one
// host run strictly in submission order. A host that is rate limited only
// stalls its own worker.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, trace, warn};
use url::Url;

use crate::call_state::{CallState, DEFAULT_ENDPOINT};
use crate::catalog::HttpMethod;
use crate::error::Error;
use crate::rate::{RatePolicy, sleep_until};
use crate::transport::TransportConfig;

const CALL_CHANNEL_SIZE: usize = 64;

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

// ── Request / response types ─────────────────────────────────────────

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Path-specific rate policy. When set, the call is counted against a
    /// window keyed by the request path instead of the host default.
    pub rate: Option<RatePolicy>,
    /// Overrides the client-wide retry budget.
    pub retry_budget: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub options: CallOptions,
}

impl CallRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            options: CallOptions::default(),
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Rate-window key and policy for this request.
    fn endpoint(&self, default: RatePolicy) -> (String, RatePolicy) {
        match self.options.rate {
            Some(policy) => (self.url.path().to_owned(), policy),
            None => (DEFAULT_ENDPOINT.to_owned(), default),
        }
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
    Empty,
}

impl Body {
    /// Decode a raw body. JSON documents are unwrapped: a `data` array of
    /// length one yields its single element, any other `data` array is
    /// returned as the array. Non-JSON text passes through unchanged.
    pub fn decode(text: String) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::Json(unwrap_data(value)),
            Err(_) => Self::Text(text),
        }
    }
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_array) => {
            match map.remove("data") {
                Some(Value::Array(mut items)) if items.len() == 1 => items.remove(0),
                Some(other) => other,
                None => Value::Object(map),
            }
        }
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Body,
}

// ── ApiClient ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub transport: TransportConfig,
    /// Attempts per call before the last error is returned.
    pub retry_budget: u32,
    /// Policy for endpoints without a path-specific override.
    pub default_rate: RatePolicy,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            retry_budget: 3,
            default_rate: RatePolicy::default(),
        }
    }
}

struct CallEnvelope {
    request: CallRequest,
    response_tx: oneshot::Sender<Result<ApiResponse, Error>>,
}

#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    retry_budget: u32,
    default_rate: RatePolicy,
}

/// Handle to the call coordinator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    call_tx: mpsc::Sender<CallEnvelope>,
}

impl ApiClient {
    /// Build the HTTP client from `config` and spawn the coordinator.
    pub fn spawn(config: &ApiClientConfig, cancel: CancellationToken) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        Ok(Self::with_client(http, config, cancel))
    }

    /// Spawn the coordinator around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        config: &ApiClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (call_tx, call_rx) = mpsc::channel(CALL_CHANNEL_SIZE);
        let settings = WorkerSettings {
            retry_budget: config.retry_budget.max(1),
            default_rate: config.default_rate,
        };
        tokio::spawn(coordinator_task(call_rx, http, settings, cancel));
        Self { call_tx }
    }

    /// Perform one call with admission control and retries.
    pub async fn call(
        &self,
        method: HttpMethod,
        url: Url,
        headers: HeaderMap,
        body: Option<Value>,
        options: CallOptions,
    ) -> Result<ApiResponse, Error> {
        self.send(CallRequest {
            method,
            url,
            headers,
            body,
            options,
        })
        .await
    }

    /// `GET` with default options and no extra headers.
    pub async fn get(&self, url: Url) -> Result<ApiResponse, Error> {
        self.send(CallRequest::new(HttpMethod::Get, url)).await
    }

    pub async fn send(&self, request: CallRequest) -> Result<ApiResponse, Error> {
        let (response_tx, response_rx) = oneshot::channel();
        self.call_tx
            .send(CallEnvelope {
                request,
                response_tx,
            })
            .await
            .map_err(|_| Error::Shutdown)?;
        response_rx.await.map_err(|_| Error::Shutdown)?
    }
}

// ── Coordinator ──────────────────────────────────────────────────────

fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}

async fn coordinator_task(
    mut rx: mpsc::Receiver<CallEnvelope>,
    http: reqwest::Client,
    settings: WorkerSettings,
    cancel: CancellationToken,
) {
    let mut hosts: HashMap<String, mpsc::UnboundedSender<CallEnvelope>> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let host = host_key(&envelope.request.url);
                let worker = hosts.entry(host.clone()).or_insert_with(|| {
                    debug!(host = %host, "starting host worker");
                    let (tx, rx) = mpsc::unbounded_channel();
                    let span = info_span!("api_host", host = %host);
                    tokio::spawn(
                        host_worker(CallState::new(host.clone()), rx, http.clone(), settings, cancel.clone())
                            .instrument(span),
                    );
                    tx
                });
                if let Err(mpsc::error::SendError(envelope)) = worker.send(envelope) {
                    let _ = envelope.response_tx.send(Err(Error::Shutdown));
                }
            }
        }
    }

    debug!("api coordinator exiting");
}

async fn host_worker(
    mut state: CallState,
    mut rx: mpsc::UnboundedReceiver<CallEnvelope>,
    http: reqwest::Client,
    settings: WorkerSettings,
    cancel: CancellationToken,
) {
    while let Some(envelope) = rx.recv().await {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Shutdown),
            result = execute(&http, settings, &mut state, &envelope.request) => result,
        };
        let _ = envelope.response_tx.send(result);
    }
    trace!(host = state.host(), "host worker exiting");
}

// ── Per-call algorithm ───────────────────────────────────────────────

async fn execute(
    http: &reqwest::Client,
    settings: WorkerSettings,
    state: &mut CallState,
    request: &CallRequest,
) -> Result<ApiResponse, Error> {
    let budget = request.options.retry_budget.unwrap_or(settings.retry_budget).max(1);
    let (key, policy) = request.endpoint(settings.default_rate);
    let mut remaining = budget;

    loop {
        wait_for_admission(state, &key, policy).await;

        let attempt = budget - remaining + 1;
        debug!(method = %request.method, url = %request.url, attempt, "sending request");

        let error = match perform(http, request).await {
            Ok((status, _, text)) if (200..300).contains(&status) => {
                let body = Body::decode(text);
                state.record_success(body.clone());
                return Ok(ApiResponse { status, body });
            }
            Ok((429, headers, _)) => {
                let secs = retry_after_secs(&headers);
                warn!(url = %request.url, retry_after_secs = secs, "rate limited by bridge");
                state.defer_until(Instant::now() + std::time::Duration::from_secs(secs));
                state.record_error(Error::RateLimited { retry_after_secs: secs }.to_string());
                continue;
            }
            Ok((status, _, body)) => Error::Http { status, body },
            Err(e) => e,
        };

        state.record_error(error.to_string());
        remaining -= 1;
        if remaining == 0 {
            warn!(url = %request.url, attempts = budget, error = %error, "retry budget exhausted");
            return Err(error);
        }
        debug!(url = %request.url, error = %error, remaining, "request failed, retrying");
    }
}

/// Block until the host may send: honor a pending retry-after exactly
/// once, then wait for a slot in the endpoint's rate window.
async fn wait_for_admission(state: &mut CallState, key: &str, policy: RatePolicy) {
    loop {
        let now = Instant::now();
        if let Some(deadline) = state.pending_deferral(now) {
            debug!(
                wait_ms = u64::try_from(deadline.duration_since(now).as_millis()).unwrap_or(u64::MAX),
                "honoring retry-after"
            );
            sleep_until(deadline).await;
            state.clear_deferral();
            continue;
        }
        state.clear_deferral();

        let window = state.window(key, policy, now);
        if window.check_and_admit(now, 1) {
            return;
        }
        let rollover = window.rollover_at();
        trace!(endpoint = key, count = window.count(), "admission refused, waiting for window");
        sleep_until(rollover).await;
    }
}

async fn perform(
    http: &reqwest::Client,
    request: &CallRequest,
) -> Result<(u16, HeaderMap, String), Error> {
    let mut builder = http
        .request(request.method.into(), request.url.clone())
        .headers(request.headers.clone());
    if let Some(ref body) = request.body {
        builder = builder.json(body);
    }

    let resp = builder.send().await?;
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let text = resp.text().await?;
    Ok((status, headers, text))
}

fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn single_element_data_is_unwrapped() {
        let body = Body::decode(json!({"errors": [], "data": [{"id": "a"}]}).to_string());
        assert_eq!(body, Body::Json(json!({"id": "a"})));
    }

    #[test]
    fn multi_element_data_returns_array() {
        let body = Body::decode(json!({"data": [{"id": "a"}, {"id": "b"}]}).to_string());
        assert_eq!(body, Body::Json(json!([{"id": "a"}, {"id": "b"}])));
    }

    #[test]
    fn documents_without_data_pass_through() {
        let body = Body::decode(json!([{"id": "x", "internalipaddress": "10.0.0.2"}]).to_string());
        assert_eq!(
            body,
            Body::Json(json!([{"id": "x", "internalipaddress": "10.0.0.2"}]))
        );
    }

    #[test]
    fn non_json_passes_through() {
        assert_eq!(Body::decode("hello".into()), Body::Text("hello".into()));
        assert_eq!(Body::decode("  ".into()), Body::Empty);
    }

    #[test]
    fn endpoint_key_uses_path_only_with_override() {
        let url = Url::parse("https://10.0.0.2/clip/v2/resource/grouped_light/g1").unwrap();
        let plain = CallRequest::new(HttpMethod::Put, url.clone());
        assert_eq!(plain.endpoint(RatePolicy::default()).0, "default");

        let limited = CallRequest::new(HttpMethod::Put, url).options(CallOptions {
            rate: Some(RatePolicy::new(1, 1000)),
            retry_budget: None,
        });
        let (key, policy) = limited.endpoint(RatePolicy::default());
        assert_eq!(key, "/clip/v2/resource/grouped_light/g1");
        assert_eq!(policy.max_requests, 1);
    }

    #[test]
    fn host_key_includes_port() {
        let url = Url::parse("https://10.0.0.2/clip/v2/resource").unwrap();
        assert_eq!(host_key(&url), "10.0.0.2:443");
        let url = Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(host_key(&url), "127.0.0.1:8080");
    }

    #[test]
    fn retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), DEFAULT_RETRY_AFTER_SECS);
        headers.insert(RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(retry_after_secs(&headers), 2);
    }
}
