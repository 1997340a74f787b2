#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` using wiremock.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hue2mqtt_api::{
    ApiClient, ApiClientConfig, Body, CallOptions, CallRequest, Error, HttpMethod, RatePolicy,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn client_with(config: &ApiClientConfig) -> ApiClient {
    ApiClient::with_client(reqwest::Client::new(), config, CancellationToken::new())
}

fn client() -> ApiClient {
    client_with(&ApiClientConfig::default())
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{p}", server.uri())).unwrap()
}

// ── Success path ────────────────────────────────────────────────────

#[tokio::test]
async fn test_put_unwraps_single_result() {
    let server = MockServer::start().await;
    let api = client();

    Mock::given(method("PUT"))
        .and(path("/clip/v2/resource/light/abc123"))
        .and(header("hue-application-key", "secret"))
        .and(body_json(json!({"on": {"on": true}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"rid": "abc123", "rtype": "light"}],
            "errors": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = HeaderMap::new();
    headers.insert("hue-application-key", HeaderValue::from_static("secret"));

    let resp = api
        .call(
            HttpMethod::Put,
            url(&server, "/clip/v2/resource/light/abc123"),
            headers,
            Some(json!({"on": {"on": true}})),
            CallOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, Body::Json(json!({"rid": "abc123", "rtype": "light"})));
}

#[tokio::test]
async fn test_non_json_body_passes_through() {
    let server = MockServer::start().await;
    let api = client();

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let resp = api.get(url(&server, "/plain")).await.unwrap();
    assert_eq!(resp.body, Body::Text("pong".into()));
}

// ── Retry budget ────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_exhausts_retry_budget() {
    let server = MockServer::start().await;
    let api = client();

    Mock::given(method("GET"))
        .and(path("/clip/v2/resource/light"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(3)
        .mount(&server)
        .await;

    let result = api.get(url(&server, "/clip/v2/resource/light")).await;

    assert!(
        matches!(result, Err(Error::Http { status: 503, .. })),
        "expected HTTP 503 error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_retry_budget_override() {
    let server = MockServer::start().await;
    let api = client();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&server)
        .await;

    let request = CallRequest::new(HttpMethod::Get, url(&server, "/x")).options(CallOptions {
        rate: None,
        retry_budget: Some(5),
    });
    assert!(api.send(request).await.is_err());
}

#[tokio::test]
async fn test_transport_failure_is_returned() {
    let api = client();
    let result = api.get(Url::parse("http://127.0.0.1:1/unreachable").unwrap()).await;
    assert!(
        matches!(result, Err(Error::Transport(_))),
        "expected transport error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_recovers_within_budget() {
    let server = MockServer::start().await;
    let api = client();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let resp = api.get(url(&server, "/flaky")).await.unwrap();
    assert_eq!(resp.body, Body::Json(json!({"ok": true})));
}

// ── 429 handling ────────────────────────────────────────────────────

#[tokio::test]
async fn test_429_honors_retry_after_without_consuming_budget() {
    let server = MockServer::start().await;
    let api = client_with(&ApiClientConfig {
        retry_budget: 1,
        ..ApiClientConfig::default()
    });

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let start = Instant::now();
    let resp = api.get(url(&server, "/clip/v2/resource/light")).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(2), "retried too early");
    assert_eq!(resp.body, Body::Json(json!([])));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rate_limited_host_does_not_block_other_hosts() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;
    let api = client();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&slow)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&slow)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&fast)
        .await;

    let slow_api = api.clone();
    let slow_url = url(&slow, "/a");
    let slow_call = tokio::spawn(async move { slow_api.get(slow_url).await });

    // Let the slow host receive its 429 first.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    api.get(url(&fast, "/b")).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!slow_call.is_finished());

    slow_call.await.unwrap().unwrap();
}

// ── Admission control ───────────────────────────────────────────────

#[tokio::test]
async fn test_admission_window_delays_excess_calls() {
    let server = MockServer::start().await;
    let api = client_with(&ApiClientConfig {
        default_rate: RatePolicy::new(2, 500),
        ..ApiClientConfig::default()
    });

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let start = Instant::now();
    for _ in 0..3 {
        api.get(url(&server, "/clip/v2/resource/light")).await.unwrap();
    }
    assert!(start.elapsed() >= Duration::from_millis(450));
}

#[tokio::test]
async fn test_identical_calls_are_not_deduplicated() {
    let server = MockServer::start().await;
    let api = client();

    Mock::given(method("PUT"))
        .and(path("/clip/v2/resource/light/abc"))
        .and(body_json(json!({"on": {"on": false}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    for _ in 0..2 {
        let request = CallRequest::new(HttpMethod::Put, url(&server, "/clip/v2/resource/light/abc"))
            .json(json!({"on": {"on": false}}));
        api.send(request).await.unwrap();
    }
}

#[tokio::test]
async fn test_cancelled_client_reports_shutdown() {
    let cancel = CancellationToken::new();
    let api = ApiClient::with_client(reqwest::Client::new(), &ApiClientConfig::default(), cancel.clone());
    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = api.get(Url::parse("http://127.0.0.1:1/").unwrap()).await;
    assert!(matches!(result, Err(Error::Shutdown)), "got: {result:?}");
}
