//! End-to-end tests for the gate.
//!
//! Each test starts a mock JSON-RPC upstream and the real router on
//! ephemeral ports, then drives the gate over HTTP with `reqwest`. The mock
//! counts hits so tests can assert that rejected requests never reach it.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;

use rpc_gate::config::ApiKey;
use rpc_gate::{AppState, Config, build_router};

const TEST_KEY: &str = "test-key-4f1c9e";

// ============================================================================
// Mock Upstream
// ============================================================================

/// What the mock upstream answers with.
#[derive(Clone)]
struct MockReply {
    status: StatusCode,
    content_type: &'static str,
    body: &'static str,
    delay: Duration,
}

impl Default for MockReply {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: r#"{"jsonrpc":"2.0","id":1,"result":"0xa4b1"}"#,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct MockUpstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Bytes>>>,
    last_path: Arc<Mutex<Option<String>>>,
    last_content_type: Arc<Mutex<Option<String>>>,
}

#[derive(Clone)]
struct MockState {
    upstream: MockUpstream,
    reply: MockReply,
}

impl MockUpstream {
    async fn start(reply: MockReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = Self {
            addr: listener.local_addr().unwrap(),
            hits: Arc::new(AtomicUsize::new(0)),
            last_body: Arc::new(Mutex::new(None)),
            last_path: Arc::new(Mutex::new(None)),
            last_content_type: Arc::new(Mutex::new(None)),
        };

        let app = Router::new()
            .route("/v2/{key}", post(mock_rpc))
            .with_state(MockState {
                upstream: upstream.clone(),
                reply,
            });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        upstream
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn base_url(&self) -> String {
        format!("http://{}/v2", self.addr)
    }
}

async fn mock_rpc(
    State(mock): State<MockState>,
    uri: Uri,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Response {
    mock.upstream.hits.fetch_add(1, Ordering::SeqCst);
    *mock.upstream.last_body.lock().unwrap() = Some(body);
    *mock.upstream.last_path.lock().unwrap() = Some(uri.path().to_string());
    *mock.upstream.last_content_type.lock().unwrap() = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !mock.reply.delay.is_zero() {
        tokio::time::sleep(mock.reply.delay).await;
    }

    (
        mock.reply.status,
        [(CONTENT_TYPE, mock.reply.content_type)],
        mock.reply.body,
    )
        .into_response()
}

// ============================================================================
// Test Fixture
// ============================================================================

/// Gate server wired to a mock upstream.
struct TestFixture {
    base_url: String,
    client: Client,
    upstream: MockUpstream,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with(MockReply::default(), |_| {}).await
    }

    async fn with(reply: MockReply, configure: impl FnOnce(&mut Config)) -> Self {
        let upstream = MockUpstream::start(reply).await;

        let mut config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            upstream_api_key: Some(ApiKey::new(TEST_KEY)),
            upstream_base_url: upstream.base_url(),
            metrics_port: 0,
            ..Config::default()
        };
        configure(&mut config);

        let base_url = Self::start_server(config).await;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .no_proxy()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            client,
            upstream,
        }
    }

    async fn start_server(config: Config) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = AppState::new(config).expect("Failed to build state");
        let app = build_router(state);

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        format!("http://{addr}")
    }

    fn rpc_url(&self) -> String {
        format!("{}/api/rpc", self.base_url)
    }

    async fn post_rpc(&self, body: &str) -> reqwest::Response {
        self.client
            .post(self.rpc_url())
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("RPC request failed")
    }
}

fn assert_json_headers(response: &reqwest::Response) {
    assert_eq!(
        response.headers()["content-type"],
        "application/json; charset=utf-8"
    );
    assert_eq!(
        response.headers()["cache-control"],
        "no-store, no-cache, must-revalidate"
    );
}

// ============================================================================
// Health & Preflight
// ============================================================================

#[tokio::test]
async fn test_get_returns_health_payload() {
    let fixture = TestFixture::new().await;

    let response = fixture.client.get(fixture.rpc_url()).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_json_headers(&response);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"ok": true, "service": "UluwatuSwap RPC proxy", "chain": "arbitrum-42161"})
    );
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_get_answers_even_when_rate_limited() {
    let fixture = TestFixture::with(MockReply::default(), |c| c.rate_limit_max_requests = 1).await;

    fixture.post_rpc("[]").await;
    assert_eq!(fixture.post_rpc("[]").await.status(), 429);

    let response = fixture.client.get(fixture.rpc_url()).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_options_is_204_preflight() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .request(reqwest::Method::OPTIONS, fixture.rpc_url())
        .header("origin", "https://uluwatu.vercel.app")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    let headers = response.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "https://uluwatu.vercel.app");
    assert_eq!(headers["access-control-allow-methods"], "POST, GET");
    assert_eq!(headers["access-control-allow-headers"], "content-type");
    assert_eq!(headers["vary"], "Origin");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_origin_not_echoed() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.rpc_url())
        .header("origin", "https://phish.example")
        .send()
        .await
        .unwrap();

    assert!(response.headers().get("access-control-allow-origin").is_none());
    assert_eq!(response.headers()["vary"], "Origin");
}

#[tokio::test]
async fn test_put_is_405_with_allow() {
    let fixture = TestFixture::new().await;

    let response = fixture.client.put(fixture.rpc_url()).send().await.unwrap();

    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "POST, GET, OPTIONS");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Method Not Allowed"}));
}

// ============================================================================
// Forwarding
// ============================================================================

#[tokio::test]
async fn test_chain_id_forwarded_and_relayed_verbatim() {
    let fixture = TestFixture::new().await;
    let request = r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#;

    let response = fixture.post_rpc(request).await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(
        response.headers()["cache-control"],
        "no-store, no-cache, must-revalidate"
    );
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"jsonrpc":"2.0","id":1,"result":"0xa4b1"}"#
    );

    assert_eq!(fixture.upstream.hits(), 1);
    assert_eq!(
        fixture.upstream.last_path.lock().unwrap().as_deref(),
        Some(format!("/v2/{TEST_KEY}").as_str())
    );
    assert_eq!(
        fixture.upstream.last_content_type.lock().unwrap().as_deref(),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_forwarded_body_is_exact_client_json() {
    let fixture = TestFixture::new().await;
    // Oversized integer id and unusual key order must survive untouched.
    let request = r#"[ {"id":18446744073709551617,"method":"eth_call","jsonrpc":"2.0","params":[{"to":"0x1"},"latest"]} ,{"jsonrpc":"2.0","method":"eth_blockNumber","id":2}]"#;

    let response = fixture.post_rpc(request).await;
    assert_eq!(response.status(), 200);

    let forwarded = fixture.upstream.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(&forwarded[..], request.as_bytes());
}

#[tokio::test]
async fn test_upstream_error_status_relayed() {
    let reply = MockReply {
        status: StatusCode::TOO_MANY_REQUESTS,
        content_type: "text/plain",
        body: "compute units exhausted",
        delay: Duration::ZERO,
    };
    let fixture = TestFixture::with(reply, |_| {}).await;

    let response = fixture
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_gasPrice","id":3}"#)
        .await;

    assert_eq!(response.status(), 429);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.text().await.unwrap(), "compute units exhausted");
}

#[tokio::test]
async fn test_extra_methods_are_forwarded() {
    let fixture = TestFixture::with(MockReply::default(), |c| {
        c.extra_allowed_methods = vec!["eth_sendRawTransaction".to_string()];
    })
    .await;

    let response = fixture
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_sendRawTransaction","params":["0x00"],"id":1}"#)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(fixture.upstream.hits(), 1);
}

// ============================================================================
// Rejections (upstream never contacted)
// ============================================================================

#[tokio::test]
async fn test_forbidden_method_is_403() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_sendRawTransaction","id":1}"#)
        .await;

    assert_eq!(response.status(), 403);
    assert_json_headers(&response);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"error": "RPC method not allowed: eth_sendRawTransaction"})
    );
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_forbidden_method_anywhere_in_batch_is_403() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_rpc(
            r#"[{"jsonrpc":"2.0","method":"eth_chainId","id":1},{"jsonrpc":"2.0","method":"eth_blockNumber","id":2},{"jsonrpc":"2.0","method":"debug_traceTransaction","id":3}]"#,
        )
        .await;

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "RPC method not allowed: debug_traceTransaction");
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_batch_item_missing_version_is_400() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_rpc(r#"[{"jsonrpc":"2.0","method":"eth_chainId"},{"method":"eth_chainId"}]"#)
        .await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Invalid JSON-RPC"}));
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_malformed_item_wins_over_forbidden_method() {
    let fixture = TestFixture::new().await;

    // Shape is checked for every item before any method is checked.
    let response = fixture
        .post_rpc(r#"[{"jsonrpc":"2.0","method":"eth_sendRawTransaction"},{"method":"eth_chainId"}]"#)
        .await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Invalid JSON-RPC"}));
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_empty_batch_and_garbage_are_400() {
    let fixture = TestFixture::new().await;

    for body in ["[]", "{not json", "\"eth_chainId\"", "null"] {
        let response = fixture.post_rpc(body).await;
        assert_eq!(response.status(), 400, "{body}");
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json, json!({"error": "Invalid JSON-RPC payload"}), "{body}");
    }
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_413_without_upstream_call() {
    let fixture = TestFixture::with(MockReply::default(), |c| c.max_body_bytes = 1_000).await;

    let padding = "0".repeat(2_000);
    let body = format!(r#"{{"jsonrpc":"2.0","method":"eth_call","params":["{padding}"],"id":1}}"#);
    let response = fixture.post_rpc(&body).await;

    assert_eq!(response.status(), 413);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json, json!({"error": "Request entity too large"}));
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_sixty_first_request_is_429() {
    let fixture = TestFixture::new().await;
    let request = r#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":1}"#;

    for i in 1..=60 {
        let response = fixture.post_rpc(request).await;
        assert_eq!(response.status(), 200, "request {i}");
    }

    let response = fixture.post_rpc(request).await;
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers()["x-ratelimit-limit"], "60");
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=10).contains(&retry_after));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Too many requests"}));

    assert_eq!(fixture.upstream.hits(), 60);
}

#[tokio::test]
async fn test_rate_limit_keyed_by_forwarded_for() {
    let fixture = TestFixture::with(MockReply::default(), |c| c.rate_limit_max_requests = 1).await;
    let request = r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#;

    let send = |ip: &'static str| {
        fixture
            .client
            .post(fixture.rpc_url())
            .header("x-forwarded-for", ip)
            .body(request)
            .send()
    };

    assert_eq!(send("203.0.113.10").await.unwrap().status(), 200);
    assert_eq!(send("203.0.113.10, 10.0.0.1").await.unwrap().status(), 429);
    assert_eq!(send("203.0.113.11").await.unwrap().status(), 200);
}

#[tokio::test]
async fn test_window_reset_admits_again() {
    let fixture = TestFixture::with(MockReply::default(), |c| {
        c.rate_limit_max_requests = 1;
        c.rate_limit_window = Duration::from_millis(200);
    })
    .await;
    let request = r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#;

    assert_eq!(fixture.post_rpc(request).await.status(), 200);
    assert_eq!(fixture.post_rpc(request).await.status(), 429);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fixture.post_rpc(request).await.status(), 200);
}

// ============================================================================
// Failure Translation
// ============================================================================

#[tokio::test]
async fn test_missing_key_is_500_without_leak() {
    let fixture = TestFixture::with(MockReply::default(), |c| c.upstream_api_key = None).await;

    let response = fixture
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#)
        .await;

    assert_eq!(response.status(), 500);
    let text = response.text().await.unwrap();
    assert_eq!(text, r#"{"error":"RPC not configured"}"#);
    assert!(!text.contains("v2"));
    assert_eq!(fixture.upstream.hits(), 0);
}

#[tokio::test]
async fn test_slow_upstream_is_504() {
    let reply = MockReply {
        delay: Duration::from_secs(3),
        ..MockReply::default()
    };
    let fixture = TestFixture::with(reply, |c| c.upstream_timeout = Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    let response = fixture
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#)
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.status(), 504);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Upstream timeout"}));
}

#[tokio::test]
async fn test_unreachable_upstream_is_502_without_leak() {
    // Bind then drop to get a port nothing listens on.
    let dead_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let fixture = TestFixture::with(MockReply::default(), |c| {
        c.upstream_base_url = format!("http://127.0.0.1:{dead_port}/v2");
    })
    .await;

    let response = fixture
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#)
        .await;

    assert_eq!(response.status(), 502);
    let text = response.text().await.unwrap();
    assert!(!text.contains(TEST_KEY));
    assert!(!text.contains("127.0.0.1"));
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body, json!({"error": "Upstream error", "details": "connection failed"}));
}
