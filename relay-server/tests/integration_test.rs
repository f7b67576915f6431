//! Integration tests for the GraphRAG relay.
//!
//! HTTP routes are driven through `tower::ServiceExt::oneshot`; the WebSocket
//! flow runs against a real listener on an ephemeral port.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use futures_util::{SinkExt, StreamExt};
use relay_common::config::Config;
use relay_server::{
    build_router,
    provider::{GenerationRequest, GenerationResponse, ModelProvider, ProviderError},
    routes::{HealthResponse, WebSocketInfoResponse},
    uploads::UploadResponse,
    AppState, ChildRecord, GraphError, GraphStore, RelayServices,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeGraph {
    calls: AtomicUsize,
    records: Vec<ChildRecord>,
}

#[async_trait]
impl GraphStore for FakeGraph {
    fn name(&self) -> &str {
        "fake"
    }

    async fn child_records(&self, _child_id: &str) -> Result<Vec<ChildRecord>, GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

#[derive(Default)]
struct EchoModel {
    contexts: Mutex<Vec<String>>,
}

#[async_trait]
impl ModelProvider for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo-1"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.contexts.lock().unwrap().push(request.context.clone());
        Ok(GenerationResponse {
            provider: "echo".into(),
            model: "echo-1".into(),
            content: format!("echo: {}", request.prompt),
            usage: Default::default(),
            finish_reason: Some("end_turn".into()),
            latency_ms: 0,
        })
    }
}

struct TestApp {
    state: AppState,
    graph: Arc<FakeGraph>,
    model: Arc<EchoModel>,
}

fn create_test_app(config: Config, records: Vec<ChildRecord>) -> TestApp {
    let graph = Arc::new(FakeGraph {
        records,
        ..Default::default()
    });
    let model = Arc::new(EchoModel::default());
    let services = RelayServices::new(graph.clone(), model.clone());
    TestApp {
        state: AppState::new(config, services),
        graph,
        model,
    }
}

fn record() -> ChildRecord {
    ChildRecord {
        child_name: "Meera".into(),
        homework_title: "Plant Cells".into(),
        homework_status: "Completed".into(),
        homework_difficulty: "Easy".into(),
        emotion_name: "Proud".into(),
        emotion_trigger: "won the quiz".into(),
        concept_name: "Cell Biology".into(),
        activity_name: "Science Club".into(),
    }
}

/// Helper to make a request and get JSON response.
async fn request_json<T: serde::de::DeserializeOwned>(
    app: &axum::Router,
    request: Request<Body>,
) -> (StatusCode, T) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: T = serde_json::from_slice(&body).unwrap();

    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

const BOUNDARY: &str = "relay-test-boundary";

fn multipart_request(uri: &str, field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Health Check Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_check() {
    let app = build_router(create_test_app(Config::default(), vec![]).state);

    for uri in ["/health", "/api/v1/health"] {
        let (status, body): (_, HealthResponse) = request_json(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.service, "graphrag-relay");
        assert!(!body.version.is_empty());
    }
}

#[tokio::test]
async fn test_websocket_info_development() {
    let mut config = Config::default();
    config.network.public_host = Some("relay.local".into());
    config.network.port = Some(9000);
    let app = build_router(create_test_app(config, vec![]).state);

    let (status, body): (_, WebSocketInfoResponse) =
        request_json(&app, get("/api/websocket")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "success");
    assert_eq!(body.websocket_url, "ws://relay.local:9000/ws/graphrag");
}

#[tokio::test]
async fn test_websocket_info_production_uses_wss() {
    let mut config = Config::default();
    config.network.environment = "production".into();
    let app = build_router(create_test_app(config, vec![]).state);

    let (_, body): (_, WebSocketInfoResponse) = request_json(&app, get("/api/websocket")).await;
    assert!(body.websocket_url.starts_with("wss://"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upload_echoes_metadata() {
    let app = build_router(create_test_app(Config::default(), vec![]).state);
    let request = multipart_request("/upload", "file", "drawing.png", b"\x89PNG\r\n\x1a\n1234");

    let (status, body): (_, UploadResponse) = request_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.filename.as_deref(), Some("drawing.png"));
    assert_eq!(body.content_type.as_deref(), Some("image/png"));
    assert_eq!(body.size, 12);
    assert!(body.base64.is_none());
}

#[tokio::test]
async fn test_upload_base64() {
    let app = build_router(create_test_app(Config::default(), vec![]).state);
    let request = multipart_request("/upload/base64", "file", "a.bin", b"abc");

    let (status, body): (_, UploadResponse) = request_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.size, 3);
    assert_eq!(body.base64.as_deref(), Some("YWJj"));
}

#[tokio::test]
async fn test_upload_missing_file_field() {
    let app = build_router(create_test_app(Config::default(), vec![]).state);
    let request = multipart_request("/upload", "attachment", "a.bin", b"abc");

    let (status, body): (_, Value) = request_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_file");
}

#[tokio::test]
async fn test_upload_too_large() {
    let mut config = Config::default();
    config.uploads.max_bytes = 8;
    let app = build_router(create_test_app(config, vec![]).state);
    let request = multipart_request("/upload", "file", "big.bin", &[0u8; 64]);

    let (status, body): (_, Value) = request_json(&app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "too_large");
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Tests
// ─────────────────────────────────────────────────────────────────────────────

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn spawn_server(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(app.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/graphrag"))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next JSON text frame, or `None` once the server closes.
async fn recv(client: &mut Client) -> Option<Value> {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame");
        match next {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_ws_cache_miss_then_hit() {
    let app = create_test_app(Config::default(), vec![record()]);
    let addr = spawn_server(&app).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"session_id": "s-1", "child_id": "child-7"})).await;
    assert_eq!(recv(&mut client).await, Some(json!({"msg": "Session s-1 connected"})));

    send(&mut client, json!({"prompt": "How was school?"})).await;
    assert_eq!(
        recv(&mut client).await,
        Some(json!({"response": "echo: How was school?", "source": "bedrock"}))
    );

    send(&mut client, json!({"prompt": "Anything else?"})).await;
    assert_eq!(
        recv(&mut client).await,
        Some(json!({"response": "echo: Anything else?", "source": "bedrock"}))
    );

    assert_eq!(app.graph.calls.load(Ordering::SeqCst), 1);
    let contexts = app.model.contexts.lock().unwrap().clone();
    assert_eq!(contexts, vec![record().describe(), record().describe()]);
}

#[tokio::test]
async fn test_ws_handshake_without_child_id_closes() {
    let app = create_test_app(Config::default(), vec![]);
    let addr = spawn_server(&app).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"session_id": "s-2"})).await;
    assert_eq!(
        recv(&mut client).await,
        Some(json!({"error": "Invalid session_id or child_id"}))
    );
    assert_eq!(recv(&mut client).await, None);
    assert!(app.state.services.registry.is_empty());
}

#[tokio::test]
async fn test_ws_bad_prompt_then_good_prompt() {
    let app = create_test_app(Config::default(), vec![]);
    let addr = spawn_server(&app).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"session_id": "s-3", "child_id": "c"})).await;
    recv(&mut client).await;

    send(&mut client, json!({"question": "wrong key"})).await;
    let error = recv(&mut client).await.unwrap();
    assert!(error["error"].as_str().unwrap().contains("Text prompt:"));

    send(&mut client, json!({"prompt": "right key"})).await;
    assert_eq!(
        recv(&mut client).await,
        Some(json!({"response": "echo: right key", "source": "bedrock"}))
    );
}

#[tokio::test]
async fn test_ws_no_data_context_passed_to_model() {
    let app = create_test_app(Config::default(), vec![]);
    let addr = spawn_server(&app).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"session_id": "s-4", "child_id": "ghost"})).await;
    recv(&mut client).await;
    send(&mut client, json!({"prompt": "Who is this?"})).await;
    recv(&mut client).await;

    let contexts = app.model.contexts.lock().unwrap().clone();
    assert_eq!(contexts, vec!["No data found for child ghost.".to_string()]);
}

#[tokio::test]
async fn test_ws_disconnect_releases_session() {
    let app = create_test_app(Config::default(), vec![]);
    let addr = spawn_server(&app).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"session_id": "s-5", "child_id": "c"})).await;
    recv(&mut client).await;
    send(&mut client, json!({"prompt": "hi"})).await;
    recv(&mut client).await;
    assert!(app.state.services.registry.is_live("s-5"));

    client.close(None).await.unwrap();
    drop(client);

    let services = &app.state.services;
    for _ in 0..50 {
        if !services.registry.is_live("s-5") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!services.registry.is_live("s-5"));
    assert!(services.cache.get("s-5").is_none());
}

#[tokio::test]
async fn test_ws_reconnect_replaces_binding() {
    let app = create_test_app(Config::default(), vec![]);
    let addr = spawn_server(&app).await;

    let mut first = connect(addr).await;
    send(&mut first, json!({"session_id": "shared", "child_id": "c"})).await;
    recv(&mut first).await;

    let mut second = connect(addr).await;
    send(&mut second, json!({"session_id": "shared", "child_id": "c"})).await;
    assert_eq!(recv(&mut second).await, Some(json!({"msg": "Session shared connected"})));

    // Replies follow the binding, so a prompt on the old socket lands on the new one.
    send(&mut first, json!({"prompt": "from the old tab"})).await;
    assert_eq!(
        recv(&mut second).await,
        Some(json!({"response": "echo: from the old tab", "source": "bedrock"}))
    );
}
