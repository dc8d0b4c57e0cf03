#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use geminify_rs::config::{AppConfig, UpstreamConfig};
use geminify_rs::routing::dispatch::dispatch_request;
use geminify_rs::state::AppState;

/// One request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    pub fn status(status: StatusCode, value: serde_json::Value) -> Self {
        Self {
            status,
            ..Self::json(value)
        }
    }

    pub fn sse(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/event-stream",
            body: body.into(),
        }
    }
}

type Responder = dyn Fn(&Captured) -> Reply + Send + Sync;

/// Gemini stand-in listening on an ephemeral port.
pub struct MockUpstream {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Captured>>>,
    server: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start(responder: impl Fn(&Captured) -> Reply + Send + Sync + 'static) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let seen = Arc::clone(&requests);
        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: bytes::Bytes| {
                let seen = Arc::clone(&seen);
                let responder = Arc::clone(&responder);
                async move {
                    let captured = Captured {
                        method,
                        path: uri.path().to_string(),
                        query: uri.query().map(str::to_string),
                        headers,
                        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
                    };
                    let reply = responder(&captured);
                    seen.lock().expect("lock requests").push(captured);
                    Response::builder()
                        .status(reply.status)
                        .header("content-type", reply.content_type)
                        .body(Body::from(reply.body))
                        .expect("build mock response")
                }
            },
        )
        .layer(DefaultBodyLimit::disable());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            server,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn last_request(&self) -> Captured {
        self.requests()
            .pop()
            .expect("mock upstream received no request")
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn build_state(base_url: &str) -> Arc<AppState> {
    build_state_with(base_url, |_| {})
}

pub fn build_state_with(base_url: &str, adjust: impl FnOnce(&mut AppConfig)) -> Arc<AppState> {
    let mut config = AppConfig {
        upstream: UpstreamConfig {
            base_url: base_url.to_string(),
            ..UpstreamConfig::default()
        },
        ..AppConfig::default()
    };
    adjust(&mut config);
    Arc::new(AppState::new(config).expect("build app state"))
}

pub async fn send(
    state: Arc<AppState>,
    method: &str,
    path: &str,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("authorization", "Bearer test-key");
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).expect("serialize request"))
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("build request");
    dispatch_request(state, request).await.expect("dispatch")
}

pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("json payload")
}
