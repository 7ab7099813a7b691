//! Tower/axum level tests: the wrapper mounted in a router, behind the
//! request id layer and the debug access guard.
//!
//! Uses `tower::ServiceExt::oneshot` so no TCP port is bound.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::response::Response;
use futures::FutureExt;
use http::header::{CONTENT_SECURITY_POLICY, CONTENT_TYPE, X_FRAME_OPTIONS};
use http::{HeaderValue, Request, StatusCode};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use wicket_core::{AbortHandler, AccessLogRecord, HandlerError, HttpError};
use wicket_http::{
    DebugAccess, DebugAccessPolicy, HandlerOptions, MakeWicketRequestId, ResponseWriter,
    ReturnHandler, StdService, browser_headers_layer, handler_fn, protect_debug,
};
use wicket_observability::LogSink;

// ── Helpers ───────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink(Mutex<Vec<AccessLogRecord>>);

impl LogSink for RecordingSink {
    fn access(&self, record: &AccessLogRecord) {
        self.0.lock().unwrap().push(record.clone());
    }

    fn unexpected(&self, _message: &str) {}
}

fn options(sink: Arc<RecordingSink>) -> HandlerOptions {
    HandlerOptions {
        log_sink: Some(sink),
        ..HandlerOptions::default()
    }
}

fn demo_service(sink: Arc<RecordingSink>) -> StdService<impl ReturnHandler> {
    StdService::new(
        handler_fn(|w, req| match req.uri().path() {
            "/hello" => {
                w.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                w.write(b"hello\n")?;
                Ok(())
            }
            "/teapot" => Err(HttpError::new(418, "short and stout").into()),
            "/abort" => Err(AbortHandler.into()),
            "/boom" => panic!("boom"),
            _ => Err(HandlerError::internal("no route")),
        }),
        options(sink),
    )
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ── StdService ────────────────────────────────────────────────

#[tokio::test]
async fn service_sends_handler_response() {
    let sink = Arc::new(RecordingSink::default());
    let resp = demo_service(sink.clone()).oneshot(get("/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain");
    assert_eq!(body_string(resp).await, "hello\n");
    assert_eq!(sink.0.lock().unwrap()[0].code, 200);
}

#[tokio::test]
async fn request_id_layer_feeds_log_and_error_body() {
    let sink = Arc::new(RecordingSink::default());
    let svc = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeWicketRequestId))
        .layer(PropagateRequestIdLayer::x_request_id())
        .service(demo_service(sink.clone()));

    let resp = svc.oneshot(get("/teapot")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    let id = resp.headers()["x-request-id"].to_str().unwrap().to_owned();
    assert!(id.starts_with("REQ-"), "id = {id}");
    assert_eq!(body_string(resp).await, format!("short and stout\n{id}\n"));

    let records = sink.0.lock().unwrap();
    assert_eq!(records[0].request_id, id);
    assert_eq!(records[0].code, 418);
}

#[tokio::test]
async fn aborted_request_panics_with_sentinel() {
    let sink = Arc::new(RecordingSink::default());
    let result = AssertUnwindSafe(demo_service(sink.clone()).oneshot(get("/abort")))
        .catch_unwind()
        .await;
    let payload = result.expect_err("abort must unwind");
    assert!(payload.is::<AbortHandler>());
    assert_eq!(sink.0.lock().unwrap()[0].code, 500);
}

#[tokio::test]
async fn handler_panic_resumes_original_payload() {
    let sink = Arc::new(RecordingSink::default());
    let result = AssertUnwindSafe(demo_service(sink.clone()).oneshot(get("/boom")))
        .catch_unwind()
        .await;
    let payload = result.expect_err("panic must unwind");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    let records = sink.0.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, 500);
    assert!(records[0].err.starts_with("panic: boom"), "{}", records[0].err);
}

/// Waits for the client unless it disconnects first.
struct WaitsForClient;

#[async_trait::async_trait]
impl ReturnHandler for WaitsForClient {
    async fn serve_http(
        &self,
        w: &mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> Result<(), HandlerError> {
        let token = req
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .ok_or_else(|| HandlerError::internal("no cancellation token"))?;
        tokio::select! {
            _ = token.cancelled() => Err(HandlerError::internal("client went away")),
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                w.write(b"done\n")?;
                Ok(())
            }
        }
    }
}

#[tokio::test]
async fn client_disconnect_is_logged_as_499() {
    let sink = Arc::new(RecordingSink::default());
    let svc = StdService::new(WaitsForClient, options(sink.clone()));

    let res = tokio::time::timeout(Duration::from_millis(50), svc.oneshot(get("/slow"))).await;
    assert!(res.is_err(), "response should not be ready yet");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let records = sink.0.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, 499);
    assert_eq!(records[0].err, "context canceled");
}

#[tokio::test]
async fn service_mounts_in_axum_router() {
    let sink = Arc::new(RecordingSink::default());
    let app = Router::new()
        .route_service("/teapot", demo_service(sink.clone()))
        .route_service("/broken", demo_service(sink.clone()))
        .layer(axum::middleware::from_fn(browser_headers_layer));

    let resp = app.clone().oneshot(get("/teapot")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(resp.headers()[X_FRAME_OPTIONS], "DENY");
    assert!(resp.headers().contains_key(CONTENT_SECURITY_POLICY));

    let resp = app.oneshot(get("/broken")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(resp).await, "internal server error\n");
    assert_eq!(sink.0.lock().unwrap()[1].err, "no route");
}

// ── Debug guard ───────────────────────────────────────────────

fn debug_app() -> Router {
    let policy: Arc<dyn DebugAccess> = Arc::new(DebugAccessPolicy::new(vec![], Some("k".into())));
    Router::new()
        .route("/debug/vars", axum::routing::get(|| async { "{}" }))
        .layer(axum::middleware::from_fn_with_state(policy, protect_debug))
}

fn from_peer(mut req: Request<Body>, ip: [u8; 4]) -> Request<Body> {
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
    req
}

#[tokio::test]
async fn debug_guard_allows_loopback() {
    let resp = debug_app()
        .oneshot(from_peer(get("/debug/vars"), [127, 0, 0, 1]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn debug_guard_rejects_remote_without_key() {
    let resp = debug_app()
        .oneshot(from_peer(get("/debug/vars"), [203, 0, 113, 9]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_string(resp).await, "debug access denied\n");

    let resp = debug_app()
        .oneshot(from_peer(get("/debug/vars?debugkey=k"), [203, 0, 113, 9]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
