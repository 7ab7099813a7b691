use crate::handlers;
use axum::Router;
use axum::body::Body;
use axum::middleware;
use axum::routing::get;
use axum::{Json, response::IntoResponse};
use http::header::CONTENT_TYPE;
use http::Request;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use wicket_core::{AccessLogRecord, HandlerError, WicketConfig};
use wicket_http::{
    DebugAccess, HandlerOptions, MakeWicketRequestId, ResponseWriter, StdService, handler_fn,
    protect_debug,
};
use wicket_observability::MetricsCollector;

type RouteFn = fn(&mut dyn ResponseWriter, &Request<Body>) -> Result<(), HandlerError>;

const ROUTES: &[(&str, RouteFn)] = &[
    ("/", handlers::index),
    ("/hello", handlers::hello),
    ("/fail", handlers::fail),
    ("/teapot", handlers::teapot),
    ("/quota", handlers::quota),
    ("/go", handlers::go),
    ("/panic", handlers::panic),
];

/// Build the application router: demo routes through the request wrapper,
/// plus metrics and guarded debug endpoints.
pub fn build_router(
    config: &WicketConfig,
    metrics: Arc<MetricsCollector>,
    debug: Arc<dyn DebugAccess>,
) -> anyhow::Result<Router> {
    let mut opts = HandlerOptions::from_config(&config.handler, &metrics);
    if metrics.is_enabled() {
        let m = Arc::clone(&metrics);
        opts.on_completion = Some(Arc::new(move |r: &AccessLogRecord| {
            m.observe_duration(r.seconds)
        }));
    }

    let mut router = Router::new();
    for (path, route) in ROUTES {
        router = router.route_service(path, StdService::new(handler_fn(*route), opts.clone()));
    }
    router = router.fallback_service(StdService::new(handler_fn(handlers::not_found), opts));

    if config.metrics.enabled {
        let path = &config.metrics.path;
        anyhow::ensure!(path.starts_with('/'), "metrics path must start with '/': {path:?}");
        let m = Arc::clone(&metrics);
        router = router.route(
            path,
            get(move || async move {
                ([(CONTENT_TYPE, "text/plain; version=0.0.4")], m.render())
            }),
        );
    }

    let metrics_enabled = metrics.is_enabled();
    let debug_routes = Router::new()
        .route(
            "/debug/vars",
            get(move || async move {
                Json(serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "pid": std::process::id(),
                    "metrics_enabled": metrics_enabled,
                }))
                .into_response()
            }),
        )
        .layer(middleware::from_fn_with_state(debug, protect_debug));

    Ok(router
        .merge(debug_routes)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeWicketRequestId)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::extract::ConnectInfo;
    use futures::FutureExt;
    use http::StatusCode;
    use http::header::{LOCATION, RETRY_AFTER};
    use std::net::SocketAddr;
    use std::panic::AssertUnwindSafe;
    use tower::ServiceExt;
    use wicket_http::DebugAccessPolicy;

    fn app() -> (Router, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new(true).unwrap());
        let router = build_router(
            &WicketConfig::default(),
            Arc::clone(&metrics),
            Arc::new(DebugAccessPolicy::default()),
        )
        .unwrap();
        (router, metrics)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // ── Demo routes ──────────────────────────────────────────────

    #[tokio::test]
    async fn hello_greets_by_name() {
        let (app, _) = app();
        let resp = app.oneshot(get_req("/hello?name=ada")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
        assert_eq!(body_string(resp).await, "hello, ada\n");
    }

    #[tokio::test]
    async fn teapot_sends_typed_error_with_request_id() {
        let (app, _) = app();
        let resp = app.oneshot(get_req("/teapot")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(resp.headers()[RETRY_AFTER], "120");
        let id = resp.headers()["x-request-id"].to_str().unwrap().to_owned();
        assert_eq!(body_string(resp).await, format!("I'm a teapot\n{id}\n"));
    }

    #[tokio::test]
    async fn fail_hides_the_cause() {
        let (app, _) = app();
        let resp = app.oneshot(get_req("/fail")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(resp).await.starts_with("internal server error\n"));
    }

    #[tokio::test]
    async fn quota_shows_visible_message_as_500() {
        let (app, _) = app();
        let resp = app.oneshot(get_req("/quota")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(resp).await.starts_with("daily quota exceeded"));
    }

    #[tokio::test]
    async fn go_only_redirects_locally() {
        let (app, _) = app();
        let resp = app.clone().oneshot(get_req("/go?next=%2Fhello")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], "/hello");

        let resp = app
            .oneshot(get_req("/go?next=https%3A%2F%2Fevil.test%2F"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn panic_route_unwinds_after_counting() {
        let (app, metrics) = app();
        let result = AssertUnwindSafe(app.oneshot(get_req("/panic")))
            .catch_unwind()
            .await;
        assert!(result.is_err());
        assert!(metrics.render().contains(r#"http_status_total{code="500"} 1"#));
    }

    #[tokio::test]
    async fn unknown_paths_go_through_the_wrapper() {
        let (app, _) = app();
        let resp = app.clone().oneshot(get_req("/wp-login.php")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().contains_key("x-request-id"));
        assert!(body_string(resp).await.starts_with("not found\n"));

        let text = body_string(app.oneshot(get_req("/metrics")).await.unwrap()).await;
        assert!(text.contains(r#"http_status_total{code="404"} 1"#), "{text}");
        assert!(text.contains(r#"http_status_family_total{family="4xx"} 1"#), "{text}");
        assert!(!text.contains("wp-login"), "{text}");
        assert!(!text.contains("http_bucket_started_total{"), "{text}");
    }

    // ── Metrics and debug ────────────────────────────────────────

    #[tokio::test]
    async fn metrics_reflect_served_requests() {
        let (app, _) = app();
        app.clone().oneshot(get_req("/hello")).await.unwrap();
        app.clone().oneshot(get_req("/teapot")).await.unwrap();

        let resp = app.oneshot(get_req("/metrics")).await.unwrap();
        let text = body_string(resp).await;
        assert!(text.contains(r#"http_status_family_total{family="2xx"} 1"#), "{text}");
        assert!(text.contains(r#"http_status_total{code="418"} 1"#), "{text}");
        assert!(text.contains(r#"http_bucket_finished_total{bucket="/hello"} 1"#), "{text}");
        assert!(!text.contains(r#"bucket="/teapot""#), "{text}");
        assert!(text.contains("http_request_duration_seconds_count 2"), "{text}");
    }

    #[tokio::test]
    async fn debug_vars_need_local_client() {
        let (app, _) = app();
        let resp = app.clone().oneshot(get_req("/debug/vars")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let mut req = get_req("/debug/vars");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 1234))));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("\"metrics_enabled\":true"));
    }

    #[test]
    fn relative_metrics_path_is_rejected() {
        let mut config = WicketConfig::default();
        config.metrics.path = "metrics".into();
        let metrics = Arc::new(MetricsCollector::new(true).unwrap());
        let err = build_router(&config, metrics, Arc::new(DebugAccessPolicy::default()))
            .unwrap_err();
        assert!(err.to_string().contains("metrics path"));
    }
}
