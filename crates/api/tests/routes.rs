use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use advisor::AdvisoryService;
use api::{app, AppState};
use common::{
    Advisor, AdvisoryConfig, EngineState, FeedEvent, MarketAnalysis, PricePoint, SessionConfig,
    Sentiment,
};
use engine::{Engine, EngineHandle};

const TOKEN: &str = "secret";

struct Fixed;

#[async_trait]
impl Advisor for Fixed {
    async fn analyze(&self, _window: &[PricePoint]) -> MarketAnalysis {
        MarketAnalysis {
            sentiment: Sentiment::Bearish,
            advice: "Lean PUT".into(),
            confidence: 40,
        }
    }
}

struct Harness {
    router: Router,
    engine: EngineHandle,
    feed: mpsc::Sender<FeedEvent>,
}

fn harness() -> Harness {
    let (feed, feed_rx) = mpsc::channel(256);
    let (engine, handle) = Engine::new(SessionConfig::default(), feed_rx);
    tokio::spawn(engine.run());

    let advisory = AdvisoryService::new(Arc::new(Fixed), handle.clone(), AdvisoryConfig::default());
    let router = app(AppState {
        engine: handle.clone(),
        advisory,
        dashboard_token: TOKEN.into(),
    });
    Harness {
        router,
        engine: handle,
        feed,
    }
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {TOKEN}"));
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn wait_state(engine: &EngineHandle, want: EngineState) {
    let mut rx = engine.watch_snapshot();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == want))
        .await
        .expect("timeout")
        .unwrap();
}

async fn feed_prices(h: &Harness, n: usize) {
    let mut rx = h.engine.watch_snapshot();
    for i in 0..n {
        h.feed
            .send(FeedEvent::Tick(PricePoint::now(100.0 + i as f64)))
            .await
            .unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.prices.len() == n))
        .await
        .expect("timeout")
        .unwrap();
}

#[tokio::test]
async fn healthz_needs_no_auth() {
    let h = harness();
    let req = Request::get("/healthz").body(Body::empty()).unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "stopped");
    assert_eq!(body["feed_connected"], false);
}

#[tokio::test]
async fn api_rejects_missing_or_wrong_token() {
    let h = harness();
    let req = Request::get("/api/session").body(Body::empty()).unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::get("/api/session")
        .header("Authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_summary_reports_defaults() {
    let h = harness();
    let (status, body) = call(&h.router, "GET", "/api/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["mode"], "binary");
    assert_eq!(body["cadence_value"], 60);
    assert_eq!(body["cadence_period_ms"], 30_000);
    assert_eq!(body["next_action"], "CALL");
    assert_eq!(body["stats"]["total_resolved"], 0);
    assert!(body["latest_price"].is_null());
}

#[tokio::test]
async fn start_and_stop_drive_engine_state() {
    let h = harness();
    let (status, body) = call(&h.router, "POST", "/api/control/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "start");
    wait_state(&h.engine, EngineState::Running).await;

    call(&h.router, "POST", "/api/control/stop", None).await;
    wait_state(&h.engine, EngineState::Stopped).await;
}

#[tokio::test]
async fn cadence_validation() {
    let h = harness();
    let (status, _) = call(&h.router, "POST", "/api/control/cadence", Some(json!({"value": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(
        &h.router,
        "POST",
        "/api/control/cadence",
        Some(json!({"value": 10_000_000_000_000u64})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("86400"));

    let (status, _) = call(&h.router, "POST", "/api/control/cadence", Some(json!({"value": 120}))).await;
    assert_eq!(status, StatusCode::OK);
    let mut rx = h.engine.watch_snapshot();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.cadence_value == 120))
        .await
        .expect("timeout")
        .unwrap();

    call(&h.router, "POST", "/api/control/start", None).await;
    wait_state(&h.engine, EngineState::Running).await;
    let (status, _) = call(&h.router, "POST", "/api/control/cadence", Some(json!({"value": 30}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn prices_and_decisions_lists() {
    let h = harness();
    feed_prices(&h, 3).await;

    let (_, body) = call(&h.router, "GET", "/api/prices", None).await;
    assert_eq!(body["prices"].as_array().unwrap().len(), 3);
    assert_eq!(body["latest"], 102.0);

    let (_, body) = call(&h.router, "GET", "/api/decisions?limit=5", None).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["limit"], 5);
    assert!(body["decisions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn advisory_stub_then_refresh() {
    let h = harness();
    let (_, body) = call(&h.router, "GET", "/api/advisory", None).await;
    assert_eq!(body["analysis"]["sentiment"], "neutral");
    assert_eq!(body["analysis"]["confidence"], 0);

    let (status, _) = call(&h.router, "POST", "/api/advisory/refresh", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    feed_prices(&h, 12).await;
    let (status, body) = call(&h.router, "POST", "/api/advisory/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analysis"]["sentiment"], "bearish");
    assert_eq!(body["points"], 12);

    let (_, body) = call(&h.router, "GET", "/api/advisory", None).await;
    assert_eq!(body["analysis"]["advice"], "Lean PUT");
}

#[tokio::test]
async fn ws_rejects_bad_token() {
    let h = harness();
    let req = Request::get("/ws/events?token=wrong")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_ne!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
}
