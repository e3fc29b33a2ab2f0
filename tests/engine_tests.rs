//! Failover-loop tests against scripted in-process backends.
//!
//! Each scripted backend is a real axum server on a loopback port that
//! replays a fixed response sequence and counts how often it was hit.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deepguard_rust_node::config::DetectorConfig;
use deepguard_rust_node::normalize::FallbackPolarity;
use deepguard_rust_node::verdict::VerdictEngine;

#[derive(Clone)]
struct ScriptedBackend {
    responses: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    hits: Arc<AtomicUsize>,
}

async fn scripted_handler(State(backend): State<ScriptedBackend>) -> (StatusCode, String) {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    let mut responses = backend.responses.lock().unwrap();
    if responses.len() > 1 {
        responses.pop_front().unwrap()
    } else {
        // Keep replaying the final scripted response
        responses
            .front()
            .cloned()
            .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "script exhausted".to_string()))
    }
}

async fn spawn_backend(script: Vec<(StatusCode, &str)>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend {
        responses: Arc::new(Mutex::new(
            script
                .into_iter()
                .map(|(status, body)| (status, body.to_string()))
                .collect(),
        )),
        hits: hits.clone(),
    };

    let app = Router::new()
        .route("/", post(scripted_handler))
        .with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/", addr), hits)
}

async fn spawn_hanging_backend() -> String {
    async fn hang() -> (StatusCode, String) {
        tokio::time::sleep(Duration::from_secs(30)).await;
        (StatusCode::OK, "[]".to_string())
    }

    let app = Router::new().route("/", post(hang));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/", addr)
}

fn engine_for(endpoints: Vec<String>) -> VerdictEngine {
    VerdictEngine::new(DetectorConfig {
        endpoints,
        api_token: "test-token".to_string(),
        call_timeout_secs: 5,
        // Zero ceiling keeps the loading retry instant in tests
        retry_wait_ceiling_secs: 0,
        request_timeout_secs: 10,
        fallback_polarity: FallbackPolarity::LabelHeuristic,
    })
    .unwrap()
}

const REAL_LEANING_BODY: &str = r#"[{"label":"real","score":0.95},{"label":"fake","score":0.05}]"#;
const LOADING_BODY: &str = r#"{"error":"Model is currently loading","estimated_time":20.0}"#;

#[tokio::test]
async fn test_failover_tries_endpoints_in_priority_order() {
    let (first, first_hits) = spawn_backend(vec![(StatusCode::UNAUTHORIZED, "")]).await;
    let (second, second_hits) = spawn_backend(vec![(StatusCode::OK, REAL_LEANING_BODY)]).await;

    let engine = engine_for(vec![first, second.clone()]);
    let verdict = engine.classify(b"img").await;

    assert!(!verdict.is_synthetic);
    assert_eq!(verdict.confidence, 0.95);
    assert_eq!(verdict.label, "Real");
    assert_eq!(verdict.source.as_deref(), Some(second.as_str()));
    assert_eq!(first_hits.load(Ordering::SeqCst), 1);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhaustion_returns_all_failed_verdict() {
    let (first, _) = spawn_backend(vec![(StatusCode::INTERNAL_SERVER_ERROR, "boom")]).await;
    let (second, _) = spawn_backend(vec![(StatusCode::BAD_GATEWAY, "down")]).await;

    let engine = engine_for(vec![first, second]);
    let verdict = engine.classify(b"img").await;

    assert!(!verdict.is_synthetic);
    assert_eq!(verdict.confidence, 0.0);
    assert_eq!(verdict.label, "All Models Failed");
    assert!(verdict.source.is_none());
    let message = verdict.message.expect("diagnostic message expected");
    assert!(message.contains("502") || message.contains("down"));
}

#[tokio::test]
async fn test_loading_then_failure_makes_exactly_two_calls_then_fails_over() {
    let (first, first_hits) = spawn_backend(vec![
        (StatusCode::SERVICE_UNAVAILABLE, LOADING_BODY),
        (StatusCode::INTERNAL_SERVER_ERROR, "still broken"),
    ])
    .await;
    let (second, second_hits) = spawn_backend(vec![(StatusCode::OK, REAL_LEANING_BODY)]).await;

    let engine = engine_for(vec![first, second.clone()]);
    let verdict = engine.classify(b"img").await;

    assert_eq!(first_hits.load(Ordering::SeqCst), 2);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    assert_eq!(verdict.source.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_loading_then_success_stays_on_same_endpoint() {
    let (first, first_hits) = spawn_backend(vec![
        (StatusCode::SERVICE_UNAVAILABLE, LOADING_BODY),
        (StatusCode::OK, REAL_LEANING_BODY),
    ])
    .await;

    let engine = engine_for(vec![first.clone()]);
    let verdict = engine.classify(b"img").await;

    assert_eq!(first_hits.load(Ordering::SeqCst), 2);
    assert_eq!(verdict.source.as_deref(), Some(first.as_str()));
    assert_eq!(verdict.confidence, 0.95);
}

#[tokio::test]
async fn test_still_loading_after_retry_fails_over() {
    let (first, first_hits) =
        spawn_backend(vec![(StatusCode::SERVICE_UNAVAILABLE, LOADING_BODY)]).await;
    let (second, _) = spawn_backend(vec![(StatusCode::OK, REAL_LEANING_BODY)]).await;

    let engine = engine_for(vec![first, second.clone()]);
    let verdict = engine.classify(b"img").await;

    // One call plus exactly one retry, never more
    assert_eq!(first_hits.load(Ordering::SeqCst), 2);
    assert_eq!(verdict.source.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_structural_success_never_triggers_failover() {
    // Unrecognized labels still count as success for failover purposes
    let (first, _) = spawn_backend(vec![(
        StatusCode::OK,
        r#"[{"label":"xyz","score":0.7},{"label":"qrs","score":0.3}]"#,
    )])
    .await;
    let (second, second_hits) = spawn_backend(vec![(StatusCode::OK, REAL_LEANING_BODY)]).await;

    let engine = engine_for(vec![first.clone(), second]);
    let verdict = engine.classify(b"img").await;

    assert_eq!(second_hits.load(Ordering::SeqCst), 0);
    assert_eq!(verdict.source.as_deref(), Some(first.as_str()));
    assert_eq!(verdict.label, "xyz");
    assert_eq!(verdict.confidence, 0.7);
    assert!(verdict.message.is_some());
}

#[tokio::test]
async fn test_empty_prediction_list_returns_low_confidence_verdict() {
    let (first, _) = spawn_backend(vec![(StatusCode::OK, "[]")]).await;
    let (second, second_hits) = spawn_backend(vec![(StatusCode::OK, REAL_LEANING_BODY)]).await;

    let engine = engine_for(vec![first, second]);
    let verdict = engine.classify(b"img").await;

    assert_eq!(second_hits.load(Ordering::SeqCst), 0);
    assert!(!verdict.is_synthetic);
    assert_eq!(verdict.confidence, 0.0);
    assert_eq!(verdict.label, "Real");
}

#[tokio::test]
async fn test_malformed_success_body_fails_over() {
    let (first, _) = spawn_backend(vec![(StatusCode::OK, "<html>not json</html>")]).await;
    let (second, _) = spawn_backend(vec![(StatusCode::OK, REAL_LEANING_BODY)]).await;

    let engine = engine_for(vec![first, second.clone()]);
    let verdict = engine.classify(b"img").await;

    assert_eq!(verdict.source.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_nested_response_body_is_unwrapped() {
    let (first, _) = spawn_backend(vec![(
        StatusCode::OK,
        r#"[[{"label":"fake","score":0.88},{"label":"real","score":0.12}]]"#,
    )])
    .await;

    let engine = engine_for(vec![first]);
    let verdict = engine.classify(b"img").await;

    assert!(verdict.is_synthetic);
    assert_eq!(verdict.label, "AI");
    assert_eq!(verdict.confidence, 0.88);
    assert_eq!(verdict.synthetic_score, 0.88);
    assert_eq!(verdict.authentic_score, 0.12);
}

#[tokio::test]
async fn test_request_timeout_yields_terminal_verdict() {
    let slow = spawn_hanging_backend().await;

    let engine = VerdictEngine::new(DetectorConfig {
        endpoints: vec![slow],
        api_token: "test-token".to_string(),
        call_timeout_secs: 30,
        retry_wait_ceiling_secs: 0,
        request_timeout_secs: 1,
        fallback_polarity: FallbackPolarity::LabelHeuristic,
    })
    .unwrap();

    let verdict = engine.classify(b"img").await;

    assert_eq!(verdict.label, "All Models Failed");
    assert_eq!(verdict.confidence, 0.0);
    assert!(verdict.message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_engine_rejects_missing_credential() {
    let result = VerdictEngine::new(DetectorConfig {
        endpoints: vec!["http://127.0.0.1:1/".to_string()],
        api_token: "  ".to_string(),
        call_timeout_secs: 5,
        retry_wait_ceiling_secs: 0,
        request_timeout_secs: 10,
        fallback_polarity: FallbackPolarity::LabelHeuristic,
    });

    assert!(matches!(
        result,
        Err(deepguard_rust_node::DetectError::Config(_))
    ));
}

#[tokio::test]
async fn test_engine_rejects_empty_endpoint_list() {
    let result = VerdictEngine::new(DetectorConfig {
        endpoints: vec![],
        api_token: "test-token".to_string(),
        call_timeout_secs: 5,
        retry_wait_ceiling_secs: 0,
        request_timeout_secs: 10,
        fallback_polarity: FallbackPolarity::LabelHeuristic,
    });

    assert!(matches!(
        result,
        Err(deepguard_rust_node::DetectError::Config(_))
    ));
}
