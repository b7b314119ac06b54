//! HTTP surface integration tests (axum-test).
//!
//! Covers the graceful-degradation contract: search and timeline endpoints
//! never 500 merely because the vector index is down.

mod common;

use axum_test::TestServer;
use serde_json::{json, Value};

use recall::AppState;

fn server(state: AppState) -> TestServer {
    let app = recall::api::routes().with_state(state);
    TestServer::new(app).expect("test server")
}

#[tokio::test]
async fn health_and_status() {
    let server = server(common::test_state().await);

    let response = server.get("/health").await;
    response.assert_status_ok();

    let response = server.get("/status").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["vector_index"]["available"], json!(true));
}

#[tokio::test]
async fn search_degrades_gracefully_without_vector_index() {
    let server = server(common::degraded_state().await);

    // Ingest still works
    let response = server
        .post("/observations")
        .json(&json!({
            "session_id": "s-1",
            "project": "demo",
            "kind": "bugfix",
            "title": "Fixed auth token expiration",
        }))
        .await;
    response.assert_status_ok();

    // Semantic search: HTTP success with an empty result, not a 5xx
    let response = server.get("/search").add_query_param("query", "auth").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], json!(0));

    // Filter-only search still returns correct rows from the store
    let response = server.get("/search").add_query_param("kind", "bugfix").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], json!(1));

    // Date-range filter-only search works too
    let response = server
        .get("/search")
        .add_query_param("date_start", "2020-01-01T00:00:00Z")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], json!(1));
}

#[tokio::test]
async fn keyword_mode_serves_from_the_text_index() {
    let server = server(common::degraded_state().await);

    server
        .post("/observations")
        .json(&json!({
            "session_id": "s-1",
            "project": "demo",
            "kind": "bugfix",
            "title": "Fixed auth token expiration",
        }))
        .await
        .assert_status_ok();

    let response = server
        .get("/search")
        .add_query_param("mode", "keyword")
        .add_query_param("query", "auth token")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], json!(1));
}

#[tokio::test]
async fn ingest_then_search_over_http() {
    let server = server(common::test_state().await);

    let response = server
        .post("/observations")
        .json(&json!({
            "session_id": "s-1",
            "project": "demo",
            "kind": "bugfix",
            "title": "Fixed auth token expiration",
            "facts": ["the refresh path compared UTC to local time"],
        }))
        .await;
    response.assert_status_ok();
    let stored: Value = response.json();
    let id = stored["id"].as_i64().unwrap();

    // Deterministic stand-in for waiting out the detached sync
    server.post("/admin/backfill").await.assert_status_ok();

    let response = server
        .get("/search")
        .add_query_param("query", "auth token")
        .add_query_param("type", "observations")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    let ids: Vec<i64> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["id"].as_i64())
        .collect();
    assert!(ids.contains(&id), "expected {} in {:?}", id, ids);
}

#[tokio::test]
async fn index_format_returns_compact_entries() {
    let server = server(common::degraded_state().await);

    server
        .post("/observations")
        .json(&json!({
            "session_id": "s-1",
            "kind": "feature",
            "title": "Added exporter",
        }))
        .await
        .assert_status_ok();

    let response = server
        .get("/search")
        .add_query_param("format", "index")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let first = &body["results"][0];
    assert_eq!(first["type"], json!("observation"));
    assert_eq!(first["title"], json!("Added exporter"));
    assert!(first["date"].is_string());
}

#[tokio::test]
async fn record_hydration_and_404s() {
    let server = server(common::test_state().await);

    let response = server
        .post("/observations")
        .json(&json!({
            "session_id": "s-1",
            "kind": "discovery",
            "title": "Found it",
        }))
        .await;
    let id = response.json::<Value>()["id"].as_i64().unwrap();

    let response = server.get(&format!("/observation/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["title"], json!("Found it"));

    let response = server.get("/observation/99999").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));

    let response = server.get("/prompt/99999").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let server = server(common::test_state().await);

    let response = server
        .post("/sessions/init")
        .json(&json!({
            "session_id": "s-http",
            "project": "demo",
            "request": "do the thing",
        }))
        .await;
    response.assert_status_ok();
    let first_id = response.json::<Value>()["id"].as_i64().unwrap();

    // Idempotent re-init
    let response = server
        .post("/sessions/init")
        .json(&json!({ "session_id": "s-http" }))
        .await;
    assert_eq!(response.json::<Value>()["id"].as_i64().unwrap(), first_id);

    // Complete transitions once
    let response = server
        .post("/sessions/s-http/complete")
        .json(&json!({ "status": "completed" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["transitioned"], json!(true));

    let response = server
        .post("/sessions/s-http/complete")
        .json(&json!({ "status": "failed" }))
        .await;
    assert_eq!(response.json::<Value>()["transitioned"], json!(false));

    // Unknown session
    let response = server
        .post("/sessions/s-missing/complete")
        .json(&json!({ "status": "completed" }))
        .await;
    response.assert_status_not_found();

    // Invalid status
    let response = server
        .post("/sessions/s-http/complete")
        .json(&json!({ "status": "active" }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn invalid_observation_kind_is_a_400() {
    let server = server(common::test_state().await);

    let response = server
        .post("/observations")
        .json(&json!({
            "session_id": "s-1",
            "kind": "experiment",
            "title": "Nope",
        }))
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!("CONSTRAINT_ERROR"));
}

#[tokio::test]
async fn timeline_endpoint_validation_and_happy_path() {
    let server = server(common::test_state().await);

    // Anchor and query together is an error
    let response = server
        .get("/timeline")
        .add_query_param("anchor", "1")
        .add_query_param("query", "x")
        .await;
    response.assert_status_bad_request();

    // Neither is an error too
    let response = server.get("/timeline").await;
    response.assert_status_bad_request();

    // Unparseable anchor
    let response = server
        .get("/timeline")
        .add_query_param("anchor", "banana")
        .await;
    response.assert_status_bad_request();

    // Seed a few observations through ingestion
    let mut anchor_id = 0;
    for i in 0..3 {
        let response = server
            .post("/observations")
            .json(&json!({
                "session_id": "s-1",
                "kind": "change",
                "title": format!("obs {}", i),
            }))
            .await;
        anchor_id = response.json::<Value>()["id"].as_i64().unwrap();
    }

    let response = server
        .get("/timeline")
        .add_query_param("anchor", anchor_id.to_string())
        .add_query_param("depth_before", "1")
        .add_query_param("depth_after", "1")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert_eq!(body["anchor_id"].as_i64().unwrap(), anchor_id);
}

#[tokio::test]
async fn prompts_over_http_assign_sequence_numbers() {
    let server = server(common::test_state().await);

    let response = server
        .post("/prompts")
        .json(&json!({ "session_id": "s-1", "text": "first prompt" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["prompt_number"], json!(1));

    let response = server
        .post("/prompts")
        .json(&json!({ "session_id": "s-1", "text": "second prompt" }))
        .await;
    assert_eq!(response.json::<Value>()["prompt_number"], json!(2));

    // Empty text rejected
    let response = server
        .post("/prompts")
        .json(&json!({ "session_id": "s-1", "text": "   " }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn summaries_over_http() {
    let server = server(common::test_state().await);

    for n in 1..=2 {
        let response = server
            .post("/summaries")
            .json(&json!({
                "session_id": "s-1",
                "project": "demo",
                "prompt_number": n,
                "request": format!("cycle {}", n),
                "learned": "something",
            }))
            .await;
        response.assert_status_ok();
    }

    let response = server
        .get("/search")
        .add_query_param("type", "sessions")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], json!(2));
}
