//! End-to-end API tests driven through the router in-process.

use std::collections::HashMap;
use std::path::Path;

use agentmonitor_server::{Config, build};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

fn test_config(dir: &Path, overrides: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    env.insert(
        "AGENTMONITOR_DB_PATH".to_string(),
        dir.join("agentmonitor.db").display().to_string(),
    );
    Config::resolve(&env, dir)
}

fn app(dir: &Path, overrides: &[(&str, &str)]) -> Router {
    let (_state, router) = build(test_config(dir, overrides)).unwrap();
    router
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn basic_ingest_and_visibility() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/events",
        json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "tool_use",
            "tokens_in": 100,
            "tokens_out": 50,
            "cost_usd": 0.01
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["received"], 1);
    assert_eq!(body["duplicates"], 0);
    assert_eq!(body["ids"], json!([1]));

    let (status, stats) = get(&router, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_events"], 1);
    assert_eq!(stats["total_tokens_in"], 100);
    assert_eq!(stats["total_tokens_out"], 50);
    assert!((stats["total_cost_usd"].as_f64().unwrap() - 0.01).abs() < 1e-9);
    assert_eq!(stats["active_sessions"], 1);
}

#[tokio::test]
async fn duplicate_event_id_is_success_not_error() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let payload = json!({
        "session_id": "s-1",
        "agent_type": "claude_code",
        "event_type": "tool_use",
        "event_id": "evt-1"
    });

    let (status, body) = send_json(&router, "POST", "/api/events", payload.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["duplicates"], 0);
    assert_eq!(body["received"], 1);

    let (status, body) = send_json(&router, "POST", "/api/events", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicates"], 1);
    assert_eq!(body["received"], 0);

    let (_, listed) = get(&router, "/api/events?session_id=s-1").await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_with_mixed_validity() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let valid = json!({
        "session_id": "s-1",
        "agent_type": "claude_code",
        "event_type": "tool_use",
        "event_id": "evt-1"
    });
    send_json(&router, "POST", "/api/events", valid.clone()).await;

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/events/batch",
        json!({
            "events": [
                {"session_id": "s-2", "agent_type": "codex", "event_type": "tool_use"},
                valid,
                {"session_id": "s-3", "agent_type": "codex"},
                {"session_id": "", "agent_type": "codex", "event_type": "tool_use"},
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["received"], 1);
    assert_eq!(body["duplicates"], 1);
    let rejected = body["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0]["index"], 2);
    assert_eq!(rejected[0]["errors"][0]["field"], "event_type");
    assert_eq!(rejected[1]["index"], 3);
    assert_eq!(rejected[1]["errors"][0]["field"], "session_id");
}

#[tokio::test]
async fn malformed_envelope_is_rejected() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let (status, body) = send_json(&router, "POST", "/api/events/batch", json!({"items": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn metadata_is_truncated_to_the_cap() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[("AGENTMONITOR_MAX_PAYLOAD_KB", "1")]);

    let blob: String = "😀".repeat(1200);
    let (status, _) = send_json(
        &router,
        "POST",
        "/api/events",
        json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "tool_use",
            "metadata": {"command": "pnpm test", "blob": blob}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listed) = get(&router, "/api/events?session_id=s-1").await;
    let event = &listed["events"][0];
    assert_eq!(event["payload_truncated"], true);

    let metadata = &event["metadata"];
    assert_eq!(metadata["_truncated"], true);
    assert_eq!(metadata["command"], "pnpm test");
    assert!(metadata["_original_bytes"].as_u64().unwrap() > 1024);
    assert!(serde_json::to_string(metadata).unwrap().len() <= 1024);
}

#[tokio::test]
async fn sse_is_bounded_and_self_healing() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[("AGENTMONITOR_MAX_SSE_CLIENTS", "1")]);

    let first = router
        .clone()
        .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(
        first
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut frames = first.into_body().into_data_stream();
    let chunk = tokio::time::timeout(std::time::Duration::from_secs(1), frames.next())
        .await
        .expect("first frame should arrive promptly")
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(frame.starts_with("data: "));
    assert!(frame.contains("\"type\":\"connected\""));

    let (status, body) = get(&router, "/api/stream").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "SSE client limit reached");
    assert_eq!(body["max_clients"], 1);

    // Disconnect frees the slot
    drop(frames);
    let (_, health) = get(&router, "/api/health").await;
    assert_eq!(health["sse_clients"], 0);

    let replacement = router
        .clone()
        .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(replacement.status(), StatusCode::OK);
}

#[tokio::test]
async fn subscribers_receive_events_in_ingest_order() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let stream_response = router
        .clone()
        .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut frames = stream_response.into_body().into_data_stream();

    for i in 0..3 {
        let (status, _) = send_json(
            &router,
            "POST",
            "/api/events",
            json!({
                "session_id": "s-order",
                "agent_type": "claude_code",
                "event_type": "tool_use",
                "tokens_in": i
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let mut collected = String::new();
    while !collected.contains("\"tokens_in\":2") {
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(2), frames.next())
            .await
            .expect("stream frames should arrive")
            .unwrap()
            .unwrap();
        collected.push_str(&String::from_utf8(chunk.to_vec()).unwrap());
    }

    let first = collected.find("\"tokens_in\":0").unwrap();
    let second = collected.find("\"tokens_in\":1").unwrap();
    let third = collected.find("\"tokens_in\":2").unwrap();
    assert!(first < second && second < third);
}

#[tokio::test]
async fn session_detail_and_transcript() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    send_json(
        &router,
        "POST",
        "/api/events",
        json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "user_prompt",
            "metadata": {"prompt": "run the tests"}
        }),
    )
    .await;
    send_json(
        &router,
        "POST",
        "/api/events",
        json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "tool_use",
            "tool_name": "Bash"
        }),
    )
    .await;

    let (status, detail) = get(&router, "/api/sessions/s-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["session"]["id"], "s-1");
    assert_eq!(detail["session"]["status"], "active");
    assert_eq!(detail["events"].as_array().unwrap().len(), 2);

    let (status, transcript) = get(&router, "/api/sessions/s-1/transcript").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transcript["session_id"], "s-1");
    let entries = transcript["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["role"], "user");
    assert_eq!(entries[1]["role"], "tool");

    let (status, body) = get(&router, "/api/sessions/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = get(&router, "/api/sessions/nope/transcript").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn filter_options_and_sessions_listing() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    send_json(
        &router,
        "POST",
        "/api/events",
        json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "tool_use",
            "tool_name": "Bash",
            "branch": "main",
            "project": "demo"
        }),
    )
    .await;

    let (status, options) = get(&router, "/api/filter-options").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["agent_types"], json!(["claude_code"]));
    assert_eq!(options["tool_names"], json!(["Bash"]));
    assert_eq!(options["branches"][0]["value"], "main");
    assert!(options["branches"][0]["last_seen"].is_string());

    let (status, sessions) = get(&router, "/api/sessions?status=active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sessions["total"], 1);
}

#[tokio::test]
async fn usage_monitor_returns_configured_kinds() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let (status, reports) = get(&router, "/api/stats/usage-monitor").await;
    assert_eq!(status, StatusCode::OK);
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 3);
    let claude = reports
        .iter()
        .find(|r| r["agent_type"] == "claude_code")
        .unwrap();
    assert_eq!(claude["session"]["windowHours"], 5);
    assert_eq!(claude["session"]["limitType"], "tokens");
    assert_eq!(claude["extended"]["windowHours"], 168);
}

#[tokio::test]
async fn cost_breakdown_shape() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    send_json(
        &router,
        "POST",
        "/api/events",
        json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "llm_response",
            "model": "claude-sonnet-4-5",
            "project": "demo",
            "tokens_in": 1000,
            "tokens_out": 200
        }),
    )
    .await;

    let (status, breakdown) = get(&router, "/api/stats/cost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(breakdown["timeline"].as_array().unwrap().len(), 1);
    assert_eq!(breakdown["by_project"][0]["project"], "demo");
    assert_eq!(breakdown["by_model"][0]["model"], "claude-sonnet-4-5");
}

#[tokio::test]
async fn otel_protobuf_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/otel/v1/logs")
        .header(header::CONTENT_TYPE, "application/x-protobuf")
        .body(Body::from(vec![0u8, 1, 2]))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn otel_json_logs_become_events() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/otel/v1/logs",
        json!({
            "resourceLogs": [{
                "resource": {"attributes": [
                    {"key": "service.name", "value": {"stringValue": "claude_code"}}
                ]},
                "scopeLogs": [{
                    "logRecords": [{
                        "attributes": [
                            {"key": "session.id", "value": {"stringValue": "s-otel"}},
                            {"key": "event.type", "value": {"stringValue": "tool_use"}}
                        ]
                    }]
                }]
            }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (_, listed) = get(&router, "/api/events?source=otel").await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["events"][0]["session_id"], "s-otel");

    let (status, body) = send_json(&router, "POST", "/api/otel/v1/traces", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn invalid_body_yields_json_error() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/events")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("this is not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
    assert_eq!(body["details"][0]["field"], "body");
}

#[tokio::test]
async fn health_reports_process_state() {
    let dir = TempDir::new().unwrap();
    let router = app(dir.path(), &[]);

    let (status, health) = get(&router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert!(health["uptime_s"].is_number());
    assert!(health["db_size_bytes"].as_u64().unwrap() > 0);
    assert_eq!(health["sse_clients"], 0);
}
