//! End-to-end tests of the HTTP routes
//!
//! Each test serves the router on an ephemeral port and drives it with
//! reqwest.

mod support;

use std::sync::Arc;

use serde_json::{json, Value};
use sessionvisor::http::{create_router, AppState};
use sessionvisor::Orchestrator;
use support::{orchestrator, settle, RecordingRestart, ScriptedLoop, Step};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

async fn spawn_app(orchestrator: Arc<Orchestrator>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(AppState::new(orchestrator));
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), server)
}

#[tokio::test]
async fn test_setup_state_validation() {
    let orch = orchestrator(Arc::new(ScriptedLoop::new([])), Arc::new(RecordingRestart::new()));
    let (base, server) = spawn_app(orch).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/setup_state", base))
        .json(&json!({ "api_key": "", "provider": "anthropic" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "API key required for anthropic provider");

    let res = client
        .post(format!("{}/setup_state", base))
        .json(&json!({ "api_key": "sk-test", "provider": "anthropic" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "State setup complete");

    let state: Value = client
        .get(format!("{}/state", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["auth_validated"], true);
    assert_eq!(state["provider"], "anthropic");
    assert_eq!(state["api_key"], "<redacted>");
    assert_eq!(state["in_sampling_loop"], false);

    server.abort();
}

#[tokio::test]
async fn test_chat_flow() {
    let sampling = Arc::new(ScriptedLoop::new([Step::Reply("Hello from the loop".to_string())]));
    let orch = orchestrator(sampling, Arc::new(RecordingRestart::new()));
    let (base, server) = spawn_app(orch.clone()).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/setup_state", base))
        .json(&json!({ "credential": "sk-test" }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hi", "system_prompt_suffix": "Be brief." }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Message received");
    assert_eq!(body["messages"], json!([{ "role": "user", "content": "hi" }]));

    settle(&orch).await;

    let state: Value = client
        .get(format!("{}/state", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["messages"].as_array().unwrap().len(), 2);
    assert_eq!(state["messages"][1]["content"], "Hello from the loop");
    assert_eq!(state["phase"], "idle");

    let ledger: Value = client
        .get(format!("{}/api_responses", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = ledger.as_object().unwrap();
    assert_eq!(entries.len(), 1);
    let (key, entry) = entries.iter().next().unwrap();
    assert_eq!(key.len(), "2024-01-01T00:00:00.000000".len());
    assert!(entry.get("request").is_some());
    assert!(entry.get("response").is_some());

    server.abort();
}

#[tokio::test]
async fn test_reset_conflicts_while_running() {
    let (sampling, gate) = ScriptedLoop::gated([Step::Reply("ok".to_string())]);
    let sampling = Arc::new(sampling);
    let restart = Arc::new(RecordingRestart::new());
    let orch = orchestrator(sampling.clone(), restart.clone());
    let (base, server) = spawn_app(orch.clone()).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    sampling.wait_for_requests(1).await;

    let res = client.post(format!("{}/reset", base)).send().await.unwrap();
    assert_eq!(res.status(), 409);
    let body: Value = res.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("running"));
    assert_eq!(restart.calls(), 0);

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "ok": true, "busy": true }));

    gate.add_permits(1);
    settle(&orch).await;

    let res = client.post(format!("{}/reset", base)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "State reset complete");
    assert_eq!(restart.calls(), 1);

    server.abort();
}

#[tokio::test]
async fn test_failed_restart_is_server_error() {
    let orch = orchestrator(
        Arc::new(ScriptedLoop::new([])),
        Arc::new(RecordingRestart::failing()),
    );
    let (base, server) = spawn_app(orch).await;

    let res = reqwest::Client::new()
        .post(format!("{}/reset", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().starts_with("Environment restart failed"));

    server.abort();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let orch = orchestrator(Arc::new(ScriptedLoop::new([])), Arc::new(RecordingRestart::new()));
    orch.submit_chat(sessionvisor::ChatSubmission::new("count me")).unwrap();
    settle(&orch).await;
    let (base, server) = spawn_app(orch).await;

    let res = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let body = res.text().await.unwrap();
    assert!(body.contains("sessionvisor_chat_submissions_total"));
    assert!(body.contains("sessionvisor_loop_runs_total"));

    server.abort();
}
