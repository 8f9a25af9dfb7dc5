//! Host status API integration tests

mod support;

use std::sync::atomic::Ordering;

use anyhow::anyhow;
use axum::http::StatusCode;
use serde_json::Value;

use support::{get, json_response, post_json, send, test_app, HOST_ID, SITE_NAME};

#[tokio::test]
async fn test_status_without_load_check() {
    let app = test_app().build();

    let (status, body) = json_response(&app.router, get("/admin/host/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Running");
    assert_eq!(body["id"], HOST_ID);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["versionDetails"]
        .as_str()
        .is_some_and(|d| d.starts_with(env!("CARGO_PKG_VERSION"))));
    assert!(body.get("load").is_none());
    assert!(body.get("errors").is_none());
    assert_eq!(app.host.load_checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_status_with_load_check() {
    let app = test_app().build();
    app.host.high_load.store(true, Ordering::SeqCst);

    let (status, body) = json_response(&app.router, get("/admin/host/status?checkLoad=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["load"]["isHigh"], true);
    assert_eq!(app.host.load_checks.load(Ordering::SeqCst), 1);

    let (_, body) = json_response(&app.router, get("/admin/host/status?checkLoad=0")).await;
    assert!(body.get("load").is_none());
    assert_eq!(app.host.load_checks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_status_reports_flattened_error() {
    let app = test_app().build();
    app.host
        .fail_with(anyhow!("port 8080 in use").context("function host failed to start"));

    let (status, body) = json_response(&app.router, get("/admin/host/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Error");
    assert_eq!(
        body["errors"],
        serde_json::json!(["function host failed to start: port 8080 in use"])
    );
}

#[tokio::test]
async fn test_status_emits_snapshot_event() {
    let app = test_app().build();

    let (_, body) = json_response(&app.router, get("/admin/host/status")).await;

    let events = app.emitter.traces_named("HostStatus");
    assert_eq!(events.len(), 1);
    let snapshot: Value = serde_json::from_str(&events[0].summary).expect("invalid json");
    assert_eq!(snapshot, body);
    let instance_id = app.host.instance.lock().as_ref().map(|i| i.id.clone());
    assert_eq!(events[0].host_instance_id, instance_id);
}

#[tokio::test]
async fn test_snapshot_event_uses_assigned_app_name() {
    let app = test_app().build();

    json_response(&app.router, get("/admin/host/status")).await;
    let context = serde_json::json!({
        "appName": "app1",
        "appSettings": { "WEBSITE_USE_ZIP": "https://packages.example.com/app1.zip" }
    });
    let (status, _) = send(&app.router, post_json("/admin/assign", &context)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    json_response(&app.router, get("/admin/host/status")).await;

    let events = app.emitter.traces_named("HostStatus");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].app_name, SITE_NAME);
    assert_eq!(events[1].app_name, "app1");
}
