//! ---
//! vatio_section: "08-testing-qa"
//! vatio_subsection: "integration"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "HTTP round-trip tests against a live API server."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Spins the REST server up on an ephemeral port and exercises every route
//! over real HTTP, including the sensing node's blocking transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};

use vatio_api::{router, spawn_api_server, ApiServer, ApiState};
use vatio_common::AppConfig;
use vatio_meter::{HttpRelayEndpoint, HttpReportSink, RelayEndpoint, ReportSink};
use vatio_relay::RelayState;
use vatio_signal::Measurement;

fn spawn() -> (Arc<ApiState>, ApiServer) {
    let state = Arc::new(ApiState::new(&AppConfig::default()));
    let server = spawn_api_server(router(state.clone()), "127.0.0.1:0".parse().unwrap())
        .expect("server should bind an ephemeral port");
    (state, server)
}

#[tokio::test]
async fn readings_round_trip_over_http() {
    let (_state, server) = spawn();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/readings"))
        .json(&json!({ "current": 2.0, "vibration": 0.4, "equipment": "washer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reading: Value = response.json().await.unwrap();
    assert_eq!(reading["power_w"], 460.0);

    let rejected = client
        .post(format!("{base}/api/readings"))
        .json(&json!({ "current": -1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let listed: Vec<Value> = client
        .get(format!("{base}/api/readings?limit=5&equipment=washer"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["current_a"], 2.0);

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["readings_count"], 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn relay_slot_round_trips_over_http() {
    let (_state, server) = spawn();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    // Controller requests on.
    let ack: Value = client
        .post(format!("{base}/api/relay"))
        .json(&json!({ "command": "on" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack["command"], "on");
    assert_eq!(ack["status"], "off");

    // Node poll consumes the command.
    let poll: Value = client
        .get(format!("{base}/api/relay"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["command"], "on");

    // A second poll finds the slot empty.
    let poll: Value = client
        .get(format!("{base}/api/relay"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["command"], Value::Null);

    // Device reports executed state.
    client
        .post(format!("{base}/api/relay"))
        .json(&json!({ "status": "on" }))
        .send()
        .await
        .unwrap();
    let poll: Value = client
        .get(format!("{base}/api/relay"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["status"], "on");

    // Neither half present is a client error.
    let empty = client
        .post(format!("{base}/api/relay"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn active_session_put_is_a_max_merge() {
    let (_state, server) = spawn();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    let start = "2026-04-10T12:00:00Z";
    client
        .post(format!("{base}/api/session/active"))
        .json(&json!({ "start_time": start, "total_cost": 0.5 }))
        .send()
        .await
        .unwrap();

    // A lower unordered write cannot regress the cost.
    let merged: Value = client
        .put(format!("{base}/api/session/active"))
        .json(&json!({ "start_time": start, "total_cost": 0.2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(merged["total_cost"], 0.5);

    let merged: Value = client
        .put(format!("{base}/api/session/active"))
        .json(&json!({ "start_time": start, "total_cost": 0.9 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(merged["total_cost"], 0.9);

    let cleared: Value = client
        .delete(format!("{base}/api/session/active"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["cleared"], true);

    let none: Value = client
        .get(format!("{base}/api/session/active"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(none, Value::Null);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn completed_sessions_crud_over_http() {
    let (_state, server) = spawn();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    let stored: Value = client
        .post(format!("{base}/api/sessions"))
        .json(&json!({
            "start_time": "2026-04-10T12:00:00Z",
            "end_time": "2026-04-10T12:45:00Z",
            "equipment": "dryer",
            "total_cost": 0.31
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = stored["id"].as_str().unwrap().to_owned();

    let listed: Vec<Value> = client
        .get(format!("{base}/api/sessions?equipment=dryer"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["total_cost"], 0.31);

    let deleted = client
        .delete(format!("{base}/api/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let missing = client
        .delete(format!("{base}/api/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn price_schedule_is_deterministic_over_http() {
    let (_state, server) = spawn();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    let first: Value = client
        .get(format!("{base}/api/prices?date=2026-03-01"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = client
        .get(format!("{base}/api/prices?date=2026-03-01"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first["hours"].as_array().unwrap().len(), 24);
    assert_eq!(first["hours"][0]["period"], "valle");

    let bad = client
        .get(format!("{base}/api/prices?date=not-a-date"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn node_blocking_transport_talks_to_the_server() {
    let (state, server) = spawn();
    let base = format!("http://{}", server.addr());
    state.relay().request(RelayState::On, Utc::now());

    let handle = tokio::task::spawn_blocking(move || {
        let mut sink = HttpReportSink::new(&base, Duration::from_secs(5)).unwrap();
        sink.submit(&Measurement {
            timestamp: Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).unwrap(),
            current_a: 1.5,
            vibration: Some(0.2),
            equipment: Some("washer".into()),
        })
        .unwrap();

        let mut relay = HttpRelayEndpoint::new(&base, Duration::from_secs(5)).unwrap();
        let poll = relay.poll().unwrap();
        assert_eq!(poll.command, Some(RelayState::On));
        relay.report(RelayState::On).unwrap();
    });
    handle.await.unwrap();

    assert_eq!(state.latest_power_w(), Some(1.5 * 230.0));
    assert_eq!(state.relay().last_status(), RelayState::On);
    server.shutdown().await.unwrap();
}
