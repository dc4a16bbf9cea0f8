use resource_server::config::{ConfigMerger, ConfigSource, MemorySource};
use resource_server::{AppError, BounceRequest, Catalog, ServerController, ServerHandle, ServerState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn merger_with(initial: Value) -> Arc<ConfigMerger> {
    let source: Arc<dyn ConfigSource> = MemorySource::new(initial);
    let merger = Arc::new(ConfigMerger::new(vec![source]));
    merger.retrieve().await;
    merger
}

async fn start(merger: &Arc<ConfigMerger>) -> ServerHandle {
    ServerController::start(Arc::new(Catalog::new()), merger.clone()).await.unwrap()
}

fn local() -> Value {
    json!({"host": "127.0.0.1", "port": 0, "mode": "test"})
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn get_json(addr: SocketAddr, path: &str) -> (u16, Value) {
    let response = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn info_reports_the_active_configuration() {
    let merger = merger_with(local()).await;
    let handle = start(&merger).await;
    let addr = handle.local_addr().unwrap();

    let (status, info) = get_json(addr, "/info").await;
    assert_eq!(status, 200);
    assert_eq!(info["mode"], "test");
    assert_eq!(info["debug"], false);
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));

    let (status, _) = get_json(addr, "/health").await;
    assert_eq!(status, 200);
    handle.shutdown().await;
}

#[tokio::test]
async fn configuration_change_bounces_the_server() {
    let merger = merger_with(local()).await;
    let handle = start(&merger).await;
    let first = handle.local_addr().unwrap();

    let client = reqwest::Client::new();
    let created: Value = client
        .post(format!("http://{}/widgets", first))
        .json(&json!({"name": "gear"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["_id"].as_str().unwrap().to_string();

    assert!(merger.merge(json!({"debug": true})).is_some());
    eventually("bounce", || handle.stats().completed() == 1).await;
    let second = handle.local_addr().unwrap();

    let (_, info) = get_json(second, "/info").await;
    assert_eq!(info["debug"], true);
    // In-memory collections outlive the router generation.
    let (status, widget) = get_json(second, &format!("/widgets/{}", id)).await;
    assert_eq!(status, 200);
    assert_eq!(widget["name"], "gear");

    handle.shutdown().await;
}

#[tokio::test]
async fn initial_bind_failure_is_returned() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let merger = merger_with(json!({"host": "127.0.0.1", "port": port})).await;

    let err = ServerController::start(Arc::new(Catalog::new()), merger).await.err().unwrap();
    assert!(matches!(err, AppError::Bind { .. }));
}

#[tokio::test]
async fn failed_bounce_stops_the_server_until_the_next_change() {
    let merger = merger_with(local()).await;
    let handle = start(&merger).await;
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    merger.merge(json!({"port": port}));
    eventually("failed bounce", || handle.stats().failed() == 1).await;
    assert_eq!(handle.state(), ServerState::Stopped);
    assert_eq!(handle.local_addr(), None);

    merger.merge(json!({"port": 0}));
    eventually("recovery", || handle.stats().completed() == 1).await;
    let addr = handle.local_addr().unwrap();
    let (status, _) = get_json(addr, "/health").await;
    assert_eq!(status, 200);

    handle.shutdown().await;
}

#[tokio::test]
async fn bounce_requests_coalesce_into_the_pending_slot() {
    let merger = merger_with(local()).await;
    let handle = start(&merger).await;

    let mut queued = 0;
    let mut coalesced = 0;
    for _ in 0..20 {
        match handle.bounce() {
            BounceRequest::Queued => queued += 1,
            BounceRequest::Coalesced => coalesced += 1,
            BounceRequest::Closed => panic!("server closed"),
        }
    }
    assert_eq!(queued + coalesced, 20);
    assert!(queued >= 1);
    assert_eq!(handle.stats().coalesced(), coalesced);

    eventually("queued bounces to finish", || {
        handle.stats().completed() + handle.stats().failed() == queued
    })
    .await;
    assert_eq!(handle.stats().failed(), 0);
    assert!(matches!(handle.state(), ServerState::Listening(_)));
    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_and_stops() {
    let merger = merger_with(local()).await;
    let handle = start(&merger).await;
    let addr = handle.local_addr().unwrap();
    let state = handle.subscribe_state();

    handle.shutdown().await;
    assert_eq!(*state.borrow(), ServerState::Stopped);
    assert!(reqwest::get(format!("http://{}/health", addr)).await.is_err());
}

#[tokio::test]
async fn stopped_servers_leave_no_listener_behind() {
    let merger = merger_with(local()).await;
    for _ in 0..3 {
        let handle = start(&merger).await;
        assert_eq!(merger.listener_count(), 1);
        handle.shutdown().await;
    }
    assert_eq!(merger.listener_count(), 0);
    assert!(merger.merge(json!({"debug": true})).is_some());
    assert_eq!(merger.listener_count(), 0);
}
