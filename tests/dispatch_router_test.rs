mod common;

use common::{admin, build_orchestrator, guest, test_config};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use toolrelay::error::{ErrorKind, TransportError};
use toolrelay::mcp::ConnectionStatus;
use toolrelay::routing::ResultCache;

#[tokio::test]
async fn test_unknown_function_is_not_found() {
    let (orchestrator, _factory) = build_orchestrator(None).await;
    orchestrator.start().await;

    let result = orchestrator
        .execute_qualified(&admin(), "ghost__doit", json!({"x": 1}), true)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(result.error.as_ref().unwrap().kind.as_str(), "not found");

    let result = orchestrator
        .execute_qualified(&admin(), "data__nothing", json!({}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));

    let result = orchestrator.execute_qualified(&admin(), "nounderscores", json!({}), true).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));

    let summary = orchestrator.router().metrics().default_summary().await;
    assert_eq!(summary.not_found_calls, 3);
    assert_eq!(summary.total_calls, 0);
}

#[tokio::test]
async fn test_failed_listing_is_retried_on_first_call() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    let data = factory.backend("data");
    data.push_list_failure(TransportError::Protocol("listing interrupted".to_string()));
    orchestrator.start().await;

    // connected, but without a catalog
    let conn = orchestrator.supervisor().get("data").await.unwrap();
    assert_eq!(conn.state().await.status, ConnectionStatus::Connected);
    assert!(conn.functions().await.is_none());
    assert_eq!(data.lists(), 1);

    let result = orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(data.lists(), 2);
    assert_eq!(data.calls(), 1);

    let result = orchestrator
        .execute_qualified(&admin(), "data__listTables", json!({}), true)
        .await;
    assert!(result.success);
    assert_eq!(data.lists(), 2);

    // a successful listing without the function is a real miss
    let result = orchestrator
        .execute_qualified(&admin(), "data__nothing", json!({}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(data.lists(), 2);
}

#[tokio::test]
async fn test_listing_failure_on_call_is_unavailable() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    let data = factory.backend("data");
    data.push_list_failure(TransportError::Protocol("listing interrupted".to_string()));
    data.push_list_failure(TransportError::Protocol("listing interrupted".to_string()));
    orchestrator.start().await;

    let result = orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Unavailable));
    assert_eq!(data.calls(), 0);

    let result = orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    assert!(result.success);
    assert_eq!(data.lists(), 3);
}

#[tokio::test]
async fn test_guest_is_denied_without_touching_backend() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    let data = factory.backend("data");

    // before any connection exists
    let result = orchestrator
        .execute_qualified(&guest(), "data__listTables", json!({}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::PermissionDenied));
    assert_eq!(data.connects(), 0);

    orchestrator.start().await;
    let connects = data.connects();
    let result = orchestrator
        .execute_qualified(&guest(), "data__listTables", json!({}), true)
        .await;
    assert!(!result.success);
    assert_eq!(result.error.as_ref().unwrap().kind.as_str(), "permission denied");
    assert_eq!(data.calls(), 0);
    assert_eq!(data.connects(), connects);
    assert_eq!(orchestrator.router().cache().stats().await.size, 0);

    let summary = orchestrator.router().metrics().default_summary().await;
    assert_eq!(summary.denied_calls, 2);
}

#[tokio::test]
async fn test_repeated_read_is_served_from_cache() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");
    data.set_response("listProjects", json!({"content": [{"type": "text", "text": "alpha, beta"}]}));

    let first = orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    assert!(first.success);
    assert!(!first.cached);

    let second = orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    assert!(second.success);
    assert!(second.cached);
    assert_eq!(second.data, first.data);
    assert_eq!(data.calls(), 1);

    let metrics = orchestrator
        .router()
        .metrics()
        .function_metrics("data", "listProjects")
        .await
        .unwrap();
    assert_eq!(metrics.total_calls, 2);
    assert_eq!(metrics.cache_hits, 1);

    // bypassing the cache always reaches the backend
    let third = orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), false)
        .await;
    assert!(!third.cached);
    assert_eq!(data.calls(), 2);
}

#[tokio::test]
async fn test_destructive_query_is_rejected_before_dispatch() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "DROP TABLE users"}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ValidationError));
    assert_eq!(factory.backend("data").calls(), 0);

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "select 1; drop table users"}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ValidationError));

    // missing required parameter
    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ValidationError));
    assert_eq!(factory.backend("data").calls(), 0);

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "SELECT * FROM users"}), true)
        .await;
    assert!(result.success);
}

#[tokio::test]
async fn test_failed_health_checks_then_single_reconnect() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");
    let supervisor = orchestrator.supervisor();

    data.fail_ping.store(true, Ordering::SeqCst);
    for _ in 0..2 {
        assert!(!supervisor.health_check("data").await);
        let state = supervisor.get("data").await.unwrap().state().await;
        assert_eq!(state.status, ConnectionStatus::Connected);
    }
    assert!(!supervisor.health_check("data").await);
    let state = supervisor.get("data").await.unwrap().state().await;
    assert_eq!(state.status, ConnectionStatus::Error);
    assert_eq!(state.consecutive_failures, 3);

    data.fail_connect.store(true, Ordering::SeqCst);
    let connects = data.connects();
    let result = orchestrator
        .execute_qualified(&admin(), "data__listTables", json!({}), false)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Unavailable));
    assert_eq!(data.connects(), connects + 1);
    assert_eq!(data.calls(), 0);

    // backend recovers
    data.fail_connect.store(false, Ordering::SeqCst);
    data.fail_ping.store(false, Ordering::SeqCst);
    let result = orchestrator
        .execute_qualified(&admin(), "data__listTables", json!({}), false)
        .await;
    assert!(result.success);
    assert_eq!(data.connects(), connects + 2);
}

#[tokio::test]
async fn test_non_cacheable_results_never_cached() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let params = json!({"query": "SELECT 1"});

    for _ in 0..3 {
        let result = orchestrator
            .execute_qualified(&admin(), "data__execute", params.clone(), true)
            .await;
        assert!(result.success);
        assert!(!result.cached);
    }

    assert_eq!(factory.backend("data").calls(), 3);
    let cache = orchestrator.router().cache();
    assert!(!cache.contains(&ResultCache::key("data", "execute", &params)).await);
    assert_eq!(cache.stats().await.size, 0);
}

#[tokio::test]
async fn test_metrics_stay_additive() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");

    data.push_call_failure(TransportError::Remote("syntax error".to_string()));
    let calls = [
        json!({"query": "SELEC 1"}),
        json!({"query": "SELECT 1"}),
        json!({"query": "SELECT 2"}),
    ];
    for params in calls {
        orchestrator
            .execute_qualified(&admin(), "data__execute", params, true)
            .await;
    }
    orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;

    let all = orchestrator.router().metrics().all_function_metrics().await;
    assert_eq!(all.len(), 2);
    for metrics in &all {
        assert_eq!(metrics.success_calls + metrics.fail_calls, metrics.total_calls);
    }

    let execute = orchestrator
        .router()
        .metrics()
        .function_metrics("data", "execute")
        .await
        .unwrap();
    assert_eq!(execute.total_calls, 3);
    assert_eq!(execute.fail_calls, 1);
    assert_eq!(execute.recent_errors.len(), 1);

    let summary = orchestrator.router().metrics().default_summary().await;
    assert_eq!(summary.total_calls, 5);
    assert_eq!(summary.success_calls + summary.fail_calls, summary.total_calls);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_retried() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");
    data.set_call_delay(Duration::from_secs(10));

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "SELECT pg_sleep(10)"}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(data.calls(), 1);

    let state = orchestrator.supervisor().get("data").await.unwrap().state().await;
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert_eq!(state.error_count, 1);
}

#[tokio::test]
async fn test_refused_calls_are_retried_within_budget() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");

    data.push_call_failure(TransportError::Refused("connection reset".to_string()));
    data.push_call_failure(TransportError::Refused("connection reset".to_string()));

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "SELECT 1"}), true)
        .await;
    assert!(result.success);
    assert_eq!(data.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_mark_server_unavailable() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");

    for _ in 0..3 {
        data.push_call_failure(TransportError::Refused("connection refused".to_string()));
    }

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "SELECT 1"}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Unavailable));
    assert_eq!(data.calls(), 3);

    let state = orchestrator.supervisor().get("data").await.unwrap().state().await;
    assert_eq!(state.status, ConnectionStatus::Error);

    let connects = data.connects();
    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "SELECT 1"}), true)
        .await;
    assert!(result.success);
    assert_eq!(data.connects(), connects + 1);
}

#[tokio::test]
async fn test_remote_error_is_not_retried() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;
    let data = factory.backend("data");
    data.push_call_failure(TransportError::Remote("relation \"nope\" does not exist".to_string()));

    let result = orchestrator
        .execute_qualified(&admin(), "data__execute", json!({"query": "SELECT * FROM nope"}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::RemoteError));
    assert!(result.error.unwrap().message.contains("does not exist"));
    assert_eq!(data.calls(), 1);
}

#[tokio::test]
async fn test_reload_replaces_servers_and_clears_cache() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    orchestrator.start().await;

    orchestrator
        .execute_qualified(&admin(), "data__listProjects", json!({}), true)
        .await;
    assert_eq!(orchestrator.router().cache().stats().await.size, 1);

    let mut config = test_config();
    config.servers.retain(|server| server.name != "docs");
    orchestrator.reload(config).await.unwrap();

    assert_eq!(orchestrator.router().cache().stats().await.size, 0);
    assert!(factory.backend("docs").disconnects() >= 1);

    let result = orchestrator
        .execute_qualified(&admin(), "docs__search", json!({"library": "tokio"}), true)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));

    // the remaining server was reconnected because the orchestrator is running
    let state = orchestrator.supervisor().get("data").await.unwrap().state().await;
    assert_eq!(state.status, ConnectionStatus::Connected);

    orchestrator.shutdown().await;
    let state = orchestrator.supervisor().get("data").await.unwrap().state().await;
    assert_eq!(state.status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_status_report_lists_every_server() {
    let (orchestrator, factory) = build_orchestrator(None).await;
    factory.backend("docs").fail_connect.store(true, Ordering::SeqCst);
    let results = orchestrator.start().await;
    assert_eq!(results.get("data"), Some(&true));
    assert_eq!(results.get("docs"), Some(&false));

    let report = orchestrator.status().await;
    assert_eq!(report.servers.len(), 2);
    assert_eq!(report.connected_count(), 1);
    assert_eq!(report.servers["data"].function_count, 3);
    assert!(report.servers["docs"].last_error.is_some());
}
