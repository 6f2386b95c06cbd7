//! End-to-end tests through `TelemetryService`.
//!
//! Drives calls through the authorizer the way the server layer does and
//! checks what log and stat subscribers observe. Stat tests run with paused
//! time so window boundaries are deterministic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use call_telemetry::{
    Acl, DispatchRules, HubKind, HubSettings, TelemetryError, TelemetryService,
};
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::Code;

fn acl() -> Acl {
    Acl::from_map(HashMap::from([
        ("alice".to_string(), vec!["pkg.Svc/Get".to_string()]),
        ("bob".to_string(), vec!["pkg.Svc/*".to_string()]),
        ("x".to_string(), vec!["/main.Biz/*".to_string()]),
        (
            "logger".to_string(),
            vec!["/main.Admin/Logging".to_string()],
        ),
    ]))
}

/// Route crate logs to the test harness; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn service_with(rules: DispatchRules) -> TelemetryService {
    init_tracing();
    TelemetryService::new(acl(), HubSettings::default(), rules)
}

fn service() -> TelemetryService {
    service_with(DispatchRules::new())
}

fn metadata(consumer: &str) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    metadata.insert("consumer", consumer.parse().unwrap());
    metadata
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test]
async fn test_exact_pattern_allows_only_that_method() {
    let service = service();
    let authorizer = service.authorizer();

    assert!(authorizer
        .admit(&metadata("alice"), "pkg.Svc/Get", None)
        .await
        .is_ok());

    let status = authorizer
        .admit(&metadata("alice"), "pkg.Svc/Set", None)
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
}

#[tokio::test]
async fn test_wildcard_pattern_covers_one_service() {
    let service = service();
    let authorizer = service.authorizer();

    for method in ["pkg.Svc/Get", "pkg.Svc/Set"] {
        assert!(authorizer
            .admit(&metadata("bob"), method, None)
            .await
            .is_ok());
    }

    let status = authorizer
        .admit(&metadata("bob"), "other.Svc/Get", None)
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_calls_emit_nothing() {
    let service = service();
    let authorizer = service.authorizer();
    let mut log = service.attach_log().await.unwrap();
    let mut stat = service.attach_stat(1).await.unwrap();

    let status = authorizer
        .admit(&MetadataMap::new(), "/main.Biz/Check", None)
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let status = authorizer
        .admit(&metadata("alice"), "/main.Biz/Check", None)
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);

    authorizer
        .admit(&metadata("x"), "/main.Biz/Check", None)
        .await
        .unwrap();

    // The only event either feed sees is the authorized one
    let event = log.recv().await.unwrap();
    assert_eq!(event.consumer, "x");

    let snapshot = stat.next_snapshot().await.unwrap();
    assert_eq!(snapshot.total_calls(), 1);
    assert_eq!(snapshot.by_consumer.get("x"), Some(&1));
    assert!(!snapshot.by_consumer.contains_key("alice"));
}

// ============================================================================
// Log feed
// ============================================================================

#[tokio::test]
async fn test_log_subscriber_sees_calls_in_order() {
    let service = service();
    let authorizer = service.authorizer();
    let mut log = service.attach_log().await.unwrap();

    for method in ["/main.Biz/m1", "/main.Biz/m2", "/main.Biz/m3"] {
        authorizer.admit(&metadata("x"), method, None).await.unwrap();
    }

    for expected in ["/main.Biz/m1", "/main.Biz/m2", "/main.Biz/m3"] {
        assert_eq!(log.recv().await.unwrap().method, expected);
    }
}

#[tokio::test]
async fn test_every_log_subscriber_gets_every_event() {
    let service = service();
    let authorizer = service.authorizer();
    let mut first = service.attach_log().await.unwrap();
    let mut second = service.attach_log().await.unwrap();

    authorizer
        .admit(&metadata("x"), "/main.Biz/Check", None)
        .await
        .unwrap();

    assert_eq!(first.recv().await.unwrap().method, "/main.Biz/Check");
    assert_eq!(second.recv().await.unwrap().method, "/main.Biz/Check");
}

#[tokio::test]
async fn test_concurrent_calls_all_reach_log_subscriber() {
    let service = service();
    let mut log = service.attach_log().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let authorizer = service.authorizer();
        handles.push(tokio::spawn(async move {
            authorizer
                .admit(&metadata("x"), &format!("/main.Biz/m{i}"), None)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        seen.push(log.recv().await.unwrap().method);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 20);
}

#[tokio::test]
async fn test_logging_endpoint_exempt_from_log_feed() {
    let service = service_with(DispatchRules::new().exempt_from_log("/main.Admin/Logging"));
    let authorizer = service.authorizer();
    let mut log = service.attach_log().await.unwrap();

    authorizer
        .admit(&metadata("logger"), "/main.Admin/Logging", None)
        .await
        .unwrap();
    authorizer
        .admit(&metadata("x"), "/main.Biz/Check", None)
        .await
        .unwrap();

    assert_eq!(log.recv().await.unwrap().method, "/main.Biz/Check");
}

// ============================================================================
// Stat feed
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stat_window_counts_then_resets() {
    let service = service();
    let authorizer = service.authorizer();
    let mut stat = service.attach_stat(1).await.unwrap();

    for _ in 0..2 {
        authorizer
            .admit(&metadata("x"), "/main.Biz/Check", None)
            .await
            .unwrap();
    }

    let first = stat.next_snapshot().await.unwrap();
    assert_eq!(first.by_consumer.get("x"), Some(&2));
    assert_eq!(first.by_method.get("/main.Biz/Check"), Some(&2));

    let second = stat.next_snapshot().await.unwrap();
    assert!(second.by_consumer.is_empty());
    assert!(second.by_method.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stat_subscribers_keep_independent_windows() {
    let service = service();
    let authorizer = service.authorizer();
    let mut short = service.attach_stat(1).await.unwrap();
    let mut long = service.attach_stat(3).await.unwrap();

    authorizer
        .admit(&metadata("x"), "/main.Biz/Add", None)
        .await
        .unwrap();

    let first = short.next_snapshot().await.unwrap();
    assert_eq!(first.total_calls(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    authorizer
        .admit(&metadata("x"), "/main.Biz/Check", None)
        .await
        .unwrap();

    let second = short.next_snapshot().await.unwrap();
    assert_eq!(second.by_method.get("/main.Biz/Check"), Some(&1));
    assert!(!second.by_method.contains_key("/main.Biz/Add"));

    let third = short.next_snapshot().await.unwrap();
    assert!(third.is_empty());

    // The long window saw both calls; the short one's resets did not touch it
    let long_first = long.next_snapshot().await.unwrap();
    assert_eq!(long_first.by_consumer.get("x"), Some(&2));
    assert_eq!(long_first.by_method.get("/main.Biz/Add"), Some(&1));
    assert_eq!(long_first.by_method.get("/main.Biz/Check"), Some(&1));
}

#[tokio::test]
async fn test_zero_window_rejected() {
    let service = service();
    let result = service.attach_stat(0).await;
    assert!(matches!(result, Err(TelemetryError::InvalidWindow(0))));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_all_feeds() {
    let service = service();
    let mut log = service.attach_log().await.unwrap();
    let mut stat = service.attach_stat(60).await.unwrap();

    service
        .authorizer()
        .admit(&metadata("x"), "/main.Biz/Check", None)
        .await
        .unwrap();
    assert!(log.recv().await.is_some());

    assert!(service.shutdown());
    service.wait_closed().await;

    assert!(log.recv().await.is_none());
    // Partial window in progress at shutdown is discarded
    assert!(stat.next_snapshot().await.is_none());
    assert_eq!(service.subscriber_count(HubKind::Log).await, 0);
    assert_eq!(service.subscriber_count(HubKind::Stat).await, 0);
}

#[tokio::test]
async fn test_shutdown_delivers_admitted_calls_before_close() {
    let service = service();
    let authorizer = service.authorizer();
    let mut log = service.attach_log().await.unwrap();

    for method in ["/main.Biz/m1", "/main.Biz/m2", "/main.Biz/m3"] {
        authorizer.admit(&metadata("x"), method, None).await.unwrap();
    }
    service.shutdown();
    service.wait_closed().await;

    let mut received = Vec::new();
    while let Some(event) = log.recv().await {
        received.push(event.method);
    }
    assert_eq!(received, vec!["/main.Biz/m1", "/main.Biz/m2", "/main.Biz/m3"]);
}

#[tokio::test]
async fn test_repeated_shutdown_is_harmless() {
    let service = Arc::new(service());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.shutdown() }));
    }

    let mut started = 0;
    for handle in handles {
        if handle.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    service.wait_closed().await;
    assert!(!service.shutdown());
}

#[tokio::test]
async fn test_calls_after_shutdown_still_authorized() {
    let service = service();
    let authorizer = service.authorizer();
    service.shutdown();
    service.wait_closed().await;

    // Authorization does not depend on the hubs; events are dropped
    assert!(authorizer
        .admit(&metadata("x"), "/main.Biz/Check", None)
        .await
        .is_ok());
    assert!(matches!(
        service.attach_log().await,
        Err(TelemetryError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_external_token_triggers_shutdown() {
    let service = Arc::new(service());
    let mut log = service.attach_log().await.unwrap();
    let token = CancellationToken::new();
    let _task = service.shutdown_on(token.clone());

    token.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), log.recv())
        .await
        .expect("log feed should close after external shutdown");
    assert!(next.is_none());
    assert!(service.is_shut_down());
}
