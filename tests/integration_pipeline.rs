//! Harvest pipeline integration tests
//!
//! Runs whole cycles against a mock source and sink:
//! - Delivery of new records and suppression on later cycles
//! - Retry of failed deliveries and pages
//! - Proxy routing, eviction and the delivery concurrency cap

mod common;

use std::time::{Duration, Instant};

use common::*;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_new_records_delivered_once() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        vec![
            source_item(1, "raid at 8", "/j Guardian#1"),
            source_item(2, "nightfall", "Hunter#2"),
            source_item(3, "", "Warlock#3"),
        ],
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200))
        .expect(2)
        .mount(&server)
        .await;

    let relay = build_relay(&test_config(&server));
    assert!(relay.pool.is_empty().await);

    let first = relay.pipeline.run().await;
    assert_eq!(first.pages_ok, 1);
    assert_eq!(first.items, 3);
    assert_eq!(first.candidates, 2);
    assert_eq!(first.delivered, 2);
    assert_eq!(first.failed, 0);
    assert_eq!(relay.pipeline.history_len().await, 2);

    let second = relay.pipeline.run().await;
    assert_eq!(second.candidates, 2);
    assert_eq!(second.delta, 0);
    assert_eq!(second.delivered, 0);

    let stats = relay.counter.snapshot().await;
    assert_eq!(stats["forward.success"].count, 2);
    assert_eq!(stats["fetch.records"].count, 6);
}

#[tokio::test]
async fn test_sink_form_fields() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(4, "crota\nraid", "/j Titan#4")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .and(body_string_contains("name=Titan%234"))
        .and(body_string_contains("context=crotaraid"))
        .and(body_string_contains("source=3"))
        .and(body_string_contains("repeatid=400"))
        .respond_with(sink_reply(200))
        .expect(1)
        .mount(&server)
        .await;

    let relay = build_relay(&test_config(&server));
    let report = relay.pipeline.run().await;

    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn test_sink_failure_retried_within_cycle() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(5, "vault", "Hunter#5")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200))
        .expect(1)
        .mount(&server)
        .await;

    let relay = build_relay(&test_config(&server));
    let report = relay.pipeline.run().await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(relay.counter.snapshot().await["forward.success"].count, 1);
}

#[tokio::test]
async fn test_sink_rejection_then_acceptance_delivers() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(14, "raid", "Hunter#14")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200))
        .expect(1)
        .mount(&server)
        .await;

    let relay = build_relay(&test_config(&server));
    let report = relay.pipeline.run().await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(relay.pipeline.history_len().await, 1);
    assert_eq!(relay.counter.snapshot().await["forward.success"].count, 1);
}

#[tokio::test]
async fn test_rejected_record_not_remembered() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(6, "trials", "Warlock#6")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(500))
        // two attempts in each of two cycles
        .expect(4)
        .mount(&server)
        .await;

    let relay = build_relay(&test_config(&server));

    let first = relay.pipeline.run().await;
    assert_eq!(first.delivered, 0);
    assert_eq!(first.failed, 1);
    assert_eq!(relay.pipeline.history_len().await, 0);

    let second = relay.pipeline.run().await;
    assert_eq!(second.delta, 1);
    assert_eq!(second.failed, 1);

    assert_eq!(relay.counter.snapshot().await["forward.failed"].count, 2);
}

#[tokio::test]
async fn test_failed_page_dropped_others_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SOURCE_PATH))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, 30, vec![source_item(7, "gambit", "Titan#7")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.source.page_count = 2;
    let relay = build_relay(&config);

    let report = relay.pipeline.run().await;

    assert_eq!(report.pages_ok, 1);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(relay.counter.snapshot().await["fetch.pages_failed"].count, 1);
}

#[tokio::test]
async fn test_duplicate_across_pages_delivered_once() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(8, "raid", "A#8")]).await;
    mount_page(&server, 30, vec![source_item(8, "raid again", "A#8")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.source.page_count = 2;
    let relay = build_relay(&config);

    let report = relay.pipeline.run().await;

    assert_eq!(report.items, 2);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn test_dead_proxy_evicted_then_direct() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(9, "dungeon", "B#9")]).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.proxy.evict_on_failure = true;
    let relay = build_relay(&config);
    relay.pool.extend(vec![dead_proxy()]).await;

    let report = relay.pipeline.run().await;

    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.delivered, 1);
    assert!(relay.pool.is_empty().await);
}

#[tokio::test]
async fn test_dead_proxy_kept_without_eviction() {
    let server = MockServer::start().await;
    mount_page(&server, 0, vec![source_item(10, "dungeon", "B#10")]).await;

    let relay = build_relay(&test_config(&server));
    relay.pool.extend(vec![dead_proxy()]).await;

    let report = relay.pipeline.run().await;

    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(relay.pool.len().await, 1);
}

#[tokio::test]
async fn test_deliveries_respect_concurrency_cap() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        vec![
            source_item(11, "a", "A#11"),
            source_item(12, "b", "B#12"),
            source_item(13, "c", "C#13"),
        ],
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(sink_reply(200).set_delay(Duration::from_millis(200)))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.harvest.max_concurrent = 1;
    let relay = build_relay(&config);

    let start = Instant::now();
    let report = relay.pipeline.run().await;

    assert_eq!(report.delivered, 3);
    assert!(start.elapsed() >= Duration::from_millis(600));
}
