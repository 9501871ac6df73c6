//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fireteam_relay::config::Config;
use fireteam_relay::models::ProxyRecord;
use fireteam_relay::relay::{HarvestPipeline, ProxyPool, RelayHttpClient};
use fireteam_relay::stats::Counter;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SOURCE_PATH: &str = "/teams";
pub const SINK_PATH: &str = "/push";

/// A pipeline together with the shared state it was built around
pub struct TestRelay {
    pub pool: Arc<ProxyPool>,
    pub counter: Arc<Counter>,
    pub pipeline: Arc<HarvestPipeline>,
}

/// Source item created just now
pub fn source_item(link_id: u64, text: &str, tag: &str) -> Value {
    json!({
        "link_id": link_id,
        "create_at": Utc::now().timestamp(),
        "team_data": {"team_text": text, "name": {"value": tag}},
        "user": {"userid": link_id * 100}
    })
}

/// Wrap items in the source page envelope
pub fn source_page(items: Vec<Value>) -> Value {
    json!({"result": {"data_list": items}})
}

/// Sink reply with the given application status
pub fn sink_reply(status: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": status, "msg": "ok"}))
}

/// Serve `items` for the page at `offset`
pub async fn mount_page(server: &MockServer, offset: u64, items: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(SOURCE_PATH))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(source_page(items)))
        .mount(server)
        .await;
}

/// Configuration pointing the source and sink at `server`
///
/// A single page per cycle and two quick attempts per unit of work.
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.proxy.provider_url = format!("{}/proxies", server.uri());
    config.source.url = format!("{}{}", server.uri(), SOURCE_PATH);
    config.source.page_count = 1;
    config.sink.url = format!("{}{}", server.uri(), SINK_PATH);
    config.http.timeout_secs = 2;
    config.retry.attempts = 2;
    config.retry.delay_ms = 10;
    config
}

pub fn build_relay(config: &Config) -> TestRelay {
    let http = RelayHttpClient::new(Duration::from_secs(config.http.timeout_secs), false)
        .expect("Failed to create HTTP client");
    let pool = Arc::new(ProxyPool::new(&config.proxy, http));
    let counter = Arc::new(Counter::new());
    let pipeline = HarvestPipeline::new(config, Arc::clone(&pool), Arc::clone(&counter))
        .expect("Failed to create pipeline");

    TestRelay {
        pool,
        counter,
        pipeline: Arc::new(pipeline),
    }
}

/// Proxy record whose endpoint refuses every connection
pub fn dead_proxy() -> ProxyRecord {
    ProxyRecord::new(
        "127.0.0.1",
        "1",
        Utc::now(),
        chrono::Duration::minutes(10),
        chrono::Duration::zero(),
    )
}
