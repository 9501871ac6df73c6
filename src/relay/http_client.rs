//! Outbound HTTP layer shared by the proxy pool and the pipeline
//!
//! Every request carries the configured timeout. Source requests may be
//! routed through a pooled proxy; a missing proxy means a direct request.

use crate::error::RelayError;
use crate::models::ProxyRecord;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// HTTP client with a per-request timeout and optional per-request proxy
#[derive(Debug, Clone)]
pub struct RelayHttpClient {
    direct: Client,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl RelayHttpClient {
    /// Create a client
    ///
    /// `accept_invalid_certs` disables TLS verification, which proxied
    /// source requests commonly need.
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, RelayError> {
        let direct = Self::builder(timeout, accept_invalid_certs)
            .no_proxy()
            .build()
            .map_err(|e| RelayError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            direct,
            timeout,
            accept_invalid_certs,
        })
    }

    fn builder(timeout: Duration, accept_invalid_certs: bool) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
    }

    /// Client routed through `proxy`, or the direct client when `None`
    pub fn client_for(&self, proxy: Option<&ProxyRecord>) -> Result<Client, RelayError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let upstream = reqwest::Proxy::all(proxy.url())
            .map_err(|e| RelayError::InvalidData(format!("proxy {}: {}", proxy.endpoint(), e)))?;

        Self::builder(self.timeout, self.accept_invalid_certs)
            .proxy(upstream)
            .build()
            .map_err(|e| RelayError::Network(format!("Failed to create proxied client: {}", e)))
    }

    /// GET `url` with `query` appended and decode the JSON body
    ///
    /// The content type is not enforced; any body that parses is accepted.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        proxy: Option<&ProxyRecord>,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RelayError> {
        let client = self.client_for(proxy)?;

        debug!(
            url = url,
            proxy = proxy.map(|p| p.endpoint()).unwrap_or_default(),
            "Sending HTTP GET request"
        );

        let response = client
            .get(url)
            .query(query)
            .header(ACCEPT, ACCEPT_JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(url = url, body_size = body.len(), "Received response");

        serde_json::from_slice(&body).map_err(|e| RelayError::InvalidData(e.to_string()))
    }

    /// POST `form` as `application/x-www-form-urlencoded` and decode a JSON reply
    ///
    /// A reply whose content type is not JSON is rejected before decoding.
    pub async fn post_form<F, T>(&self, url: &str, form: &F) -> Result<T, RelayError>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.direct.post(url).form(form).send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !is_json(&content_type) {
            if !status.is_success() {
                return Err(RelayError::HttpStatus(status.as_u16()));
            }
            return Err(RelayError::UnexpectedContentType(content_type));
        }

        let body = response.bytes().await?;
        if !status.is_success() {
            debug!(url = url, status = status.as_u16(), "Non-success status with JSON body");
        }

        serde_json::from_slice(&body).map_err(|e| RelayError::InvalidData(e.to_string()))
    }
}

/// Match `application/json` with or without parameters
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SinkReply;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> RelayHttpClient {
        RelayHttpClient::new(Duration::from_secs(2), false).unwrap()
    }

    #[tokio::test]
    async fn test_get_json_with_query_and_accept_header() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/teams"))
            .and(query_param("offset", "30"))
            .and(header_exists("accept"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&mock_server)
            .await;

        let value: Value = client()
            .get_json(
                None,
                &format!("{}/teams", mock_server.uri()),
                &[("offset", "30".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_get_json_accepts_text_content_type() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": []}"#))
            .mount(&mock_server)
            .await;

        let value: Value = client()
            .get_json(None, &mock_server.uri(), &[])
            .await
            .unwrap();

        assert_eq!(value, json!({"data": []}));
    }

    #[tokio::test]
    async fn test_get_json_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let result: Result<Value, RelayError> =
            client().get_json(None, &mock_server.uri(), &[]).await;

        assert_eq!(result.unwrap_err(), RelayError::HttpStatus(503));
    }

    #[tokio::test]
    async fn test_get_json_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let result: Result<Value, RelayError> =
            client().get_json(None, &mock_server.uri(), &[]).await;

        assert!(matches!(result, Err(RelayError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_network_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = RelayHttpClient::new(Duration::from_millis(100), false).unwrap();
        let result: Result<Value, RelayError> = client.get_json(None, &mock_server.uri(), &[]).await;

        assert_eq!(result.unwrap_err(), RelayError::NetworkTimeout);
    }

    #[tokio::test]
    async fn test_post_form_encodes_fields() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("name=A%231"))
            .and(body_string_contains("source=3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": 200, "msg": "ok"})),
            )
            .mount(&mock_server)
            .await;

        let form = [("name", "A#1"), ("source", "3")];
        let reply: SinkReply = client()
            .post_form(&format!("{}/push", mock_server.uri()), &form)
            .await
            .unwrap();

        assert!(reply.is_success());
    }

    #[tokio::test]
    async fn test_post_form_rejects_non_json_reply() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>busy</html>", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let result: Result<SinkReply, RelayError> = client()
            .post_form(&mock_server.uri(), &[("name", "x")])
            .await;

        assert_eq!(
            result.unwrap_err(),
            RelayError::UnexpectedContentType("text/html".to_string())
        );
    }

    #[tokio::test]
    async fn test_post_form_http_error_without_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let result: Result<SinkReply, RelayError> = client()
            .post_form(&mock_server.uri(), &[("name", "x")])
            .await;

        assert_eq!(result.unwrap_err(), RelayError::HttpStatus(502));
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_transport_error() {
        let mock_server = MockServer::start().await;
        // a closed local port stands in for a dead proxy
        let dead = ProxyRecord::new(
            "127.0.0.1",
            "1",
            Utc::now(),
            ChronoDuration::minutes(5),
            ChronoDuration::zero(),
        );

        let result: Result<Value, RelayError> = client()
            .get_json(Some(&dead), &mock_server.uri(), &[])
            .await;

        assert!(result.unwrap_err().is_transport());
    }

    #[test]
    fn test_is_json() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON"));
        assert!(!is_json("text/html"));
        assert!(!is_json(""));
    }
}
