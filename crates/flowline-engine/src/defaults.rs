//! Default collaborator implementations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::{Clock, UuidGenerator};
use crate::services::{WebhookRequest, WebhookService, WebhookServiceFactory};
use crate::types::WebhookCall;

/// Random v4 UUIDs.
pub struct DefaultUuidGenerator;

impl UuidGenerator for DefaultUuidGenerator {
    fn next(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// HTTP webhook service
// ---------------------------------------------------------------------------

/// Largest response body retained on a [`WebhookCall`]. Longer bodies are
/// truncated so serialized sessions stay bounded.
const MAX_RESPONSE_BYTES: usize = 10_000;

/// Webhook service backed by a shared `reqwest` client.
pub struct HttpWebhookService {
    client: reqwest::Client,
}

impl HttpWebhookService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// A factory for [`crate::engine::EngineBuilder::with_webhook_service`]
    /// that shares one client across sessions.
    pub fn factory(timeout: Duration) -> WebhookServiceFactory {
        let service: Arc<dyn WebhookService> = Arc::new(Self::new(timeout));
        Box::new(move |_session| Ok(service.clone()))
    }

    fn request_trace(request: &WebhookRequest) -> String {
        let mut trace = format!("{} {} HTTP/1.1\r\n", request.method, request.url);
        for (name, value) in &request.headers {
            trace.push_str(&format!("{name}: {value}\r\n"));
        }
        trace.push_str("\r\n");
        trace.push_str(&request.body);
        trace
    }
}

#[async_trait]
impl WebhookService for HttpWebhookService {
    async fn call(&self, request: &WebhookRequest) -> WebhookCall {
        let started = Instant::now();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let request_trace = Self::request_trace(request);

        match builder.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let status_line = format!(
                    "HTTP/1.1 {} {}\r\n\r\n",
                    status_code,
                    response.status().canonical_reason().unwrap_or("")
                );
                let mut body = response.text().await.unwrap_or_default();
                if body.len() > MAX_RESPONSE_BYTES {
                    body.truncate(MAX_RESPONSE_BYTES);
                }
                WebhookCall {
                    url: request.url.clone(),
                    method: request.method.clone(),
                    status_code,
                    request: request_trace,
                    response: format!("{status_line}{body}"),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    resthook: None,
                }
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "webhook connection failed");
                WebhookCall {
                    url: request.url.clone(),
                    method: request.method.clone(),
                    status_code: 0,
                    request: request_trace,
                    response: String::new(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    resthook: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: &str, url: String, body: &str) -> WebhookRequest {
        WebhookRequest {
            method: method.into(),
            url,
            headers: vec![],
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn get_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let service = HttpWebhookService::new(Duration::from_secs(5));
        let call = service
            .call(&request("GET", format!("{}/ok", server.uri()), ""))
            .await;
        assert_eq!(call.status_code, 200);
        assert_eq!(call.response_json(), Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn post_sends_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("Content-Type", "application/json"))
            .and(body_string("{\"x\":1}"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let service = HttpWebhookService::new(Duration::from_secs(5));
        let mut req = request("POST", format!("{}/submit", server.uri()), "{\"x\":1}");
        req.headers
            .push(("Content-Type".into(), "application/json".into()));
        let call = service.call(&req).await;
        assert_eq!(call.status_code, 201);
    }

    #[tokio::test]
    async fn connection_error_is_status_zero() {
        let service = HttpWebhookService::new(Duration::from_millis(200));
        let call = service
            .call(&request("GET", "http://127.0.0.1:1/unreachable".into(), ""))
            .await;
        assert_eq!(call.status_code, 0);
        assert!(call.response.is_empty());
    }

    #[tokio::test]
    async fn server_error_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fail"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = HttpWebhookService::new(Duration::from_secs(5));
        let call = service
            .call(&request("GET", format!("{}/fail", server.uri()), ""))
            .await;
        assert_eq!(call.status_code, 500);
        assert!(call.request.starts_with("GET http://"));
    }
}
