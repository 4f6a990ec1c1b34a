//! Deterministic collaborators for tests and fixtures.
//!
//! Sessions driven with these produce byte-stable serialized forms: UUIDs
//! come out of a counter, timestamps from a stepping clock, and service
//! calls from canned responses.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::{Clock, UuidGenerator};
use crate::services::{
    AirtimeService, AirtimeTransfer, Classification, ClassificationService, EmailService,
    ServiceError, Ticket, TicketService, WebhookRequest, WebhookService,
};
use crate::types::{Urn, WebhookCall};

// ---------------------------------------------------------------------------
// Identity and time
// ---------------------------------------------------------------------------

/// Sequential UUIDs: `…0001`, `…0002`, …
#[derive(Default)]
pub struct SeededUuidGenerator {
    counter: AtomicU64,
}

impl SeededUuidGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UuidGenerator for SeededUuidGenerator {
    fn next(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(n as u128)
    }
}

/// A clock that starts at a fixed instant and advances by a fixed step on
/// every read. A zero step produces tied timestamps, which the event log
/// must tolerate.
pub struct SteppingClock {
    now: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            now: Mutex::new(start),
            step,
        }
    }
}

impl Default for SteppingClock {
    fn default() -> Self {
        Self::new(
            "2018-10-18T14:20:30Z".parse().expect("valid timestamp"),
            Duration::seconds(1),
        )
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock();
        let current = *now;
        *now = current + self.step;
        current
    }
}

// ---------------------------------------------------------------------------
// Canned services
// ---------------------------------------------------------------------------

/// Webhook service with canned responses per URL. Unknown URLs get the
/// default status with an empty body; status 0 simulates a connection
/// error.
#[derive(Default)]
pub struct StaticWebhookService {
    responses: BTreeMap<String, (u16, String)>,
}

impl StaticWebhookService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(mut self, url: &str, status_code: u16, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), (status_code, body.to_string()));
        self
    }
}

#[async_trait]
impl WebhookService for StaticWebhookService {
    async fn call(&self, request: &WebhookRequest) -> WebhookCall {
        let (status_code, body) = self
            .responses
            .get(&request.url)
            .cloned()
            .unwrap_or((200, String::new()));
        let response = if status_code == 0 {
            String::new()
        } else {
            format!("HTTP/1.1 {status_code} \r\n\r\n{body}")
        };
        WebhookCall {
            url: request.url.clone(),
            method: request.method.clone(),
            status_code,
            request: format!("{} {} HTTP/1.1\r\n\r\n{}", request.method, request.url, request.body),
            response,
            elapsed_ms: 0,
            resthook: None,
        }
    }
}

/// Email service that records what it was asked to send.
#[derive(Default)]
pub struct RecordingEmailService {
    sent: Mutex<Vec<(Vec<String>, String, String)>>,
}

impl RecordingEmailService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(Vec<String>, String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailService for RecordingEmailService {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .push((to.to_vec(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Classification service that always returns the same classification.
pub struct StaticClassificationService {
    pub classification: Classification,
}

#[async_trait]
impl ClassificationService for StaticClassificationService {
    async fn classify(&self, _input: &str) -> Result<Classification, ServiceError> {
        Ok(self.classification.clone())
    }
}

/// Ticket service handing out tickets with a fixed UUID.
pub struct StaticTicketService {
    pub ticket_uuid: Uuid,
}

#[async_trait]
impl TicketService for StaticTicketService {
    async fn open(&self, subject: &str, body: &str) -> Result<Ticket, ServiceError> {
        Ok(Ticket {
            uuid: self.ticket_uuid,
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}

/// Airtime service that grants the first requested amount in full.
pub struct StaticAirtimeService;

#[async_trait]
impl AirtimeService for StaticAirtimeService {
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, f64>,
    ) -> Result<AirtimeTransfer, ServiceError> {
        let (currency, amount) = amounts
            .iter()
            .next()
            .map(|(c, a)| (c.clone(), *a))
            .ok_or_else(|| ServiceError::Call("no amounts configured".into()))?;
        Ok(AirtimeTransfer {
            sender: sender.cloned(),
            recipient: recipient.clone(),
            currency,
            desired_amount: amount,
            actual_amount: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_uuids_are_sequential() {
        let gen = SeededUuidGenerator::new();
        assert_eq!(
            gen.next().to_string(),
            "00000000-0000-0000-0000-000000000001"
        );
        assert_eq!(
            gen.next().to_string(),
            "00000000-0000-0000-0000-000000000002"
        );
    }

    #[test]
    fn stepping_clock_advances() {
        let clock = SteppingClock::default();
        let first = clock.now();
        let second = clock.now();
        assert_eq!(second - first, Duration::seconds(1));
    }

    #[tokio::test]
    async fn static_webhook_serves_canned_bodies() {
        let service = StaticWebhookService::new().set_response("http://x/ok", 201, "{\"a\":1}");
        let call = service
            .call(&WebhookRequest {
                method: "GET".into(),
                url: "http://x/ok".into(),
                headers: vec![],
                body: String::new(),
            })
            .await;
        assert_eq!(call.status_code, 201);
        assert_eq!(call.response_json(), Some(serde_json::json!({"a": 1})));
    }
}
