//! Capability interfaces and the per-session factory registry.
//!
//! Actions never perform I/O themselves — they resolve a capability from
//! the engine's [`ServiceFactories`] and call it. Every factory defaults to
//! an error value so an action that needs an unconfigured capability can
//! surface a graceful `error` event instead of crashing the session.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::assets::{Classifier, Ticketer};
use crate::session::Session;
use crate::types::{Urn, WebhookCall};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("no {0} service factory configured")]
    NotConfigured(&'static str),
    #[error("service call failed: {0}")]
    Call(String),
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// An HTTP request an action wants made on its behalf.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Makes HTTP calls for `call_webhook` and `call_resthook`. Connection
/// failures are reported as a [`WebhookCall`] with `status_code` 0 rather
/// than an error — timeouts are the service's responsibility.
#[async_trait]
pub trait WebhookService: Send + Sync {
    async fn call(&self, request: &WebhookRequest) -> WebhookCall;
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), ServiceError>;
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A single intent returned by an NLU classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub confidence: f64,
}

/// An extracted entity value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub value: String,
    pub confidence: f64,
}

/// The result of classifying an input, intents ordered most confident
/// first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intents: Vec<Intent>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: BTreeMap<String, Vec<Entity>>,
}

#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(&self, input: &str) -> Result<Classification, ServiceError>;
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// A ticket opened in an external ticketing system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub uuid: uuid::Uuid,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait TicketService: Send + Sync {
    async fn open(&self, subject: &str, body: &str) -> Result<Ticket, ServiceError>;
}

// ---------------------------------------------------------------------------
// Airtime
// ---------------------------------------------------------------------------

/// A completed airtime transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirtimeTransfer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Urn>,
    pub recipient: Urn,
    pub currency: String,
    pub desired_amount: f64,
    pub actual_amount: f64,
}

#[async_trait]
pub trait AirtimeService: Send + Sync {
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, f64>,
    ) -> Result<AirtimeTransfer, ServiceError>;
}

// ---------------------------------------------------------------------------
// External services / message catalogs
// ---------------------------------------------------------------------------

/// Escape hatch for vendor integrations that don't fit the other shapes.
#[async_trait]
pub trait ExternalService: Send + Sync {
    async fn call(&self, action: &str, params: &Value) -> Result<Value, ServiceError>;
}

#[async_trait]
pub trait MsgCatalogService: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<Value, ServiceError>;
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

pub type WebhookServiceFactory =
    Box<dyn Fn(&Session) -> Result<Arc<dyn WebhookService>, ServiceError> + Send + Sync>;
pub type EmailServiceFactory =
    Box<dyn Fn(&Session) -> Result<Arc<dyn EmailService>, ServiceError> + Send + Sync>;
pub type ClassificationServiceFactory = Box<
    dyn Fn(&Session, &Classifier) -> Result<Arc<dyn ClassificationService>, ServiceError>
        + Send
        + Sync,
>;
pub type TicketServiceFactory = Box<
    dyn Fn(&Session, &Ticketer) -> Result<Arc<dyn TicketService>, ServiceError> + Send + Sync,
>;
pub type AirtimeServiceFactory =
    Box<dyn Fn(&Session) -> Result<Arc<dyn AirtimeService>, ServiceError> + Send + Sync>;
pub type ExternalServiceFactory =
    Box<dyn Fn(&Session) -> Result<Arc<dyn ExternalService>, ServiceError> + Send + Sync>;
pub type MsgCatalogServiceFactory =
    Box<dyn Fn(&Session) -> Result<Arc<dyn MsgCatalogService>, ServiceError> + Send + Sync>;

/// Resolves a session to its I/O capabilities, one factory per capability.
pub struct ServiceFactories {
    pub(crate) webhook: WebhookServiceFactory,
    pub(crate) email: EmailServiceFactory,
    pub(crate) classification: ClassificationServiceFactory,
    pub(crate) ticket: TicketServiceFactory,
    pub(crate) airtime: AirtimeServiceFactory,
    pub(crate) external: ExternalServiceFactory,
    pub(crate) msg_catalog: MsgCatalogServiceFactory,
}

impl ServiceFactories {
    /// A registry where every capability errors until configured.
    pub fn empty() -> Self {
        Self {
            webhook: Box::new(|_| Err(ServiceError::NotConfigured("webhook"))),
            email: Box::new(|_| Err(ServiceError::NotConfigured("email"))),
            classification: Box::new(|_, _| Err(ServiceError::NotConfigured("classification"))),
            ticket: Box::new(|_, _| Err(ServiceError::NotConfigured("ticket"))),
            airtime: Box::new(|_| Err(ServiceError::NotConfigured("airtime"))),
            external: Box::new(|_| Err(ServiceError::NotConfigured("external"))),
            msg_catalog: Box::new(|_| Err(ServiceError::NotConfigured("msg_catalog"))),
        }
    }

    pub fn webhook(&self, session: &Session) -> Result<Arc<dyn WebhookService>, ServiceError> {
        (self.webhook)(session)
    }

    pub fn email(&self, session: &Session) -> Result<Arc<dyn EmailService>, ServiceError> {
        (self.email)(session)
    }

    pub fn classification(
        &self,
        session: &Session,
        classifier: &Classifier,
    ) -> Result<Arc<dyn ClassificationService>, ServiceError> {
        (self.classification)(session, classifier)
    }

    pub fn ticket(
        &self,
        session: &Session,
        ticketer: &Ticketer,
    ) -> Result<Arc<dyn TicketService>, ServiceError> {
        (self.ticket)(session, ticketer)
    }

    pub fn airtime(&self, session: &Session) -> Result<Arc<dyn AirtimeService>, ServiceError> {
        (self.airtime)(session)
    }

    pub fn external(&self, session: &Session) -> Result<Arc<dyn ExternalService>, ServiceError> {
        (self.external)(session)
    }

    pub fn msg_catalog(
        &self,
        session: &Session,
    ) -> Result<Arc<dyn MsgCatalogService>, ServiceError> {
        (self.msg_catalog)(session)
    }
}

impl Default for ServiceFactories {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_round_trip() {
        let c = Classification {
            intents: vec![Intent {
                name: "book_flight".into(),
                confidence: 0.87,
            }],
            entities: BTreeMap::new(),
        };
        let encoded = serde_json::to_string(&c).unwrap();
        let rt: Classification = serde_json::from_str(&encoded).unwrap();
        assert_eq!(c, rt);
    }

    #[test]
    fn empty_entities_omitted() {
        let c = Classification::default();
        assert_eq!(serde_json::to_string(&c).unwrap(), "{}");
    }
}
