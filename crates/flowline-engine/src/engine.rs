//! The engine — shared services, limits, and injectable collaborators.
//!
//! An [`Engine`] is cheap to share and long-lived; sessions borrow it for
//! their whole life. Everything non-deterministic flows through it — UUIDs,
//! timestamps, randomness, outbound I/O — so tests can seed all of it and
//! replay byte-identical sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::assets::AssetCache;
use crate::errors::EngineError;
use crate::services::{
    AirtimeServiceFactory, ClassificationServiceFactory, EmailServiceFactory,
    ExternalServiceFactory, MsgCatalogServiceFactory, ServiceFactories, TicketServiceFactory,
    WebhookServiceFactory,
};
use crate::session::Session;
use crate::types::Environment;

// ---------------------------------------------------------------------------
// Injectable collaborators
// ---------------------------------------------------------------------------

/// Where step and run UUIDs come from.
pub trait UuidGenerator: Send + Sync {
    fn next(&self) -> Uuid;
}

/// Where timestamps come from.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Loop-protection bounds enforced by the step pump.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Node visits allowed in one start/resume before the session fails.
    pub max_steps_per_sprint: u32,
    /// Visits to the same node without an intervening wait.
    pub max_node_visits: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps_per_sprint: 10_000,
            max_node_visits: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    services: ServiceFactories,
    limits: Limits,
    uuids: Arc<dyn UuidGenerator>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn services(&self) -> &ServiceFactories {
        &self.services
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub(crate) fn new_uuid(&self) -> Uuid {
        self.uuids.next()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut self.rng.lock())
    }

    /// Create a fresh session bound to this engine.
    pub fn new_session(self: &Arc<Self>, assets: Arc<AssetCache>, environment: Environment) -> Session {
        Session::new(self.clone(), assets, environment)
    }

    /// Rehydrate a session from its canonical serialized form.
    pub fn read_session(
        self: &Arc<Self>,
        assets: Arc<AssetCache>,
        json: &[u8],
    ) -> Result<Session, EngineError> {
        Session::deserialize(self.clone(), assets, json)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct EngineBuilder {
    services: ServiceFactories,
    limits: Limits,
    uuids: Arc<dyn UuidGenerator>,
    clock: Arc<dyn Clock>,
    rng_seed: Option<u64>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            services: ServiceFactories::empty(),
            limits: Limits::default(),
            uuids: Arc::new(crate::defaults::DefaultUuidGenerator),
            clock: Arc::new(crate::defaults::SystemClock),
            rng_seed: None,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_uuid_generator(mut self, uuids: Arc<dyn UuidGenerator>) -> Self {
        self.uuids = uuids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the router RNG for reproducible random-router picks.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_webhook_service(mut self, factory: WebhookServiceFactory) -> Self {
        self.services.webhook = factory;
        self
    }

    pub fn with_email_service(mut self, factory: EmailServiceFactory) -> Self {
        self.services.email = factory;
        self
    }

    pub fn with_classification_service(mut self, factory: ClassificationServiceFactory) -> Self {
        self.services.classification = factory;
        self
    }

    pub fn with_ticket_service(mut self, factory: TicketServiceFactory) -> Self {
        self.services.ticket = factory;
        self
    }

    pub fn with_airtime_service(mut self, factory: AirtimeServiceFactory) -> Self {
        self.services.airtime = factory;
        self
    }

    pub fn with_external_service(mut self, factory: ExternalServiceFactory) -> Self {
        self.services.external = factory;
        self
    }

    pub fn with_msg_catalog_service(mut self, factory: MsgCatalogServiceFactory) -> Self {
        self.services.msg_catalog = factory;
        self
    }

    pub fn build(self) -> Arc<Engine> {
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Arc::new(Engine {
            services: self.services,
            limits: self.limits,
            uuids: self.uuids,
            clock: self.clock,
            rng: Mutex::new(rng),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_steps_per_sprint, 10_000);
        assert_eq!(limits.max_node_visits, 100);
    }

    #[test]
    fn builder_produces_engine_with_error_services() {
        let engine = Engine::builder().build();
        let assets = Arc::new(AssetCache::new(Arc::new(
            crate::assets::StaticAssetSource::new(),
        )));
        let session = engine.new_session(assets, Environment::default());
        assert!(engine.services().webhook(&session).is_err());
        assert!(engine.services().email(&session).is_err());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        use rand::Rng;
        let picks = |seed: u64| -> Vec<u32> {
            let engine = Engine::builder().with_rng_seed(seed).build();
            (0..5)
                .map(|_| engine.with_rng(|rng| rng.gen_range(0..100)))
                .collect()
        };
        assert_eq!(picks(99), picks(99));
    }
}
