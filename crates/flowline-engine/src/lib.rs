//! flowline-engine — deterministic, resumable execution of conversational
//! flows.
//!
//! A flow is a directed graph of nodes; this crate provides the state
//! machine that walks it: sessions step nodes, execute actions, evaluate
//! routers, suspend on waits, and resume on caller input. Every observable
//! side effect is an entry in an append-only event log, and the canonical
//! serialized session is the sole persistent state — `serialize` after
//! `deserialize` is a byte-for-byte identity.
//!
//! The engine is designed to be embedded and performs no I/O of its own:
//! webhooks, email, NLU and the rest are injected capabilities, and all
//! nondeterminism (UUIDs, time, randomness) flows through injectable
//! collaborators so executions can be replayed exactly.

pub mod actions;
pub mod assets;
pub(crate) mod context;
pub mod defaults;
pub mod engine;
pub mod errors;
pub mod events;
pub mod expression;
pub mod modifiers;
pub mod routers;
pub mod run;
pub mod services;
pub mod session;
pub mod test_support;
pub mod triggers;
pub mod types;
pub mod waits;

// Re-export the working set at the crate level.

// engine
pub use engine::{Clock, Engine, EngineBuilder, Limits, UuidGenerator};

// errors
pub use errors::EngineError;

// session + runs
pub use run::{Run, Step};
pub use session::Session;

// assets
pub use assets::{
    AssetCache, AssetCacheBounds, AssetCacheConfig, AssetError, AssetSource, AssetType,
    StaticAssetSource,
};

// events + triggers + waits
pub use events::{Event, EventPayload, MsgIn, MsgOut};
pub use triggers::{CampaignRef, Trigger};
pub use waits::{ActivatedWait, Wait, WaitKind, WaitTimeout};

// routers + modifiers
pub use modifiers::{GroupModification, Modifier};
pub use routers::{Case, RandomRouter, Router, SwitchRouter};

// services
pub use services::{
    AirtimeService, AirtimeTransfer, Classification, ClassificationService, EmailService, Entity,
    ExternalService, Intent, MsgCatalogService, ServiceError, ServiceFactories, Ticket,
    TicketService, WebhookRequest, WebhookService,
};

// defaults
pub use defaults::{DefaultUuidGenerator, HttpWebhookService, SystemClock};

// core types
pub use types::{
    CallStatus, ChannelRef, ClassifierRef, Contact, Environment, Exit, FieldRef, FlowDef, FlowRef,
    GroupRef, Input, Node, RedactionPolicy, ResultValue, RunStatus, SessionStatus, TicketerRef,
    Urn, WebhookCall,
};
