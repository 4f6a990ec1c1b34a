//! Per-step execution context handed to actions.
//!
//! A [`StepCtx`] scopes one action invocation to its session, run and step.
//! It is the only way actions touch the outside world: template evaluation,
//! event logging, result writes, contact modifiers, and service resolution
//! all go through here, which is what keeps event ordering and run
//! mutations consistent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::assets::{AssetCache, Classifier, Ticketer};
use crate::events::EventPayload;
use crate::expression;
use crate::modifiers::Modifier;
use crate::run::Run;
use crate::services::{
    AirtimeService, ClassificationService, EmailService, ServiceError, TicketService,
    WebhookService,
};
use crate::session::{PushedFlow, Session};
use crate::types::{Contact, FlowDef, Input, ResultValue, RunStatus};

pub(crate) struct StepCtx<'a> {
    session: &'a mut Session,
    run_idx: usize,
    step_uuid: Uuid,
    node_uuid: Uuid,
}

impl<'a> StepCtx<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        run_idx: usize,
        step_uuid: Uuid,
        node_uuid: Uuid,
    ) -> Self {
        Self {
            session,
            run_idx,
            step_uuid,
            node_uuid,
        }
    }

    // -- reads --

    pub(crate) fn session(&self) -> &Session {
        self.session
    }

    pub(crate) fn run(&self) -> &Run {
        &self.session.runs[self.run_idx]
    }

    pub(crate) fn contact(&self) -> Option<&Contact> {
        self.session.contact.as_ref()
    }

    pub(crate) fn input(&self) -> Option<&Input> {
        self.session.input.as_ref()
    }

    pub(crate) fn assets(&self) -> Arc<AssetCache> {
        self.session.assets.clone()
    }

    pub(crate) fn new_uuid(&self) -> Uuid {
        self.session.engine.new_uuid()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.session.engine.now()
    }

    // -- templates --

    /// Evaluate a template against the current run context. Evaluation
    /// errors become `error` events and the offending splice renders
    /// empty — actions keep going unless the value is semantically
    /// required.
    pub(crate) async fn eval_template(&mut self, template: &str) -> String {
        let context = self.session.build_context(self.run_idx).await;
        let out = expression::evaluate_template(template, &context);
        for error in out.errors {
            self.log_error(error.to_string());
        }
        out.text
    }

    // -- writes --

    pub(crate) fn log_event(&mut self, payload: EventPayload) {
        self.session.log_event(payload, Some(self.step_uuid));
    }

    pub(crate) fn log_error(&mut self, text: String) {
        self.log_event(EventPayload::Error { text });
    }

    /// Record an unrecoverable fault on this run and stop it. The session
    /// may continue if an ancestor routes on the failure.
    pub(crate) fn fail_run(&mut self, text: String) {
        self.log_event(EventPayload::Failure { text });
        let now = self.now();
        self.session.runs[self.run_idx].exit(RunStatus::Failed, now);
    }

    /// Save a result on the current run and emit `run_result_changed`.
    pub(crate) fn set_result(
        &mut self,
        name: &str,
        value: String,
        category: Option<String>,
        input: Option<String>,
        extra: Option<Value>,
    ) {
        let result = ResultValue {
            name: name.to_string(),
            value,
            category,
            category_localized: None,
            input,
            node_uuid: self.node_uuid,
            created_on: self.now(),
            extra,
        };
        self.session
            .save_result(self.run_idx, Some(self.step_uuid), result);
    }

    pub(crate) fn set_webhook(&mut self, value: Option<Value>) {
        self.session.runs[self.run_idx].set_webhook(value);
    }

    /// Apply a contact modifier, auditing it and emitting the matching
    /// `contact_*` event. A session without a contact logs an error
    /// instead.
    pub(crate) fn apply_modifier(&mut self, modifier: Modifier) {
        let Some(contact) = self.session.contact.as_mut() else {
            self.log_error("session has no contact to modify".into());
            return;
        };
        let event = modifier.apply(contact);
        self.session.modifier_log.push(modifier);
        if let Some(payload) = event {
            self.log_event(payload);
        }
    }

    /// Queue a subflow. The pump pushes the child run once this node's
    /// actions finish.
    pub(crate) fn push_flow(&mut self, flow: Arc<FlowDef>) {
        self.session.pushed_flow = Some(PushedFlow { flow });
    }

    // -- services --

    pub(crate) fn webhook_service(&self) -> Result<Arc<dyn WebhookService>, ServiceError> {
        let engine = self.session.engine.clone();
        engine.services().webhook(self.session)
    }

    pub(crate) fn email_service(&self) -> Result<Arc<dyn EmailService>, ServiceError> {
        let engine = self.session.engine.clone();
        engine.services().email(self.session)
    }

    pub(crate) fn classification_service(
        &self,
        classifier: &Classifier,
    ) -> Result<Arc<dyn ClassificationService>, ServiceError> {
        let engine = self.session.engine.clone();
        engine.services().classification(self.session, classifier)
    }

    pub(crate) fn ticket_service(
        &self,
        ticketer: &Ticketer,
    ) -> Result<Arc<dyn TicketService>, ServiceError> {
        let engine = self.session.engine.clone();
        engine.services().ticket(self.session, ticketer)
    }

    pub(crate) fn airtime_service(&self) -> Result<Arc<dyn AirtimeService>, ServiceError> {
        let engine = self.session.engine.clone();
        engine.services().airtime(self.session)
    }
}
