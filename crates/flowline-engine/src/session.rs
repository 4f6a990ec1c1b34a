//! Session — the top-level orchestrator.
//!
//! A session owns a stack of runs (top = active), the current wait, and the
//! event log. The step pump walks the active run one node at a time:
//! execute the node's actions in declaration order, then consult its router
//! to pick an exit or install a wait. The pump never blocks on I/O itself —
//! service calls complete within an action, and the only suspension point
//! is wait installation, which returns control to the caller.
//!
//! Sessions are single-threaded cooperative: `start` and `resume` are not
//! reentrant and a session must not be driven from two contexts at once.
//! Persistence is the canonical serialized form and nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::assets::AssetCache;
use crate::context::StepCtx;
use crate::engine::Engine;
use crate::errors::EngineError;
use crate::events::{Event, EventPayload};
use crate::modifiers::Modifier;
use crate::routers::Routed;
use crate::run::Run;
use crate::triggers::Trigger;
use crate::types::{Contact, Environment, FlowDef, FlowRef, Input, ResultValue, RunStatus, SessionStatus};
use crate::waits::ActivatedWait;

/// Discriminator written into the serialized form.
const SESSION_TYPE: &str = "messaging";

/// A subflow queued by an `enter_flow` action, picked up by the pump after
/// the node's actions finish.
pub(crate) struct PushedFlow {
    pub flow: Arc<FlowDef>,
}

/// What kind of caller input a resume carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeKind {
    /// New input (message, dial result) — the waiting router routes its
    /// cases with the input in scope.
    Input,
    /// The wait's timeout elapsed — route through the timeout exit.
    WaitTimeout,
}

pub struct Session {
    pub(crate) uuid: Uuid,
    pub(crate) environment: Environment,
    pub(crate) trigger: Option<Trigger>,
    pub(crate) contact: Option<Contact>,
    pub(crate) runs: Vec<Run>,
    pub(crate) status: SessionStatus,
    pub(crate) wait: Option<ActivatedWait>,
    pub(crate) input: Option<Input>,

    pub(crate) engine: Arc<Engine>,
    pub(crate) assets: Arc<AssetCache>,

    pub(crate) events: Vec<Event>,
    pub(crate) modifier_log: Vec<Modifier>,
    pub(crate) pushed_flow: Option<PushedFlow>,
    interrupt_requested: bool,
}

impl Session {
    pub(crate) fn new(engine: Arc<Engine>, assets: Arc<AssetCache>, environment: Environment) -> Self {
        let uuid = engine.new_uuid();
        Self {
            uuid,
            environment,
            trigger: None,
            contact: None,
            runs: Vec::new(),
            status: SessionStatus::Active,
            wait: None,
            input: None,
            engine,
            assets,
            events: Vec::new(),
            modifier_log: Vec::new(),
            pushed_flow: None,
            interrupt_requested: false,
        }
    }

    // -- accessors --

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn wait(&self) -> Option<&ActivatedWait> {
        self.wait.as_ref()
    }

    pub fn input(&self) -> Option<&Input> {
        self.input.as_ref()
    }

    /// The cumulative event log for this in-memory session, in append
    /// order. Not part of the serialized form — events are output, not
    /// state.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Every contact modifier applied so far, for hosts that mirror
    /// contact changes to external storage.
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifier_log
    }

    /// Mark the session for interruption. The pump observes the flag at
    /// its next step; an in-flight service call is not cancelled.
    pub fn request_interrupt(&mut self) {
        self.interrupt_requested = true;
    }

    // -- lifecycle --

    /// Start the session from a trigger, with optional initial caller
    /// events (e.g. the message that triggered a channel flow).
    pub async fn start(
        &mut self,
        trigger: Trigger,
        caller_events: Vec<Event>,
    ) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::Ended);
        }
        if self.trigger.is_some() || !self.runs.is_empty() {
            return Err(EngineError::AlreadyStarted);
        }

        let flow = match self.assets.flow(trigger.flow().uuid).await {
            Ok(flow) => flow,
            Err(e) => {
                self.status = SessionStatus::Failed;
                return Err(e.into());
            }
        };

        self.contact = trigger.contact().cloned();
        self.trigger = Some(trigger);
        self.apply_caller_events(caller_events, None);
        self.push_run(flow.as_ref(), None);
        self.pump(None).await
    }

    /// Resume a waiting session with new caller events. The first event
    /// must satisfy the wait, report its timeout, or expire the session.
    pub async fn resume(&mut self, caller_events: Vec<Event>) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::Ended);
        }
        if self.status != SessionStatus::Waiting {
            return Err(EngineError::NotWaiting);
        }
        let wait = self
            .wait
            .clone()
            .ok_or_else(|| EngineError::InvalidSession("waiting session has no wait".into()))?;
        let first = caller_events
            .first()
            .ok_or_else(|| EngineError::InvalidResume("no caller events supplied".into()))?;

        // `None` means the session is being expired rather than resumed
        let kind = match &first.payload {
            EventPayload::RunExpired {} => None,
            EventPayload::WaitTimedOut {} => {
                if !wait.timed_out(self.engine.now()) {
                    return Err(EngineError::InvalidResume(
                        "wait timeout has not elapsed".into(),
                    ));
                }
                Some(ResumeKind::WaitTimeout)
            }
            payload if wait.accepts(payload) => Some(ResumeKind::Input),
            payload => {
                return Err(EngineError::InvalidResume(format!(
                    "event of type '{}' does not satisfy the current wait",
                    payload.type_name()
                )));
            }
        };

        let step_uuid = self.open_step_uuid();
        self.apply_caller_events(caller_events, step_uuid);

        let Some(kind) = kind else {
            self.expire_all();
            return Ok(());
        };

        self.wait = None;
        self.status = SessionStatus::Active;
        if let Some(run) = self
            .runs
            .iter_mut()
            .rev()
            .find(|r| r.status == RunStatus::Waiting)
        {
            run.status = RunStatus::Active;
            run.expires_on = None;
        }

        self.pump(Some(kind)).await
    }

    // -- the step pump --

    async fn pump(&mut self, mut resume: Option<ResumeKind>) -> Result<(), EngineError> {
        let limits = self.engine.limits();
        let mut total_steps: u32 = 0;
        let mut node_visits: HashMap<Uuid, u32> = HashMap::new();

        loop {
            if self.interrupt_requested {
                self.interrupt_all();
                return Ok(());
            }

            // the top of the stack is the last still-active run
            let Some(run_idx) = self.runs.iter().rposition(|r| r.status == RunStatus::Active)
            else {
                self.finalize();
                return Ok(());
            };

            let flow = match self.assets.flow(self.runs[run_idx].flow_uuid).await {
                Ok(flow) => flow,
                Err(e) => {
                    self.fail_session(format!("unable to load flow: {e}"));
                    return Err(e.into());
                }
            };

            // locate the node to visit, and whether this is a fresh arrival
            // or a re-entry (resume after wait, or return from a subflow)
            let (node_uuid, fresh_arrival) = if self.runs[run_idx].has_open_step() {
                let step = self.runs[run_idx].current_step().expect("open step");
                (step.node_uuid, false)
            } else if let Some(step) = self.runs[run_idx].current_step() {
                let exit_uuid = step.exit_uuid.expect("closed step has an exit");
                let destination = flow
                    .node(step.node_uuid)
                    .and_then(|n| n.exit(exit_uuid))
                    .and_then(|e| e.destination_uuid);
                match destination {
                    Some(dest) => (dest, true),
                    None => {
                        let now = self.engine.now();
                        self.runs[run_idx].exit(RunStatus::Completed, now);
                        continue;
                    }
                }
            } else {
                match flow.entry() {
                    Some(node) => (node.uuid, true),
                    None => {
                        let now = self.engine.now();
                        self.runs[run_idx].exit(RunStatus::Completed, now);
                        continue;
                    }
                }
            };

            let Some(node) = flow.node(node_uuid) else {
                self.fail_session(format!("run references unknown node {node_uuid}"));
                return Err(EngineError::InvalidSession(format!(
                    "unknown node {node_uuid}"
                )));
            };

            // loop protection
            if fresh_arrival {
                total_steps += 1;
                let visits = node_visits.entry(node_uuid).or_insert(0);
                *visits += 1;
                if total_steps > limits.max_steps_per_sprint || *visits > limits.max_node_visits {
                    self.fail_session(format!("flow loop detected at node {node_uuid}"));
                    return Err(EngineError::LoopDetected { node_uuid });
                }
            }

            // arrival: open a step and execute the node's actions in order
            if fresh_arrival {
                let step_uuid = self.engine.new_uuid();
                let now = self.engine.now();
                self.runs[run_idx].open_step(step_uuid, node_uuid, now);

                for action in &node.actions {
                    let mut ctx = StepCtx::new(self, run_idx, step_uuid, node_uuid);
                    if let Err(e) = action.execute(&mut ctx).await {
                        self.fail_session(e.to_string());
                        return Err(e);
                    }
                    if self.runs[run_idx].status != RunStatus::Active {
                        break;
                    }
                }

                if self.runs[run_idx].status != RunStatus::Active {
                    continue;
                }

                // an enter_flow action queued a child — run it before routing
                if let Some(pushed) = self.pushed_flow.take() {
                    let parent_uuid = self.runs[run_idx].uuid;
                    self.push_run(pushed.flow.as_ref(), Some(parent_uuid));
                    continue;
                }
            }

            let step_uuid = self.runs[run_idx].current_step().map(|s| s.uuid);

            // routing
            let routed = match &node.router {
                None => match node.exits.first() {
                    Some(exit) => Routed {
                        exit_uuid: exit.uuid,
                        category: None,
                        value: None,
                        errors: Vec::new(),
                    },
                    None => {
                        let now = self.engine.now();
                        self.runs[run_idx].exit(RunStatus::Completed, now);
                        continue;
                    }
                },
                Some(router) => {
                    // a router with a wait suspends on first arrival
                    if fresh_arrival {
                        if let Some(wait) = router.wait() {
                            let now = self.engine.now();
                            let activated = wait.activate(node_uuid, now);
                            self.log_event(
                                activated.announce(wait.timeout().map(|t| t.seconds)),
                                step_uuid,
                            );
                            self.runs[run_idx].status = RunStatus::Waiting;
                            self.runs[run_idx].expires_on = activated.expires_on;
                            self.wait = Some(activated);
                            self.status = SessionStatus::Waiting;
                            return Ok(());
                        }
                    }

                    let result = if resume == Some(ResumeKind::WaitTimeout) && !fresh_arrival {
                        resume = None;
                        match router.route_timeout() {
                            Some(routed) => Ok(routed),
                            None => {
                                // no timeout exit configured — the run expires
                                let now = self.engine.now();
                                self.runs[run_idx].exit(RunStatus::Expired, now);
                                continue;
                            }
                        }
                    } else {
                        resume = None;
                        let context = self.build_context(run_idx).await;
                        self.engine.with_rng(|rng| router.route(node, &context, rng))
                    };

                    match result {
                        Ok(routed) => {
                            for error in &routed.errors {
                                self.log_event(
                                    EventPayload::Error {
                                        text: error.to_string(),
                                    },
                                    step_uuid,
                                );
                            }
                            if let Some(name) = router.result_name() {
                                let result = ResultValue {
                                    name: name.to_string(),
                                    value: routed.value.clone().unwrap_or_default(),
                                    category: routed.category.clone(),
                                    category_localized: None,
                                    input: routed.value.clone(),
                                    node_uuid,
                                    created_on: self.engine.now(),
                                    extra: None,
                                };
                                self.save_result(run_idx, step_uuid, result);
                            }
                            routed
                        }
                        Err(e) => {
                            self.log_event(
                                EventPayload::Error {
                                    text: format!("routing failed: {e}"),
                                },
                                step_uuid,
                            );
                            let now = self.engine.now();
                            self.runs[run_idx].exit(RunStatus::Failed, now);
                            continue;
                        }
                    }
                }
            };

            // leave the node: close the step and follow the exit
            self.runs[run_idx].close_step(routed.exit_uuid);
            let destination = node
                .exit(routed.exit_uuid)
                .and_then(|e| e.destination_uuid);
            if destination.is_none() {
                let now = self.engine.now();
                self.runs[run_idx].exit(RunStatus::Completed, now);
            }
        }
    }

    // -- pump support --

    fn push_run(&mut self, flow: &FlowDef, parent_uuid: Option<Uuid>) {
        let run = Run::new(self.engine.new_uuid(), flow.uuid, parent_uuid, self.engine.now());
        self.log_event(
            EventPayload::FlowEntered {
                flow: flow.reference(),
                parent_run_uuid: parent_uuid,
            },
            None,
        );
        self.runs.push(run);
    }

    fn apply_caller_events(&mut self, caller_events: Vec<Event>, step_uuid: Option<Uuid>) {
        for mut event in caller_events {
            event.from_caller = true;
            event.step_uuid = step_uuid;
            if let EventPayload::MsgReceived { msg } = &event.payload {
                self.input = Some(Input {
                    uuid: self.engine.new_uuid(),
                    created_on: event.created_on,
                    channel: msg.channel.clone(),
                    urn: msg.urn.clone(),
                    text: msg.text.clone(),
                    attachments: msg.attachments.clone(),
                });
            }
            self.events.push(event);
        }
    }

    fn open_step_uuid(&self) -> Option<Uuid> {
        self.runs
            .iter()
            .rev()
            .find(|r| r.status == RunStatus::Waiting)
            .and_then(|r| r.current_step())
            .map(|s| s.uuid)
    }

    pub(crate) fn log_event(&mut self, payload: EventPayload, step_uuid: Option<Uuid>) {
        let mut event = Event::new(payload, self.engine.now());
        event.step_uuid = step_uuid;
        self.events.push(event);
    }

    pub(crate) fn save_result(
        &mut self,
        run_idx: usize,
        step_uuid: Option<Uuid>,
        result: ResultValue,
    ) {
        self.log_event(
            EventPayload::RunResultChanged {
                name: result.name.clone(),
                value: result.value.clone(),
                category: result.category.clone(),
                category_localized: result.category_localized.clone(),
                input: result.input.clone(),
                extra: result.extra.clone(),
            },
            step_uuid,
        );
        self.runs[run_idx].set_result(result);
    }

    fn fail_session(&mut self, text: String) {
        tracing::warn!(session = %self.uuid, error = %text, "session failed");
        self.log_event(EventPayload::Failure { text }, None);
        let now = self.engine.now();
        for run in &mut self.runs {
            if !run.status.is_terminal() {
                run.exit(RunStatus::Failed, now);
            }
        }
        self.status = SessionStatus::Failed;
        self.wait = None;
    }

    fn interrupt_all(&mut self) {
        let now = self.engine.now();
        for run in &mut self.runs {
            if !run.status.is_terminal() {
                run.exit(RunStatus::Interrupted, now);
            }
        }
        self.status = SessionStatus::Interrupted;
        self.wait = None;
    }

    fn expire_all(&mut self) {
        let now = self.engine.now();
        for run in &mut self.runs {
            if !run.status.is_terminal() {
                run.exit(RunStatus::Expired, now);
            }
        }
        self.status = SessionStatus::Completed;
        self.wait = None;
    }

    /// Terminal bookkeeping once the stack has drained.
    fn finalize(&mut self) {
        self.status = match self.runs.first() {
            Some(root) if root.status == RunStatus::Failed => SessionStatus::Failed,
            _ => SessionStatus::Completed,
        };
        self.wait = None;
    }

    // -- expression context --

    /// Assemble the nested mapping expressions evaluate against: contact,
    /// run, parent, child, results, input, trigger and the webhook scratch
    /// value. Result writes earlier in a step are visible here.
    pub(crate) async fn build_context(&self, run_idx: usize) -> Value {
        let run = &self.runs[run_idx];

        let parent = run
            .parent_uuid
            .and_then(|uuid| self.runs.iter().find(|r| r.uuid == uuid));
        let child = self
            .runs
            .iter()
            .rev()
            .find(|r| r.parent_uuid == Some(run.uuid) && r.status.is_terminal());

        let mut context = Map::new();
        context.insert(
            "contact".into(),
            match &self.contact {
                Some(contact) => contact.to_context(self.environment.redaction_policy),
                None => Value::Null,
            },
        );
        context.insert(
            "run".into(),
            run.to_context(self.flow_ref(run.flow_uuid).await.as_ref()),
        );
        context.insert(
            "parent".into(),
            match parent {
                Some(parent) => {
                    parent.to_context(self.flow_ref(parent.flow_uuid).await.as_ref())
                }
                None => Value::Null,
            },
        );
        context.insert(
            "child".into(),
            match child {
                Some(child) => child.to_context(self.flow_ref(child.flow_uuid).await.as_ref()),
                None => Value::Null,
            },
        );
        context.insert("results".into(), run.results_values());
        context.insert(
            "input".into(),
            match &self.input {
                Some(input) => input.to_context(),
                None => Value::Null,
            },
        );
        context.insert(
            "trigger".into(),
            match &self.trigger {
                Some(trigger) => trigger.to_context(),
                None => Value::Null,
            },
        );
        context.insert(
            "webhook".into(),
            run.webhook.clone().unwrap_or(Value::Null),
        );
        Value::Object(context)
    }

    async fn flow_ref(&self, uuid: Uuid) -> Option<FlowRef> {
        self.assets.flow(uuid).await.ok().map(|f| f.reference())
    }

    // -- serialization --

    /// The canonical serialized form: stable key order, RFC3339 timestamps.
    /// `serialize(deserialize(bytes))` reproduces `bytes` exactly.
    pub fn serialize(&self) -> Result<Vec<u8>, EngineError> {
        let trigger = self
            .trigger
            .clone()
            .ok_or_else(|| EngineError::InvalidSession("session has not been started".into()))?;
        let envelope = SessionEnvelope {
            uuid: self.uuid,
            session_type: SESSION_TYPE.into(),
            environment: self.environment.clone(),
            trigger,
            contact: self.contact.clone(),
            runs: self.runs.clone(),
            status: self.status,
            wait: self.wait.clone(),
            input: self.input.clone(),
        };
        serde_json::to_vec(&envelope).map_err(|e| EngineError::InvalidSession(e.to_string()))
    }

    pub(crate) fn deserialize(
        engine: Arc<Engine>,
        assets: Arc<AssetCache>,
        json: &[u8],
    ) -> Result<Self, EngineError> {
        let envelope: SessionEnvelope = serde_json::from_slice(json)
            .map_err(|e| EngineError::InvalidSession(e.to_string()))?;
        if envelope.status == SessionStatus::Waiting && envelope.wait.is_none() {
            return Err(EngineError::InvalidSession(
                "waiting session has no wait".into(),
            ));
        }
        Ok(Self {
            uuid: envelope.uuid,
            environment: envelope.environment,
            trigger: Some(envelope.trigger),
            contact: envelope.contact,
            runs: envelope.runs,
            status: envelope.status,
            wait: envelope.wait,
            input: envelope.input,
            engine,
            assets,
            events: Vec::new(),
            modifier_log: Vec::new(),
            pushed_flow: None,
            interrupt_requested: false,
        })
    }
}

/// The persisted shape of a session.
#[derive(Serialize, Deserialize)]
struct SessionEnvelope {
    uuid: Uuid,
    #[serde(rename = "type")]
    session_type: String,
    environment: Environment,
    trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contact: Option<Contact>,
    runs: Vec<Run>,
    status: SessionStatus,
    wait: Option<ActivatedWait>,
    input: Option<Input>,
}
