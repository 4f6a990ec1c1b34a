//! Per-flow execution frame.
//!
//! A [`Run`] records one execution of one flow within a session: the path
//! of steps taken, the results saved along the way, and the webhook scratch
//! value used as implicit input to later expressions. Parent/child
//! relationships are UUID references into the session's run list so the
//! serialized form is a pure tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::types::{slugify, FlowRef, ResultValue, Results, RunStatus};

/// One visit to one node. The step stays open (no exit) until the run
/// leaves the node — across a wait or a subflow, that can span resumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub uuid: Uuid,
    pub node_uuid: Uuid,
    pub arrived_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_uuid: Option<Uuid>,
}

/// A single execution of a single flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub uuid: Uuid,
    pub flow_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<Uuid>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Step>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub results: Results,
    /// Parsed body of the last webhook call, exposed to expressions as
    /// `webhook`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<Value>,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(
        uuid: Uuid,
        flow_uuid: Uuid,
        parent_uuid: Option<Uuid>,
        created_on: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid,
            flow_uuid,
            parent_uuid,
            status: RunStatus::Active,
            path: Vec::new(),
            results: Results::new(),
            webhook: None,
            created_on,
            exited_on: None,
            expires_on: None,
        }
    }

    /// The step currently being visited, if the run has ever stepped.
    pub fn current_step(&self) -> Option<&Step> {
        self.path.last()
    }

    /// Whether the last step is still open — the run is mid-node, waiting
    /// on input or a subflow.
    pub fn has_open_step(&self) -> bool {
        self.path.last().is_some_and(|s| s.exit_uuid.is_none())
    }

    /// Append a new step for arrival at `node_uuid`.
    pub fn open_step(&mut self, step_uuid: Uuid, node_uuid: Uuid, now: DateTime<Utc>) {
        debug_assert!(!self.has_open_step(), "previous step must be closed");
        self.path.push(Step {
            uuid: step_uuid,
            node_uuid,
            arrived_on: now,
            exit_uuid: None,
        });
    }

    /// Close the open step with the chosen exit.
    pub fn close_step(&mut self, exit_uuid: Uuid) {
        if let Some(step) = self.path.last_mut() {
            step.exit_uuid = Some(exit_uuid);
        }
    }

    /// Save a result, keyed by the slug-normalized name. Last write wins.
    pub fn set_result(&mut self, result: ResultValue) {
        self.results.insert(slugify(&result.name), result);
    }

    pub fn result(&self, name: &str) -> Option<&ResultValue> {
        self.results.get(&slugify(name))
    }

    pub fn set_webhook(&mut self, value: Option<Value>) {
        self.webhook = value;
    }

    /// Transition to a terminal status.
    pub fn exit(&mut self, status: RunStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.exited_on = Some(now);
    }

    /// Results as full objects keyed by slug, for `run.results.<key>.<field>`
    /// access and for projection into resthook payloads.
    pub fn results_detail(&self) -> Value {
        let mut map = Map::new();
        for (key, result) in &self.results {
            map.insert(
                key.clone(),
                json!({
                    "name": result.name,
                    "value": result.value,
                    "category": result.category,
                    "category_localized": result.category_localized,
                    "created_on": result.created_on,
                    "input": result.input,
                    "node_uuid": result.node_uuid,
                }),
            );
        }
        Value::Object(map)
    }

    /// Results as bare values keyed by slug, the `results.<key>` shorthand.
    pub fn results_values(&self) -> Value {
        let mut map = Map::new();
        for (key, result) in &self.results {
            map.insert(key.clone(), Value::String(result.value.clone()));
        }
        Value::Object(map)
    }

    /// The mapping exposed to expressions as `run` (and `parent` / `child`
    /// for related runs).
    pub fn to_context(&self, flow: Option<&FlowRef>) -> Value {
        json!({
            "uuid": self.uuid,
            "flow": flow,
            "status": self.status.as_str(),
            "created_on": self.created_on,
            "exited_on": self.exited_on,
            "results": self.results_detail(),
        })
    }

    /// Compact summary used by `session_triggered` payloads.
    pub fn summary(&self, flow: Option<&FlowRef>) -> Value {
        json!({
            "uuid": self.uuid,
            "flow": flow,
            "status": self.status.as_str(),
            "results": self.results_values(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_u128(n as u128)
    }

    fn run() -> Run {
        Run::new(uuid(1), uuid(2), None, Utc::now())
    }

    fn result(name: &str, value: &str) -> ResultValue {
        ResultValue {
            name: name.into(),
            value: value.into(),
            category: Some("All Responses".into()),
            category_localized: None,
            input: Some(value.into()),
            node_uuid: uuid(9),
            created_on: Utc::now(),
            extra: None,
        }
    }

    #[test]
    fn steps_open_and_close() {
        let mut r = run();
        assert!(!r.has_open_step());
        r.open_step(uuid(10), uuid(20), Utc::now());
        assert!(r.has_open_step());
        r.close_step(uuid(30));
        assert!(!r.has_open_step());
        assert_eq!(r.path.len(), 1);
        assert_eq!(r.path[0].exit_uuid, Some(uuid(30)));
    }

    #[test]
    fn results_keyed_by_slug_last_write_wins() {
        let mut r = run();
        r.set_result(result("Favorite Color", "blue"));
        r.set_result(result("favorite color", "red"));
        assert_eq!(r.results.len(), 1);
        assert_eq!(r.result("Favorite Color").unwrap().value, "red");
        assert!(r.results.contains_key("favorite_color"));
    }

    #[test]
    fn results_values_are_bare_strings() {
        let mut r = run();
        r.set_result(result("Name", "Bob"));
        assert_eq!(r.results_values(), json!({"name": "Bob"}));
    }

    #[test]
    fn exit_sets_terminal_state() {
        let mut r = run();
        r.exit(RunStatus::Completed, Utc::now());
        assert_eq!(r.status, RunStatus::Completed);
        assert!(r.exited_on.is_some());
    }

    #[test]
    fn run_round_trip() {
        let mut r = run();
        r.open_step(uuid(10), uuid(20), Utc::now());
        r.set_result(result("Age", "27"));
        r.set_webhook(Some(json!({"ok": true})));
        let encoded = serde_json::to_string(&r).unwrap();
        let rt: Run = serde_json::from_str(&encoded).unwrap();
        assert_eq!(r, rt);
    }

    #[test]
    fn context_exposes_status_string() {
        let mut r = run();
        r.exit(RunStatus::Expired, Utc::now());
        let ctx = r.to_context(None);
        assert_eq!(ctx["status"], json!("expired"));
    }
}
