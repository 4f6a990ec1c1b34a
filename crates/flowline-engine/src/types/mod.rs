//! Foundational types shared across the engine.
//!
//! Every serialized type here is `Serialize + Deserialize + Debug + Clone`.
//! All map fields use `BTreeMap` (never `HashMap`) so the canonical session
//! JSON has deterministic key order — the persistence contract is a
//! byte-for-byte round trip, not a style choice.

pub mod contact;
pub mod flow;

pub use contact::*;
pub use flow::*;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionStatus {
    Active,
    Waiting,
    Completed,
    Interrupted,
    Failed,
}

impl SessionStatus {
    /// Whether the session can no longer be stepped.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }
}

/// Lifecycle status of a single flow run within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RunStatus {
    Active,
    Waiting,
    Completed,
    Interrupted,
    Expired,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active | Self::Waiting)
    }

    /// The status string exposed to router expressions (`child.status`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook calls
// ---------------------------------------------------------------------------

/// Outcome classification of a webhook or resthook subscriber call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CallStatus {
    Success,
    ResponseError,
    ConnectionError,
    SubscriberGone,
}

/// Record of one HTTP call made on behalf of a flow.
///
/// `request` and `response` are textual dumps suitable for display and
/// auditing; `status_code` 0 means the connection itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookCall {
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub request: String,
    pub response: String,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resthook: Option<String>,
}

impl WebhookCall {
    /// Classify this call. Resthook subscriber calls treat HTTP 410 as the
    /// subscriber unsubscribing rather than an error.
    pub fn status(&self, is_resthook: bool) -> CallStatus {
        if self.status_code == 0 {
            return CallStatus::ConnectionError;
        }
        if is_resthook && self.status_code == 410 {
            return CallStatus::SubscriberGone;
        }
        if self.status_code / 100 == 2 {
            return CallStatus::Success;
        }
        CallStatus::ResponseError
    }

    /// The response body portion of the textual dump, parsed as JSON if
    /// possible. Used to populate the run's webhook scratch value.
    pub fn response_json(&self) -> Option<serde_json::Value> {
        let body = match self.response.find("\r\n\r\n") {
            Some(idx) => &self.response[idx + 4..],
            None => self.response.as_str(),
        };
        serde_json::from_str(body.trim()).ok()
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// What personally identifying information is redacted from logs and
/// serialized output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RedactionPolicy {
    #[default]
    None,
    Urns,
}

/// Session-scoped evaluation environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// IANA timezone name, e.g. `America/Guayaquil`.
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_languages: Vec<String>,
    #[serde(default)]
    pub redaction_policy: RedactionPolicy,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            allowed_languages: Vec::new(),
            redaction_policy: RedactionPolicy::None,
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Reference to a flow asset by UUID, with the name denormalized for
/// human-readable logs and payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketerRef {
    pub uuid: Uuid,
    pub name: String,
}

/// Reference to a contact field by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub key: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// The last incoming message, kept on the session and exposed to
/// expressions as `input`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub uuid: Uuid,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Input {
    pub fn to_context(&self) -> serde_json::Value {
        serde_json::json!({
            "uuid": self.uuid,
            "created_on": self.created_on,
            "channel": self.channel,
            "urn": self.urn,
            "text": self.text,
            "attachments": self.attachments,
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A named value saved on a run, with the category and input that produced
/// it and the node it originated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultValue {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub node_uuid: Uuid,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Normalize a result name into its storage key: lowercase, runs of
/// non-alphanumerics collapsed to a single underscore.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Map of result key → result, used by runs and projected into payloads.
pub type Results = BTreeMap<String, ResultValue>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_status_mapping() {
        let call = |code: u16| WebhookCall {
            url: "http://x".into(),
            method: "GET".into(),
            status_code: code,
            request: String::new(),
            response: String::new(),
            elapsed_ms: 0,
            resthook: None,
        };
        assert_eq!(call(200).status(false), CallStatus::Success);
        assert_eq!(call(201).status(false), CallStatus::Success);
        assert_eq!(call(400).status(false), CallStatus::ResponseError);
        assert_eq!(call(500).status(false), CallStatus::ResponseError);
        assert_eq!(call(0).status(false), CallStatus::ConnectionError);
        assert_eq!(call(410).status(false), CallStatus::ResponseError);
        assert_eq!(call(410).status(true), CallStatus::SubscriberGone);
        assert_eq!(call(200).status(true), CallStatus::Success);
    }

    #[test]
    fn response_json_extracts_body_after_headers() {
        let call = WebhookCall {
            url: "http://x".into(),
            method: "GET".into(),
            status_code: 200,
            request: String::new(),
            response: "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"ok\":true}"
                .into(),
            elapsed_ms: 1,
            resthook: None,
        };
        assert_eq!(call.response_json(), Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn response_json_non_json_is_none() {
        let call = WebhookCall {
            url: "http://x".into(),
            method: "GET".into(),
            status_code: 200,
            request: String::new(),
            response: "HTTP/1.1 200 OK\r\n\r\nhello there".into(),
            elapsed_ms: 1,
            resthook: None,
        };
        assert_eq!(call.response_json(), None);
    }

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("Favorite Color"), "favorite_color");
        assert_eq!(slugify("  2Factor Code!!"), "2factor_code");
        assert_eq!(slugify("Age"), "age");
        assert_eq!(slugify("a--b"), "a_b");
    }

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(
            serde_json::to_string(&RunStatus::Interrupted).unwrap(),
            "\"interrupted\""
        );
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Waiting.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
    }
}
