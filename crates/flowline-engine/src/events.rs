//! Domain events — the append-only record of everything a session did.
//!
//! Events are the sole externally observable output of the engine. The
//! envelope is `{type, created_on, step_uuid?, …payload}`; the payload is a
//! closed tagged union and unknown types fail deserialization. Events are
//! ordered by append; `created_on` is monotonic within a session but two
//! events may share a timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::services::Classification;
use crate::types::{
    CallStatus, ChannelRef, ClassifierRef, Contact, FieldRef, FlowRef, GroupRef, TicketerRef, Urn,
};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// An outgoing message created by a `send_msg` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgOut {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelRef>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// An incoming message supplied by the caller on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgIn {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelRef>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_uuid: Option<Uuid>,
    /// True for events injected by the caller (`msg_received` etc.) rather
    /// than emitted by the engine. Not part of the wire form.
    #[serde(skip)]
    pub from_caller: bool,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload, created_on: DateTime<Utc>) -> Self {
        Self {
            created_on,
            step_uuid: None,
            from_caller: false,
            payload,
        }
    }

    /// The type discriminator, as serialized.
    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}

/// The typed payloads of every event the engine can record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventPayload {
    /// A run began executing a flow.
    FlowEntered {
        flow: FlowRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_run_uuid: Option<Uuid>,
    },
    MsgCreated {
        msg: MsgOut,
    },
    MsgReceived {
        msg: MsgIn,
    },
    /// The session suspended awaiting a message.
    MsgWait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_seconds: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_on: Option<DateTime<Utc>>,
    },
    DialWait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_on: Option<DateTime<Utc>>,
    },
    DialEnded {
        status: String,
        duration_seconds: u64,
    },
    WaitTimedOut {},
    RunExpired {},
    RunResultChanged {
        name: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_localized: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<Value>,
    },
    ContactNameChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ContactLanguageChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    ContactFieldChanged {
        field: FieldRef,
        value: Value,
    },
    ContactGroupsChanged {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups_added: Vec<GroupRef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups_removed: Vec<GroupRef>,
    },
    ContactUrnsChanged {
        urns: Vec<Urn>,
    },
    EmailSent {
        to: Vec<String>,
        subject: String,
        body: String,
    },
    WebhookCalled {
        url: String,
        status: CallStatus,
        status_code: u16,
        elapsed_ms: u64,
        request: String,
        response: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resthook: Option<String>,
    },
    ResthookCalled {
        resthook: String,
        payload: Value,
    },
    ClassifierCalled {
        classifier: ClassifierRef,
        query: String,
        classification: Classification,
    },
    TicketOpened {
        ticketer: TicketerRef,
        subject: String,
        body: String,
        ticket_uuid: Uuid,
    },
    AirtimeTransferred {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<Urn>,
        recipient: Urn,
        currency: String,
        desired_amount: f64,
        actual_amount: f64,
    },
    /// A `start_session` action asked the host to trigger a new session.
    SessionTriggered {
        flow: FlowRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<Contact>,
        run_summary: Value,
    },
    /// A recoverable fault — evaluation failed, a service was unavailable.
    /// The flow keeps moving.
    Error {
        text: String,
    },
    /// An unrecoverable fault — the run or session stops.
    Failure {
        text: String,
    },
}

impl EventPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FlowEntered { .. } => "flow_entered",
            Self::MsgCreated { .. } => "msg_created",
            Self::MsgReceived { .. } => "msg_received",
            Self::MsgWait { .. } => "msg_wait",
            Self::DialWait { .. } => "dial_wait",
            Self::DialEnded { .. } => "dial_ended",
            Self::WaitTimedOut {} => "wait_timed_out",
            Self::RunExpired {} => "run_expired",
            Self::RunResultChanged { .. } => "run_result_changed",
            Self::ContactNameChanged { .. } => "contact_name_changed",
            Self::ContactLanguageChanged { .. } => "contact_language_changed",
            Self::ContactFieldChanged { .. } => "contact_field_changed",
            Self::ContactGroupsChanged { .. } => "contact_groups_changed",
            Self::ContactUrnsChanged { .. } => "contact_urns_changed",
            Self::EmailSent { .. } => "email_sent",
            Self::WebhookCalled { .. } => "webhook_called",
            Self::ResthookCalled { .. } => "resthook_called",
            Self::ClassifierCalled { .. } => "classifier_called",
            Self::TicketOpened { .. } => "ticket_opened",
            Self::AirtimeTransferred { .. } => "airtime_transferred",
            Self::SessionTriggered { .. } => "session_triggered",
            Self::Error { .. } => "error",
            Self::Failure { .. } => "failure",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trip() {
        let event = Event {
            created_on: "2018-10-18T14:20:30.000123456Z".parse().unwrap(),
            step_uuid: Some(Uuid::new_v4()),
            from_caller: false,
            payload: EventPayload::Error {
                text: "unable to resolve 'contact.name'".into(),
            },
        };
        let encoded = serde_json::to_string(&event).unwrap();
        let rt: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(event, rt);
        assert_eq!(rt.type_name(), "error");
    }

    #[test]
    fn type_tag_is_flat_on_envelope() {
        let event = Event::new(
            EventPayload::EmailSent {
                to: vec!["org@flowline.io".into()],
                subject: "Updated".into(),
                body: "they said blue".into(),
            },
            Utc::now(),
        );
        let val = serde_json::to_value(&event).unwrap();
        assert_eq!(val["type"], json!("email_sent"));
        assert_eq!(val["to"], json!(["org@flowline.io"]));
    }

    #[test]
    fn from_caller_is_not_serialized() {
        let mut event = Event::new(
            EventPayload::MsgReceived {
                msg: MsgIn {
                    uuid: Uuid::new_v4(),
                    urn: None,
                    channel: None,
                    text: "Bob".into(),
                    attachments: vec![],
                },
            },
            Utc::now(),
        );
        event.from_caller = true;
        let val = serde_json::to_value(&event).unwrap();
        assert!(val.get("from_caller").is_none());
    }

    #[test]
    fn unknown_type_fails_deserialization() {
        let raw = json!({"type": "quantum_flux", "created_on": "2018-10-18T14:20:30Z"});
        assert!(serde_json::from_value::<Event>(raw).is_err());
    }

    #[test]
    fn webhook_called_round_trip() {
        let event = Event::new(
            EventPayload::WebhookCalled {
                url: "http://localhost/ok".into(),
                status: CallStatus::Success,
                status_code: 200,
                elapsed_ms: 12,
                request: "GET /ok HTTP/1.1".into(),
                response: "HTTP/1.1 200 OK\r\n\r\n{}".into(),
                resthook: None,
            },
            Utc::now(),
        );
        let encoded = serde_json::to_string(&event).unwrap();
        let rt: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(rt.type_name(), "webhook_called");
        match rt.payload {
            EventPayload::WebhookCalled { status, .. } => {
                assert_eq!(status, CallStatus::Success);
            }
            other => panic!("expected webhook_called, got {other:?}"),
        }
    }
}
