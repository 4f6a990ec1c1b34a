//! Waits — the suspension protocol for external input.
//!
//! A router may carry a [`Wait`] in its definition. Installing it suspends
//! the session; the [`ActivatedWait`] is what gets persisted, recording the
//! node that installed it and the absolute timeout deadline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::EventPayload;

/// Timeout declared on a wait: how long to hold, and the exit taken when
/// the caller reports the timeout elapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitTimeout {
    pub seconds: u64,
    pub exit_uuid: Uuid,
}

/// A wait as declared in a flow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Wait {
    /// Await an incoming message.
    Msg {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<WaitTimeout>,
    },
    /// Await the result of an outbound dial.
    Dial {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<WaitTimeout>,
    },
}

impl Wait {
    pub fn kind(&self) -> WaitKind {
        match self {
            Self::Msg { .. } => WaitKind::Msg,
            Self::Dial { .. } => WaitKind::Dial,
        }
    }

    pub fn timeout(&self) -> Option<&WaitTimeout> {
        match self {
            Self::Msg { timeout } | Self::Dial { timeout } => timeout.as_ref(),
        }
    }

    /// Activate this wait at the given node, resolving the timeout to an
    /// absolute deadline.
    pub fn activate(&self, node_uuid: Uuid, now: DateTime<Utc>) -> ActivatedWait {
        ActivatedWait {
            kind: self.kind(),
            node_uuid,
            expires_on: self
                .timeout()
                .map(|t| now + chrono::Duration::seconds(t.seconds as i64)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    Msg,
    Dial,
}

/// A wait in effect on a session, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedWait {
    #[serde(rename = "type")]
    pub kind: WaitKind,
    pub node_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl ActivatedWait {
    /// Whether a caller event of this payload kind satisfies the wait.
    pub fn accepts(&self, payload: &EventPayload) -> bool {
        match self.kind {
            WaitKind::Msg => matches!(payload, EventPayload::MsgReceived { .. }),
            WaitKind::Dial => matches!(payload, EventPayload::DialEnded { .. }),
        }
    }

    /// Whether the timeout deadline has elapsed.
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|deadline| now >= deadline)
    }

    /// The event announcing this wait's installation.
    pub fn announce(&self, timeout_seconds: Option<u64>) -> EventPayload {
        match self.kind {
            WaitKind::Msg => EventPayload::MsgWait {
                timeout_seconds,
                expires_on: self.expires_on,
            },
            WaitKind::Dial => EventPayload::DialWait {
                expires_on: self.expires_on,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MsgIn;

    fn node_uuid() -> Uuid {
        "a58be63b-907d-4a1a-856b-0bb5579d7507".parse().unwrap()
    }

    fn msg_received() -> EventPayload {
        EventPayload::MsgReceived {
            msg: MsgIn {
                uuid: Uuid::new_v4(),
                urn: None,
                channel: None,
                text: "Bob".into(),
                attachments: vec![],
            },
        }
    }

    #[test]
    fn activation_resolves_deadline() {
        let wait = Wait::Msg {
            timeout: Some(WaitTimeout {
                seconds: 600,
                exit_uuid: Uuid::new_v4(),
            }),
        };
        let now: DateTime<Utc> = "2018-10-18T14:20:30Z".parse().unwrap();
        let activated = wait.activate(node_uuid(), now);
        assert_eq!(
            activated.expires_on.unwrap(),
            "2018-10-18T14:30:30Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(!activated.timed_out(now));
        assert!(activated.timed_out(now + chrono::Duration::seconds(601)));
    }

    #[test]
    fn msg_wait_accepts_msg_only() {
        let wait = Wait::Msg { timeout: None }.activate(node_uuid(), Utc::now());
        assert!(wait.accepts(&msg_received()));
        assert!(!wait.accepts(&EventPayload::DialEnded {
            status: "answered".into(),
            duration_seconds: 5,
        }));
    }

    #[test]
    fn dial_wait_accepts_dial_ended() {
        let wait = Wait::Dial { timeout: None }.activate(node_uuid(), Utc::now());
        assert!(wait.accepts(&EventPayload::DialEnded {
            status: "busy".into(),
            duration_seconds: 0,
        }));
        assert!(!wait.accepts(&msg_received()));
    }

    #[test]
    fn no_timeout_never_times_out() {
        let wait = Wait::Msg { timeout: None }.activate(node_uuid(), Utc::now());
        assert!(wait.expires_on.is_none());
        assert!(!wait.timed_out(Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn activated_wait_round_trip() {
        let wait = Wait::Msg {
            timeout: Some(WaitTimeout {
                seconds: 60,
                exit_uuid: Uuid::new_v4(),
            }),
        }
        .activate(node_uuid(), "2018-10-18T14:20:30Z".parse().unwrap());
        let encoded = serde_json::to_string(&wait).unwrap();
        let rt: ActivatedWait = serde_json::from_str(&encoded).unwrap();
        assert_eq!(wait, rt);
    }
}
