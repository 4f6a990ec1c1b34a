//! Triggers — the entry conditions that seed a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::types::{ChannelRef, Contact, FlowRef};

/// Reference to the campaign that fired a campaign trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRef {
    pub uuid: Uuid,
    pub name: String,
}

/// How a session came to exist. The trigger names the flow to run and may
/// carry a contact snapshot and caller-defined params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Trigger {
    /// Started explicitly by a user or API call.
    Manual {
        flow: FlowRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<Contact>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
        triggered_on: DateTime<Utc>,
    },
    /// Fired by a scheduled campaign event.
    Campaign {
        flow: FlowRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<Contact>,
        campaign: CampaignRef,
        triggered_on: DateTime<Utc>,
    },
    /// Fired by channel activity, e.g. an incoming call or new conversation.
    Channel {
        flow: FlowRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<Contact>,
        channel: ChannelRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
        triggered_on: DateTime<Utc>,
    },
    /// Fired by a `start_session` action in another session.
    FlowAction {
        flow: FlowRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<Contact>,
        /// Summary of the run that triggered this session.
        run_summary: Value,
        triggered_on: DateTime<Utc>,
    },
}

impl Trigger {
    pub fn flow(&self) -> &FlowRef {
        match self {
            Self::Manual { flow, .. }
            | Self::Campaign { flow, .. }
            | Self::Channel { flow, .. }
            | Self::FlowAction { flow, .. } => flow,
        }
    }

    pub fn contact(&self) -> Option<&Contact> {
        match self {
            Self::Manual { contact, .. }
            | Self::Campaign { contact, .. }
            | Self::Channel { contact, .. }
            | Self::FlowAction { contact, .. } => contact.as_ref(),
        }
    }

    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Manual { params, .. } | Self::Channel { params, .. } => params.as_ref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "manual",
            Self::Campaign { .. } => "campaign",
            Self::Channel { .. } => "channel",
            Self::FlowAction { .. } => "flow_action",
        }
    }

    /// The mapping exposed to expressions as `trigger`.
    pub fn to_context(&self) -> Value {
        json!({
            "type": self.type_name(),
            "params": self.params().cloned().unwrap_or(Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_ref() -> FlowRef {
        FlowRef {
            uuid: "50c3706e-fedb-42c0-8eab-dda3335714b7".parse().unwrap(),
            name: "Registration".into(),
        }
    }

    #[test]
    fn manual_round_trip() {
        let trigger = Trigger::Manual {
            flow: flow_ref(),
            contact: None,
            params: Some(json!({"source": "api"})),
            triggered_on: Utc::now(),
        };
        let encoded = serde_json::to_string(&trigger).unwrap();
        let rt: Trigger = serde_json::from_str(&encoded).unwrap();
        assert_eq!(trigger, rt);
        assert_eq!(rt.type_name(), "manual");
    }

    #[test]
    fn unknown_type_rejected() {
        let raw = json!({"type": "telepathy", "flow": flow_ref(), "triggered_on": Utc::now()});
        assert!(serde_json::from_value::<Trigger>(raw).is_err());
    }

    #[test]
    fn context_includes_params() {
        let trigger = Trigger::Manual {
            flow: flow_ref(),
            contact: None,
            params: Some(json!({"coupon": "DISCOUNT"})),
            triggered_on: Utc::now(),
        };
        let ctx = trigger.to_context();
        assert_eq!(ctx["type"], json!("manual"));
        assert_eq!(ctx["params"]["coupon"], json!("DISCOUNT"));
    }

    #[test]
    fn campaign_has_no_params() {
        let trigger = Trigger::Campaign {
            flow: flow_ref(),
            contact: None,
            campaign: CampaignRef {
                uuid: Uuid::new_v4(),
                name: "Reminders".into(),
            },
            triggered_on: Utc::now(),
        };
        assert_eq!(trigger.to_context()["params"], Value::Null);
    }
}
