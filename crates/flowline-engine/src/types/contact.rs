//! Contact snapshot carried by a session.
//!
//! The contact is a point-in-time copy owned by the session — mutations made
//! by actions apply to this snapshot and are surfaced as `contact_*` events
//! for the hosting application to mirror.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::RedactionPolicy;

// ---------------------------------------------------------------------------
// URNs
// ---------------------------------------------------------------------------

/// A URN in `scheme:path` form, e.g. `tel:+12065551212`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(pub String);

impl Urn {
    pub fn new(scheme: &str, path: &str) -> Self {
        Self(format!("{scheme}:{path}"))
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map(|(s, _)| s).unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.0.split_once(':').map(|(_, p)| p).unwrap_or(&self.0)
    }

    /// Display form under the given redaction policy.
    pub fn redacted(&self, policy: RedactionPolicy) -> String {
        match policy {
            RedactionPolicy::None => self.0.clone(),
            RedactionPolicy::Urns => format!("{}:********", self.scheme()),
        }
    }
}

impl std::fmt::Display for Urn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Reference to a group asset, name denormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRef {
    pub uuid: Uuid,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// Snapshot of the contact a session is executing for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urns: Vec<Urn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupRef>,
    /// Field key → value. Values are JSON so hosts can store text, numbers
    /// or structured location values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl Contact {
    /// The contact's preferred URN, if any.
    pub fn preferred_urn(&self) -> Option<&Urn> {
        self.urns.first()
    }

    pub fn in_group(&self, uuid: Uuid) -> bool {
        self.groups.iter().any(|g| g.uuid == uuid)
    }

    /// The nested mapping exposed to expressions as `contact`.
    pub fn to_context(&self, redaction: RedactionPolicy) -> Value {
        let urns: Vec<String> = self.urns.iter().map(|u| u.redacted(redaction)).collect();
        json!({
            "uuid": self.uuid,
            "name": self.name,
            "language": self.language,
            "created_on": self.created_on,
            "urn": urns.first(),
            "urns": urns,
            "groups": self.groups,
            "fields": self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_contact() -> Contact {
        Contact {
            uuid: Uuid::new_v4(),
            name: Some("Ryan Lewis".into()),
            language: Some("eng".into()),
            created_on: Utc::now(),
            urns: vec![Urn::new("tel", "+12065551212")],
            groups: vec![GroupRef {
                uuid: Uuid::new_v4(),
                name: "Testers".into(),
            }],
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn urn_parts() {
        let urn = Urn::new("tel", "+12065551212");
        assert_eq!(urn.scheme(), "tel");
        assert_eq!(urn.path(), "+12065551212");
        assert_eq!(urn.to_string(), "tel:+12065551212");
    }

    #[test]
    fn urn_redaction() {
        let urn = Urn::new("tel", "+12065551212");
        assert_eq!(urn.redacted(RedactionPolicy::None), "tel:+12065551212");
        assert_eq!(urn.redacted(RedactionPolicy::Urns), "tel:********");
    }

    #[test]
    fn contact_context_has_preferred_urn() {
        let contact = test_contact();
        let ctx = contact.to_context(RedactionPolicy::None);
        assert_eq!(ctx["urn"], json!("tel:+12065551212"));
        assert_eq!(ctx["name"], json!("Ryan Lewis"));
    }

    #[test]
    fn group_membership() {
        let contact = test_contact();
        let uuid = contact.groups[0].uuid;
        assert!(contact.in_group(uuid));
        assert!(!contact.in_group(Uuid::new_v4()));
    }

    #[test]
    fn contact_round_trip() {
        let contact = test_contact();
        let bytes = serde_json::to_string(&contact).unwrap();
        let rt: Contact = serde_json::from_str(&bytes).unwrap();
        assert_eq!(contact, rt);
    }
}
