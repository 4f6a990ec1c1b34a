//! Contact modifiers — described changes applied through a logging callback.
//!
//! Actions never poke at the contact directly. They build a [`Modifier`],
//! and the execution context applies it, records it for auditing, and emits
//! the corresponding `contact_*` event so a hosting application can mirror
//! the change to external state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventPayload;
use crate::types::{Contact, FieldRef, GroupRef, Urn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupModification {
    Add,
    Remove,
}

/// A described change to the contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Modifier {
    Name {
        name: Option<String>,
    },
    Language {
        language: Option<String>,
    },
    Field {
        field: FieldRef,
        value: Value,
    },
    Groups {
        groups: Vec<GroupRef>,
        modification: GroupModification,
    },
    Urns {
        urns: Vec<Urn>,
    },
}

impl Modifier {
    /// Apply this modifier to the contact. Returns the event describing the
    /// actual change, or `None` when the modifier is a no-op (value already
    /// in place, group already joined, …).
    pub fn apply(&self, contact: &mut Contact) -> Option<EventPayload> {
        match self {
            Self::Name { name } => {
                if contact.name == *name {
                    return None;
                }
                contact.name = name.clone();
                Some(EventPayload::ContactNameChanged { name: name.clone() })
            }
            Self::Language { language } => {
                if contact.language == *language {
                    return None;
                }
                contact.language = language.clone();
                Some(EventPayload::ContactLanguageChanged {
                    language: language.clone(),
                })
            }
            Self::Field { field, value } => {
                if value.is_null() {
                    if contact.fields.remove(&field.key).is_none() {
                        return None;
                    }
                } else {
                    if contact.fields.get(&field.key) == Some(value) {
                        return None;
                    }
                    contact.fields.insert(field.key.clone(), value.clone());
                }
                Some(EventPayload::ContactFieldChanged {
                    field: field.clone(),
                    value: value.clone(),
                })
            }
            Self::Groups {
                groups,
                modification,
            } => {
                let mut added = Vec::new();
                let mut removed = Vec::new();
                match modification {
                    GroupModification::Add => {
                        for group in groups {
                            if !contact.in_group(group.uuid) {
                                contact.groups.push(group.clone());
                                added.push(group.clone());
                            }
                        }
                    }
                    GroupModification::Remove => {
                        for group in groups {
                            if contact.in_group(group.uuid) {
                                contact.groups.retain(|g| g.uuid != group.uuid);
                                removed.push(group.clone());
                            }
                        }
                    }
                }
                if added.is_empty() && removed.is_empty() {
                    return None;
                }
                Some(EventPayload::ContactGroupsChanged {
                    groups_added: added,
                    groups_removed: removed,
                })
            }
            Self::Urns { urns } => {
                let mut changed = false;
                for urn in urns {
                    if !contact.urns.contains(urn) {
                        contact.urns.push(urn.clone());
                        changed = true;
                    }
                }
                if !changed {
                    return None;
                }
                Some(EventPayload::ContactUrnsChanged {
                    urns: contact.urns.clone(),
                })
            }
        }
    }
}
