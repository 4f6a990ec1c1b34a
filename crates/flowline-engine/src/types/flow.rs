//! Flow graph schema — the static definition the engine interprets.
//!
//! A flow is a directed graph of [`Node`]s. Each node carries zero or more
//! actions executed on arrival, an optional router that picks one of the
//! node's exits, and the exits themselves. Destinations are node UUIDs so
//! the definition is a pure tree when serialized.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::Action;
use crate::routers::Router;

/// The complete definition of a flow, as loaded from the asset store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDef {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub nodes: Vec<Node>,
}

impl FlowDef {
    /// The entry node — execution always begins at the first node.
    pub fn entry(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn node(&self, uuid: Uuid) -> Option<&Node> {
        self.nodes.iter().find(|n| n.uuid == uuid)
    }

    pub fn reference(&self) -> crate::types::FlowRef {
        crate::types::FlowRef {
            uuid: self.uuid,
            name: self.name.clone(),
        }
    }

    /// Structural validation, run once when the asset is loaded. Checks that
    /// exit destinations point at real nodes and router exit references are
    /// exits of their node.
    pub fn validate(&self) -> Result<(), FlowDefError> {
        for node in &self.nodes {
            for action in &node.actions {
                if let Err(message) = action.validate() {
                    return Err(FlowDefError::InvalidAction {
                        node_uuid: node.uuid,
                        action_uuid: action.uuid(),
                        message,
                    });
                }
            }
            for exit in &node.exits {
                if let Some(dest) = exit.destination_uuid {
                    if self.node(dest).is_none() {
                        return Err(FlowDefError::MissingDestination {
                            node_uuid: node.uuid,
                            destination_uuid: dest,
                        });
                    }
                }
            }
            if let Some(router) = &node.router {
                for exit_uuid in router.exit_uuids() {
                    if !node.exits.iter().any(|e| e.uuid == exit_uuid) {
                        return Err(FlowDefError::UnknownExit {
                            node_uuid: node.uuid,
                            exit_uuid,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Visit every template string in the flow (action fields marked as
    /// evaluated plus router operands and case expressions).
    pub fn visit_templates(&self, visit: &mut dyn FnMut(&str)) {
        for node in &self.nodes {
            for action in &node.actions {
                action.visit_templates(visit);
            }
            if let Some(router) = &node.router {
                router.visit_templates(visit);
            }
        }
    }

    /// Visit every result that executing this flow could save.
    pub fn visit_results(&self, visit: &mut dyn FnMut(ResultSpec)) {
        for node in &self.nodes {
            for action in &node.actions {
                action.visit_results(node.uuid, visit);
            }
            if let Some(router) = &node.router {
                if let Some(name) = router.result_name() {
                    visit(ResultSpec {
                        name: name.to_string(),
                        node_uuid: node.uuid,
                    });
                }
            }
        }
    }

    /// Visit every asset this flow depends on.
    pub fn visit_dependencies(&self, visit: &mut dyn FnMut(Dependency)) {
        for node in &self.nodes {
            for action in &node.actions {
                action.visit_dependencies(visit);
            }
        }
    }
}

/// One vertex in the flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<Router>,
    pub exits: Vec<Exit>,
}

impl Node {
    pub fn exit(&self, uuid: Uuid) -> Option<&Exit> {
        self.exits.iter().find(|e| e.uuid == uuid)
    }
}

/// A directed edge out of a node. A `None` destination terminates the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exit {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_uuid: Option<Uuid>,
}

/// A result a flow can produce, discovered by static enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSpec {
    pub name: String,
    pub node_uuid: Uuid,
}

/// An asset reference discovered by static enumeration.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    Flow(Uuid),
    Group(Uuid),
    Field(String),
    Classifier(Uuid),
    Resthook(String),
    Ticketer(Uuid),
}

/// Structural errors found when validating a flow definition.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FlowDefError {
    #[error("node {node_uuid} has an exit to unknown node {destination_uuid}")]
    MissingDestination {
        node_uuid: Uuid,
        destination_uuid: Uuid,
    },
    #[error("router on node {node_uuid} references unknown exit {exit_uuid}")]
    UnknownExit { node_uuid: Uuid, exit_uuid: Uuid },
    #[error("action {action_uuid} on node {node_uuid} is invalid: {message}")]
    InvalidAction {
        node_uuid: Uuid,
        action_uuid: Uuid,
        message: String,
    },
}
