//! Routers — exit selection for a node.
//!
//! A switch router evaluates a sequence of case expressions against the run
//! context and takes the first that holds; a random router picks an exit
//! uniformly. A router may carry a wait, in which case the session suspends
//! on first arrival and routes when matching input (or the timeout) comes
//! back.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::expression::{self, ExpressionError};
use crate::types::Node;
use crate::waits::Wait;

/// Category name recorded when a wait timeout routes the node.
const TIMEOUT_CATEGORY: &str = "No Response";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouteError {
    #[error("no case matched and router has no default exit")]
    NoMatch,
    #[error("node has no exits to pick from")]
    NoExits,
}

/// The outcome of routing a node: which exit, plus the category and value
/// to save when the router names a result.
#[derive(Debug, Clone)]
pub struct Routed {
    pub exit_uuid: Uuid,
    pub category: Option<String>,
    pub value: Option<String>,
    /// Case-evaluation errors encountered on the way. The caller logs them
    /// as error events; a failed case simply doesn't match.
    pub errors: Vec<ExpressionError>,
}

/// One arm of a switch router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub uuid: Uuid,
    /// Expression evaluated against the run context, e.g.
    /// `child.status == "completed"`.
    pub expression: String,
    pub category: String,
    pub exit_uuid: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRouter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
    /// Template whose evaluation becomes the saved result value and input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<Case>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_exit_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<Wait>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomRouter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

/// Exit selection strategy attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Router {
    Switch(SwitchRouter),
    Random(RandomRouter),
}

impl Router {
    pub fn result_name(&self) -> Option<&str> {
        match self {
            Self::Switch(r) => r.result_name.as_deref(),
            Self::Random(r) => r.result_name.as_deref(),
        }
    }

    pub fn wait(&self) -> Option<&Wait> {
        match self {
            Self::Switch(r) => r.wait.as_ref(),
            Self::Random(_) => None,
        }
    }

    /// Every exit this router can select — used by flow validation.
    pub fn exit_uuids(&self) -> Vec<Uuid> {
        match self {
            Self::Switch(r) => {
                let mut uuids: Vec<Uuid> = r.cases.iter().map(|c| c.exit_uuid).collect();
                if let Some(default) = r.default_exit_uuid {
                    uuids.push(default);
                }
                if let Some(timeout) = r.wait.as_ref().and_then(|w| w.timeout()) {
                    uuids.push(timeout.exit_uuid);
                }
                uuids
            }
            Self::Random(_) => Vec::new(),
        }
    }

    pub fn visit_templates(&self, visit: &mut dyn FnMut(&str)) {
        if let Self::Switch(r) = self {
            if let Some(operand) = &r.operand {
                visit(operand);
            }
            for case in &r.cases {
                visit(&case.expression);
            }
        }
    }

    /// Pick an exit for the node using the current run context.
    pub fn route(
        &self,
        node: &Node,
        context: &Value,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Routed, RouteError> {
        match self {
            Self::Switch(r) => r.route(context),
            Self::Random(_) => {
                if node.exits.is_empty() {
                    return Err(RouteError::NoExits);
                }
                let idx = rng.gen_range(0..node.exits.len());
                Ok(Routed {
                    exit_uuid: node.exits[idx].uuid,
                    category: Some(format!("Bucket {}", idx + 1)),
                    value: Some(idx.to_string()),
                    errors: Vec::new(),
                })
            }
        }
    }

    /// Route through the wait's timeout exit. `None` if this router has no
    /// timeout configured.
    pub fn route_timeout(&self) -> Option<Routed> {
        let timeout = self.wait()?.timeout()?;
        Some(Routed {
            exit_uuid: timeout.exit_uuid,
            category: Some(TIMEOUT_CATEGORY.to_string()),
            value: None,
            errors: Vec::new(),
        })
    }
}

impl SwitchRouter {
    fn route(&self, context: &Value) -> Result<Routed, RouteError> {
        let mut errors = Vec::new();

        let value = match &self.operand {
            Some(operand) => {
                let out = expression::evaluate_template(operand, context);
                errors.extend(out.errors);
                Some(out.text)
            }
            None => None,
        };

        for case in &self.cases {
            match expression::evaluate_bool(&case.expression, context) {
                Ok(true) => {
                    return Ok(Routed {
                        exit_uuid: case.exit_uuid,
                        category: Some(case.category.clone()),
                        value,
                        errors,
                    });
                }
                Ok(false) => {}
                Err(e) => errors.push(e),
            }
        }

        match self.default_exit_uuid {
            Some(exit_uuid) => Ok(Routed {
                exit_uuid,
                category: self.default_category.clone(),
                value,
                errors,
            }),
            None => Err(RouteError::NoMatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_u128(n as u128)
    }

    fn switch() -> Router {
        Router::Switch(SwitchRouter {
            result_name: Some("Color".into()),
            operand: Some("@input.text".into()),
            cases: vec![
                Case {
                    uuid: uuid(1),
                    expression: r#"input.text == "blue""#.into(),
                    category: "Blue".into(),
                    exit_uuid: uuid(10),
                },
                Case {
                    uuid: uuid(2),
                    expression: r#"input.text == "red""#.into(),
                    category: "Red".into(),
                    exit_uuid: uuid(11),
                },
            ],
            default_exit_uuid: Some(uuid(12)),
            default_category: Some("Other".into()),
            wait: None,
        })
    }

    fn node_with_exits(n: usize) -> Node {
        serde_json::from_value(json!({
            "uuid": Uuid::from_u128(99).to_string(),
            "exits": (0..n).map(|i| json!({"uuid": Uuid::from_u128(100 + i as u128).to_string()}))
                .collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    #[test]
    fn first_matching_case_wins() {
        let ctx = json!({"input": {"text": "blue"}});
        let mut rng = StdRng::seed_from_u64(0);
        let routed = switch().route(&node_with_exits(3), &ctx, &mut rng).unwrap();
        assert_eq!(routed.exit_uuid, uuid(10));
        assert_eq!(routed.category.as_deref(), Some("Blue"));
        assert_eq!(routed.value.as_deref(), Some("blue"));
    }

    #[test]
    fn falls_through_to_default() {
        let ctx = json!({"input": {"text": "mauve"}});
        let mut rng = StdRng::seed_from_u64(0);
        let routed = switch().route(&node_with_exits(3), &ctx, &mut rng).unwrap();
        assert_eq!(routed.exit_uuid, uuid(12));
        assert_eq!(routed.category.as_deref(), Some("Other"));
    }

    #[test]
    fn no_match_no_default_is_error() {
        let router = Router::Switch(SwitchRouter {
            result_name: None,
            operand: None,
            cases: vec![Case {
                uuid: uuid(1),
                expression: r#"input.text == "never""#.into(),
                category: "Never".into(),
                exit_uuid: uuid(10),
            }],
            default_exit_uuid: None,
            default_category: None,
            wait: None,
        });
        let ctx = json!({"input": {"text": "hi"}});
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            router.route(&node_with_exits(1), &ctx, &mut rng),
            Err(RouteError::NoMatch)
        ));
    }

    #[test]
    fn case_error_is_collected_not_fatal() {
        let router = Router::Switch(SwitchRouter {
            result_name: None,
            operand: None,
            cases: vec![Case {
                uuid: uuid(1),
                expression: "contact.name == 'Bob'".into(),
                category: "Bob".into(),
                exit_uuid: uuid(10),
            }],
            default_exit_uuid: Some(uuid(12)),
            default_category: Some("Other".into()),
            wait: None,
        });
        // contact is null so the case errors, routing takes the default
        let ctx = json!({"contact": null});
        let mut rng = StdRng::seed_from_u64(0);
        let routed = router.route(&node_with_exits(2), &ctx, &mut rng).unwrap();
        assert_eq!(routed.exit_uuid, uuid(12));
        assert_eq!(routed.errors.len(), 1);
    }

    #[test]
    fn random_router_picks_within_exits() {
        let router = Router::Random(RandomRouter { result_name: None });
        let node = node_with_exits(5);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let routed = router.route(&node, &json!({}), &mut rng).unwrap();
            assert!(node.exits.iter().any(|e| e.uuid == routed.exit_uuid));
        }
    }

    #[test]
    fn random_router_is_seed_deterministic() {
        let router = Router::Random(RandomRouter { result_name: None });
        let node = node_with_exits(5);
        let picks = |seed: u64| -> Vec<Uuid> {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| router.route(&node, &json!({}), &mut rng).unwrap().exit_uuid)
                .collect()
        };
        assert_eq!(picks(7), picks(7));
    }

    #[test]
    fn timeout_routing_uses_wait_exit() {
        let router = Router::Switch(SwitchRouter {
            result_name: None,
            operand: None,
            cases: vec![],
            default_exit_uuid: None,
            default_category: None,
            wait: Some(Wait::Msg {
                timeout: Some(crate::waits::WaitTimeout {
                    seconds: 300,
                    exit_uuid: uuid(20),
                }),
            }),
        });
        let routed = router.route_timeout().unwrap();
        assert_eq!(routed.exit_uuid, uuid(20));
        assert_eq!(routed.category.as_deref(), Some("No Response"));
    }

    #[test]
    fn exit_uuids_cover_cases_default_and_timeout() {
        let router = Router::Switch(SwitchRouter {
            result_name: None,
            operand: None,
            cases: vec![Case {
                uuid: uuid(1),
                expression: "true".into(),
                category: "All".into(),
                exit_uuid: uuid(10),
            }],
            default_exit_uuid: Some(uuid(11)),
            default_category: None,
            wait: Some(Wait::Msg {
                timeout: Some(crate::waits::WaitTimeout {
                    seconds: 60,
                    exit_uuid: uuid(12),
                }),
            }),
        });
        assert_eq!(router.exit_uuids(), vec![uuid(10), uuid(11), uuid(12)]);
    }
}
