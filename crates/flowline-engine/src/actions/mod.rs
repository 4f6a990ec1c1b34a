//! Actions — typed side-effecting operations attached to nodes.
//!
//! Actions form a closed tagged union discriminated by `type`; unknown
//! types fail flow deserialization. Execution returns an error only for
//! invariant violations — recoverable faults (template errors, missing
//! services, failed calls) are surfaced as `error` events so the engine
//! can keep stepping. Actions never advance the path themselves.

mod call_classifier;
mod call_resthook;
mod call_webhook;
mod enter_flow;
mod groups;
mod send_email;
mod send_msg;
mod set_contact;
mod set_run_result;
mod ticket_airtime;

pub use call_classifier::CallClassifierAction;
pub use call_resthook::CallResthookAction;
pub use call_webhook::CallWebhookAction;
pub use enter_flow::{EnterFlowAction, StartSessionAction};
pub use groups::{AddContactGroupsAction, RemoveContactGroupsAction};
pub use send_email::SendEmailAction;
pub use send_msg::SendMsgAction;
pub use set_contact::{
    AddContactUrnAction, SetContactFieldAction, SetContactLanguageAction, SetContactNameAction,
};
pub use set_run_result::SetRunResultAction;
pub use ticket_airtime::{OpenTicketAction, TransferAirtimeAction};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::types::{CallStatus, Dependency, ResultSpec, WebhookCall};

/// Result categories recorded by webhook-style actions.
pub(crate) const CATEGORY_SUCCESS: &str = "Success";
pub(crate) const CATEGORY_FAILURE: &str = "Failure";

/// The union of every action the engine can execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Action {
    SendMsg(SendMsgAction),
    SetContactName(SetContactNameAction),
    SetContactLanguage(SetContactLanguageAction),
    SetContactField(SetContactFieldAction),
    AddContactUrn(AddContactUrnAction),
    AddContactGroups(AddContactGroupsAction),
    RemoveContactGroups(RemoveContactGroupsAction),
    SetRunResult(SetRunResultAction),
    CallWebhook(CallWebhookAction),
    CallResthook(CallResthookAction),
    CallClassifier(CallClassifierAction),
    SendEmail(SendEmailAction),
    OpenTicket(OpenTicketAction),
    TransferAirtime(TransferAirtimeAction),
    EnterFlow(EnterFlowAction),
    StartSession(StartSessionAction),
}

impl Action {
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::SendMsg(a) => a.uuid,
            Self::SetContactName(a) => a.uuid,
            Self::SetContactLanguage(a) => a.uuid,
            Self::SetContactField(a) => a.uuid,
            Self::AddContactUrn(a) => a.uuid,
            Self::AddContactGroups(a) => a.uuid,
            Self::RemoveContactGroups(a) => a.uuid,
            Self::SetRunResult(a) => a.uuid,
            Self::CallWebhook(a) => a.uuid,
            Self::CallResthook(a) => a.uuid,
            Self::CallClassifier(a) => a.uuid,
            Self::SendEmail(a) => a.uuid,
            Self::OpenTicket(a) => a.uuid,
            Self::TransferAirtime(a) => a.uuid,
            Self::EnterFlow(a) => a.uuid,
            Self::StartSession(a) => a.uuid,
        }
    }

    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        match self {
            Self::SendMsg(a) => a.execute(ctx).await,
            Self::SetContactName(a) => a.execute(ctx).await,
            Self::SetContactLanguage(a) => a.execute(ctx).await,
            Self::SetContactField(a) => a.execute(ctx).await,
            Self::AddContactUrn(a) => a.execute(ctx).await,
            Self::AddContactGroups(a) => a.execute(ctx).await,
            Self::RemoveContactGroups(a) => a.execute(ctx).await,
            Self::SetRunResult(a) => a.execute(ctx).await,
            Self::CallWebhook(a) => a.execute(ctx).await,
            Self::CallResthook(a) => a.execute(ctx).await,
            Self::CallClassifier(a) => a.execute(ctx).await,
            Self::SendEmail(a) => a.execute(ctx).await,
            Self::OpenTicket(a) => a.execute(ctx).await,
            Self::TransferAirtime(a) => a.execute(ctx).await,
            Self::EnterFlow(a) => a.execute(ctx).await,
            Self::StartSession(a) => a.execute(ctx).await,
        }
    }

    /// Authoring-time validation, run when the flow asset is loaded.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::CallWebhook(a) => a.validate(),
            _ => Ok(()),
        }
    }

    /// Visit the action's evaluated template fields.
    pub fn visit_templates(&self, visit: &mut dyn FnMut(&str)) {
        match self {
            Self::SendMsg(a) => {
                visit(&a.text);
                a.attachments.iter().for_each(|t| visit(t));
            }
            Self::SetContactName(a) => visit(&a.name),
            Self::SetContactLanguage(a) => visit(&a.language),
            Self::SetContactField(a) => visit(&a.value),
            Self::AddContactUrn(a) => visit(&a.path),
            Self::SetRunResult(a) => visit(&a.value),
            Self::CallWebhook(a) => {
                visit(&a.url);
                visit(&a.body);
                a.headers.values().for_each(|v| visit(v));
            }
            Self::CallClassifier(a) => visit(&a.input),
            Self::SendEmail(a) => {
                a.addresses.iter().for_each(|t| visit(t));
                visit(&a.subject);
                visit(&a.body);
            }
            Self::OpenTicket(a) => {
                visit(&a.subject);
                visit(&a.body);
            }
            _ => {}
        }
    }

    /// Visit the results this action can save.
    pub fn visit_results(&self, node_uuid: Uuid, visit: &mut dyn FnMut(ResultSpec)) {
        let name = match self {
            Self::SetRunResult(a) => Some(a.name.clone()),
            Self::CallWebhook(a) => a.result_name.clone(),
            Self::CallResthook(a) => a.result_name.clone(),
            Self::CallClassifier(a) => a.result_name.clone(),
            Self::OpenTicket(a) => a.result_name.clone(),
            Self::TransferAirtime(a) => a.result_name.clone(),
            _ => None,
        };
        if let Some(name) = name {
            visit(ResultSpec { name, node_uuid });
        }
    }

    /// Visit the assets this action depends on.
    pub fn visit_dependencies(&self, visit: &mut dyn FnMut(Dependency)) {
        match self {
            Self::SetContactField(a) => visit(Dependency::Field(a.field.key.clone())),
            Self::AddContactGroups(a) => {
                a.groups.iter().for_each(|g| visit(Dependency::Group(g.uuid)));
            }
            Self::RemoveContactGroups(a) => {
                a.groups.iter().for_each(|g| visit(Dependency::Group(g.uuid)));
            }
            Self::CallResthook(a) => visit(Dependency::Resthook(a.resthook.clone())),
            Self::CallClassifier(a) => visit(Dependency::Classifier(a.classifier.uuid)),
            Self::OpenTicket(a) => visit(Dependency::Ticketer(a.ticketer.uuid)),
            Self::EnterFlow(a) => visit(Dependency::Flow(a.flow.uuid)),
            Self::StartSession(a) => visit(Dependency::Flow(a.flow.uuid)),
            _ => {}
        }
    }
}

/// Save the result generated by a webhook-style call: value is the status
/// code, category maps success → `Success` and everything else →
/// `Failure`, extra carries the parsed response when requested.
pub(crate) fn save_webhook_result(
    ctx: &mut StepCtx<'_>,
    name: &str,
    call: &WebhookCall,
    status: CallStatus,
    response_as_extra: bool,
) {
    let category = match status {
        CallStatus::Success => CATEGORY_SUCCESS,
        _ => CATEGORY_FAILURE,
    };
    let extra = if response_as_extra {
        call.response_json()
    } else {
        None
    };
    ctx.set_result(
        name,
        call.status_code.to_string(),
        Some(category.to_string()),
        Some(format!("{} {}", call.method, call.url)),
        extra,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_round_trip_with_type_tag() {
        let raw = json!({
            "type": "send_msg",
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
            "text": "Hi @contact.name!"
        });
        let action: Action = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(action, Action::SendMsg(_)));
        let back = serde_json::to_value(&action).unwrap();
        assert_eq!(back["type"], json!("send_msg"));
    }

    #[test]
    fn unknown_action_type_rejected() {
        let raw = json!({
            "type": "fax_document",
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
        });
        assert!(serde_json::from_value::<Action>(raw).is_err());
    }

    #[test]
    fn templates_enumerated() {
        let action: Action = serde_json::from_value(json!({
            "type": "call_webhook",
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
            "method": "POST",
            "url": "http://x/@contact.uuid",
            "body": "@input.text",
            "headers": {"Authorization": "Token @trigger.params.token"}
        }))
        .unwrap();
        let mut templates = Vec::new();
        action.visit_templates(&mut |t| templates.push(t.to_string()));
        assert_eq!(templates.len(), 3);
        assert!(templates.contains(&"http://x/@contact.uuid".to_string()));
    }

    #[test]
    fn dependencies_enumerated() {
        let action: Action = serde_json::from_value(json!({
            "type": "enter_flow",
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
            "flow": {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Child"}
        }))
        .unwrap();
        let mut deps = Vec::new();
        action.visit_dependencies(&mut |d| deps.push(d));
        assert_eq!(
            deps,
            vec![Dependency::Flow(
                "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d".parse().unwrap()
            )]
        );
    }
}
