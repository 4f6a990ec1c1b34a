//! Send a message to the contact.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::{EventPayload, MsgOut};

/// Creates an outgoing message for the contact. `text` and `attachments`
/// are templates evaluated at runtime. With `all_urns` set, one message is
/// created per contact URN instead of just the preferred one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMsgAction {
    pub uuid: Uuid,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_urns: bool,
}

impl SendMsgAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let text = ctx.eval_template(&self.text).await;
        if text.is_empty() {
            ctx.log_error("send_msg text evaluated to empty string, skipping".into());
            return Ok(());
        }

        let mut attachments = Vec::new();
        for template in &self.attachments {
            let attachment = ctx.eval_template(template).await;
            if !attachment.is_empty() {
                attachments.push(attachment);
            }
        }

        let Some(contact) = ctx.contact() else {
            ctx.log_error("session has no contact to send to".into());
            return Ok(());
        };

        let urns: Vec<_> = if self.all_urns {
            contact.urns.iter().cloned().map(Some).collect()
        } else {
            // a contact without URNs still gets the message, as unsendable
            vec![contact.preferred_urn().cloned()]
        };

        for urn in urns {
            let msg = MsgOut {
                uuid: ctx.new_uuid(),
                urn,
                channel: None,
                text: text.clone(),
                attachments: attachments.clone(),
            };
            ctx.log_event(EventPayload::MsgCreated { msg });
        }
        Ok(())
    }
}
