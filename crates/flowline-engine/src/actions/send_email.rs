//! Send an email through the configured email service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::EventPayload;

/// Sends an email. Addresses, subject and body are all templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailAction {
    pub uuid: Uuid,
    pub addresses: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl SendEmailAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let subject = ctx.eval_template(&self.subject).await;
        if subject.is_empty() {
            ctx.log_error("email subject evaluated to empty string, skipping".into());
            return Ok(());
        }
        let body = ctx.eval_template(&self.body).await;

        let mut to = Vec::with_capacity(self.addresses.len());
        for template in &self.addresses {
            let address = ctx.eval_template(template).await;
            let address = address.trim_start_matches("mailto:").to_string();
            if !address.is_empty() {
                to.push(address);
            }
        }
        if to.is_empty() {
            ctx.log_error("email has no recipients".into());
            return Ok(());
        }

        let service = match ctx.email_service() {
            Ok(service) => service,
            Err(e) => {
                ctx.log_error(e.to_string());
                return Ok(());
            }
        };

        match service.send(&to, &subject, &body).await {
            Ok(()) => ctx.log_event(EventPayload::EmailSent { to, subject, body }),
            Err(e) => ctx.log_error(format!("unable to send email: {e}")),
        }
        Ok(())
    }
}
