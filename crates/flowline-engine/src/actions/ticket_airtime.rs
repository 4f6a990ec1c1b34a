//! Ticketing and airtime actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CATEGORY_FAILURE, CATEGORY_SUCCESS};
use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::EventPayload;
use crate::types::TicketerRef;

/// Opens a ticket in an external ticketing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTicketAction {
    pub uuid: Uuid,
    pub ticketer: TicketerRef,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl OpenTicketAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let subject = ctx.eval_template(&self.subject).await;
        let body = ctx.eval_template(&self.body).await;

        let outcome = match ctx.assets().ticketer(self.ticketer.uuid).await {
            Ok(ticketer) => match ctx.ticket_service(&ticketer) {
                Ok(service) => service.open(&subject, &body).await,
                Err(e) => Err(e),
            },
            Err(e) => {
                ctx.log_error(e.to_string());
                self.save_result(ctx, None);
                return Ok(());
            }
        };

        match outcome {
            Ok(ticket) => {
                ctx.log_event(EventPayload::TicketOpened {
                    ticketer: self.ticketer.clone(),
                    subject: ticket.subject.clone(),
                    body: ticket.body.clone(),
                    ticket_uuid: ticket.uuid,
                });
                self.save_result(ctx, Some(ticket.uuid));
            }
            Err(e) => {
                ctx.log_error(e.to_string());
                self.save_result(ctx, None);
            }
        }
        Ok(())
    }

    fn save_result(&self, ctx: &mut StepCtx<'_>, ticket_uuid: Option<Uuid>) {
        if let Some(name) = &self.result_name {
            let (value, category) = match ticket_uuid {
                Some(uuid) => (uuid.to_string(), CATEGORY_SUCCESS),
                None => (String::new(), CATEGORY_FAILURE),
            };
            ctx.set_result(name, value, Some(category.to_string()), None, None);
        }
    }
}

/// Transfers airtime to the contact's tel URN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAirtimeAction {
    pub uuid: Uuid,
    /// Currency code → amount to attempt.
    pub amounts: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl TransferAirtimeAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let recipient = ctx
            .contact()
            .and_then(|c| c.urns.iter().find(|u| u.scheme() == "tel"))
            .cloned();
        let Some(recipient) = recipient else {
            ctx.log_error("contact has no tel URN for airtime transfer".into());
            self.save_failure(ctx);
            return Ok(());
        };

        let service = match ctx.airtime_service() {
            Ok(service) => service,
            Err(e) => {
                ctx.log_error(e.to_string());
                self.save_failure(ctx);
                return Ok(());
            }
        };

        match service.transfer(None, &recipient, &self.amounts).await {
            Ok(transfer) => {
                if let Some(name) = &self.result_name {
                    ctx.set_result(
                        name,
                        transfer.actual_amount.to_string(),
                        Some(CATEGORY_SUCCESS.to_string()),
                        None,
                        None,
                    );
                }
                ctx.log_event(EventPayload::AirtimeTransferred {
                    sender: transfer.sender,
                    recipient: transfer.recipient,
                    currency: transfer.currency,
                    desired_amount: transfer.desired_amount,
                    actual_amount: transfer.actual_amount,
                });
            }
            Err(e) => {
                ctx.log_error(format!("airtime transfer failed: {e}"));
                self.save_failure(ctx);
            }
        }
        Ok(())
    }

    fn save_failure(&self, ctx: &mut StepCtx<'_>) {
        if let Some(name) = &self.result_name {
            ctx.set_result(
                name,
                String::new(),
                Some(CATEGORY_FAILURE.to_string()),
                None,
                None,
            );
        }
    }
}
