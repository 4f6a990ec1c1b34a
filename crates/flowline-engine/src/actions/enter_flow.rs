//! Flow composition: run a subflow, or ask the host for a new session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::EventPayload;
use crate::types::FlowRef;

/// Pushes a child run for the referenced flow. The current run's step
/// stays open while the child executes; when the child ends, this node's
/// router routes on `child.status`. A missing flow asset fails the run —
/// an ancestor may still route on that failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterFlowAction {
    pub uuid: Uuid,
    pub flow: FlowRef,
}

impl EnterFlowAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        match ctx.assets().flow(self.flow.uuid).await {
            Ok(flow) => ctx.push_flow(flow),
            Err(e) => ctx.fail_run(format!("missing flow dependency: {e}")),
        }
        Ok(())
    }
}

/// Emits a `session_triggered` event asking the hosting application to
/// start a new session for the referenced flow. Unlike `enter_flow`, the
/// new session is independent — nothing in this session waits on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionAction {
    pub uuid: Uuid,
    pub flow: FlowRef,
}

impl StartSessionAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let flow = match ctx.assets().flow(self.flow.uuid).await {
            Ok(flow) => flow,
            Err(e) => {
                ctx.log_error(e.to_string());
                return Ok(());
            }
        };
        let run_flow = ctx
            .assets()
            .flow(ctx.run().flow_uuid)
            .await
            .ok()
            .map(|f| f.reference());
        let run_summary = ctx.run().summary(run_flow.as_ref());
        ctx.log_event(EventPayload::SessionTriggered {
            flow: flow.reference(),
            contact: ctx.contact().cloned(),
            run_summary,
        });
        Ok(())
    }
}
