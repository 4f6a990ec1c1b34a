//! Save an explicit result on the run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;

/// Saves a named result whose value is an evaluated template. Results are
/// visible to later expressions in the same step and onward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRunResultAction {
    pub uuid: Uuid,
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl SetRunResultAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let value = ctx.eval_template(&self.value).await;
        ctx.set_result(&self.name, value, self.category.clone(), None, None);
        Ok(())
    }
}
