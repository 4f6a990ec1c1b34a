//! Group membership actions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::modifiers::{GroupModification, Modifier};
use crate::types::GroupRef;

/// Resolve group references against the asset store, logging an error event
/// for each that no longer exists.
async fn resolve_groups(ctx: &mut StepCtx<'_>, groups: &[GroupRef]) -> Vec<GroupRef> {
    let assets = ctx.assets();
    let mut resolved = Vec::with_capacity(groups.len());
    for group in groups {
        match assets.group(group.uuid).await {
            Ok(asset) => resolved.push(GroupRef {
                uuid: asset.uuid,
                name: asset.name.clone(),
            }),
            Err(e) => ctx.log_error(e.to_string()),
        }
    }
    resolved
}

/// Adds the contact to one or more groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddContactGroupsAction {
    pub uuid: Uuid,
    pub groups: Vec<GroupRef>,
}

impl AddContactGroupsAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let groups = resolve_groups(ctx, &self.groups).await;
        if !groups.is_empty() {
            ctx.apply_modifier(Modifier::Groups {
                groups,
                modification: GroupModification::Add,
            });
        }
        Ok(())
    }
}

/// Removes the contact from one or more groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveContactGroupsAction {
    pub uuid: Uuid,
    pub groups: Vec<GroupRef>,
}

impl RemoveContactGroupsAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let groups = resolve_groups(ctx, &self.groups).await;
        if !groups.is_empty() {
            ctx.apply_modifier(Modifier::Groups {
                groups,
                modification: GroupModification::Remove,
            });
        }
        Ok(())
    }
}
