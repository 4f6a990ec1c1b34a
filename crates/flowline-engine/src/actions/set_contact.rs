//! Contact mutation actions: name, language, fields, URNs.
//!
//! Each evaluates its templates and applies a [`Modifier`] through the
//! step context so the change is audited and surfaced as a `contact_*`
//! event.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::modifiers::Modifier;
use crate::types::{FieldRef, Urn};

/// Sets the contact's name. An empty evaluation clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactNameAction {
    pub uuid: Uuid,
    pub name: String,
}

impl SetContactNameAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let name = ctx.eval_template(&self.name).await;
        let name = if name.is_empty() { None } else { Some(name) };
        ctx.apply_modifier(Modifier::Name { name });
        Ok(())
    }
}

/// Sets the contact's preferred language. An empty evaluation clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactLanguageAction {
    pub uuid: Uuid,
    pub language: String,
}

impl SetContactLanguageAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let language = ctx.eval_template(&self.language).await;
        let language = if language.is_empty() {
            None
        } else {
            Some(language)
        };
        ctx.apply_modifier(Modifier::Language { language });
        Ok(())
    }
}

/// Sets a value on one of the contact's fields. An empty evaluation clears
/// the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactFieldAction {
    pub uuid: Uuid,
    pub field: FieldRef,
    pub value: String,
}

impl SetContactFieldAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let value = ctx.eval_template(&self.value).await;
        let value = if value.is_empty() {
            Value::Null
        } else {
            Value::String(value)
        };
        ctx.apply_modifier(Modifier::Field {
            field: self.field.clone(),
            value,
        });
        Ok(())
    }
}

/// Adds a URN to the contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddContactUrnAction {
    pub uuid: Uuid,
    pub scheme: String,
    pub path: String,
}

impl AddContactUrnAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let path = ctx.eval_template(&self.path).await;
        if path.is_empty() {
            ctx.log_error("URN path evaluated to empty string, skipping".into());
            return Ok(());
        }
        ctx.apply_modifier(Modifier::Urns {
            urns: vec![Urn::new(&self.scheme, &path)],
        });
        Ok(())
    }
}
