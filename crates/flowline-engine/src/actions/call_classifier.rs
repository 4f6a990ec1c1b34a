//! Classify input text with an NLU service.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{CATEGORY_FAILURE, CATEGORY_SUCCESS};
use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::EventPayload;
use crate::types::ClassifierRef;

/// Category recorded when there was nothing to classify.
const CATEGORY_SKIPPED: &str = "Skipped";

/// Runs the evaluated `input` through an NLU classifier. The result value
/// is the top intent; the full classification lands in `extra`. Empty
/// input records a `Skipped` result without calling the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallClassifierAction {
    pub uuid: Uuid,
    pub classifier: ClassifierRef,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl CallClassifierAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let query = ctx.eval_template(&self.input).await;

        if query.is_empty() {
            if let Some(name) = &self.result_name {
                ctx.set_result(
                    name,
                    String::new(),
                    Some(CATEGORY_SKIPPED.to_string()),
                    Some(query),
                    None,
                );
            }
            return Ok(());
        }

        let classifier = match ctx.assets().classifier(self.classifier.uuid).await {
            Ok(classifier) => classifier,
            Err(e) => {
                ctx.log_error(e.to_string());
                self.save_failure(ctx, &query);
                return Ok(());
            }
        };

        let service = match ctx.classification_service(&classifier) {
            Ok(service) => service,
            Err(e) => {
                ctx.log_error(e.to_string());
                self.save_failure(ctx, &query);
                return Ok(());
            }
        };

        match service.classify(&query).await {
            Ok(classification) => {
                ctx.log_event(EventPayload::ClassifierCalled {
                    classifier: self.classifier.clone(),
                    query: query.clone(),
                    classification: classification.clone(),
                });
                if let Some(name) = &self.result_name {
                    let top_intent = classification
                        .intents
                        .first()
                        .map(|i| i.name.clone())
                        .unwrap_or_default();
                    ctx.set_result(
                        name,
                        top_intent,
                        Some(CATEGORY_SUCCESS.to_string()),
                        Some(query),
                        Some(json!(classification)),
                    );
                }
            }
            Err(e) => {
                ctx.log_error(e.to_string());
                self.save_failure(ctx, &query);
            }
        }

        Ok(())
    }

    fn save_failure(&self, ctx: &mut StepCtx<'_>, query: &str) {
        if let Some(name) = &self.result_name {
            ctx.set_result(
                name,
                String::new(),
                Some(CATEGORY_FAILURE.to_string()),
                Some(query.to_string()),
                None,
            );
        }
    }
}
