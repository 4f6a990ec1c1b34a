//! Call an external service over HTTP.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::save_webhook_result;
use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::EventPayload;
use crate::services::WebhookRequest;

/// Calls an external service. `url`, `headers` and `body` are templates
/// evaluated at runtime. A `webhook_called` event records the outcome; if
/// `result_name` is set a result is additionally saved, with the parsed
/// response as `extra` when `response_as_extra` is set. The parsed response
/// also becomes the run's `webhook` scratch value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallWebhookAction {
    pub uuid: Uuid,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub response_as_extra: bool,
}

const VALID_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

impl CallWebhookAction {
    pub(crate) fn validate(&self) -> Result<(), String> {
        let method = self.method.to_uppercase();
        if !VALID_METHODS.contains(&method.as_str()) {
            return Err(format!("'{}' is not a valid HTTP method", self.method));
        }
        for name in self.headers.keys() {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_graphic() && c != ':') {
                return Err(format!("'{name}' is not a valid HTTP header name"));
            }
        }
        Ok(())
    }

    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        let url = ctx.eval_template(&self.url).await;
        if url.is_empty() {
            ctx.log_error("webhook URL evaluated to empty string".into());
            return Ok(());
        }
        if reqwest::Url::parse(&url).is_err() {
            ctx.log_error(format!("webhook URL evaluated to an invalid URL: '{url}'"));
            return Ok(());
        }

        let method = self.method.to_uppercase();
        let body = if self.body.is_empty() {
            String::new()
        } else {
            ctx.eval_template(&self.body).await
        };

        let mut headers = Vec::with_capacity(self.headers.len());
        for (name, template) in &self.headers {
            let value = ctx.eval_template(template).await;
            headers.push((name.clone(), value));
        }

        let service = match ctx.webhook_service() {
            Ok(service) => service,
            Err(e) => {
                ctx.log_error(e.to_string());
                return Ok(());
            }
        };

        let call = service
            .call(&WebhookRequest {
                method,
                url,
                headers,
                body,
            })
            .await;
        let status = call.status(false);

        ctx.log_event(EventPayload::WebhookCalled {
            url: call.url.clone(),
            status,
            status_code: call.status_code,
            elapsed_ms: call.elapsed_ms,
            request: call.request.clone(),
            response: call.response.clone(),
            resthook: None,
        });

        // a connection error leaves the scratch value as JSON null
        ctx.set_webhook(Some(call.response_json().unwrap_or(Value::Null)));

        if let Some(name) = &self.result_name {
            save_webhook_result(ctx, name, &call, status, self.response_as_extra);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(raw: Value) -> CallWebhookAction {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn validate_accepts_common_methods() {
        for method in ["GET", "post", "Put", "DELETE"] {
            let a = action(json!({
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "method": method,
                "url": "http://x",
            }));
            assert!(a.validate().is_ok(), "method {method} should be valid");
        }
    }

    #[test]
    fn validate_rejects_bad_method_and_header() {
        let a = action(json!({
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
            "method": "TELEPORT",
            "url": "http://x",
        }));
        assert!(a.validate().is_err());

        let a = action(json!({
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
            "method": "GET",
            "url": "http://x",
            "headers": {"bad header": "v"},
        }));
        assert!(a.validate().is_err());
    }

    #[test]
    fn optional_fields_default() {
        let a = action(json!({
            "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
            "method": "GET",
            "url": "http://x",
        }));
        assert!(a.body.is_empty());
        assert!(a.headers.is_empty());
        assert!(a.result_name.is_none());
        assert!(!a.response_as_extra);
    }
}
