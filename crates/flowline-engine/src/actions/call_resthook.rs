//! Call a resthook — a named set of subscriber URLs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{save_webhook_result, CATEGORY_FAILURE};
use crate::context::StepCtx;
use crate::errors::EngineError;
use crate::events::EventPayload;
use crate::services::WebhookRequest;
use crate::types::WebhookCall;

/// Calls each subscriber of a resthook with a canonical JSON payload built
/// from the run. One `resthook_called` event records the payload, plus one
/// `webhook_called` event per subscriber. If `result_name` is set, a single
/// result is saved from the aggregate of the calls: the last hard failure
/// wins over the last success, which wins over the last unsubscribe (410).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResthookAction {
    pub uuid: Uuid,
    pub resthook: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl CallResthookAction {
    pub(crate) async fn execute(&self, ctx: &mut StepCtx<'_>) -> Result<(), EngineError> {
        // NOOP if the resthook doesn't exist
        let resthook = match ctx.assets().resthook(&self.resthook).await {
            Ok(resthook) => resthook,
            Err(crate::assets::AssetError::NotFound { .. }) => return Ok(()),
            Err(e) => {
                ctx.log_error(e.to_string());
                return Ok(());
            }
        };

        let payload = self.build_payload(ctx).await;
        ctx.log_event(EventPayload::ResthookCalled {
            resthook: self.resthook.clone(),
            payload: payload.clone(),
        });

        let body = payload.to_string();
        let service = match ctx.webhook_service() {
            Ok(service) => service,
            Err(e) => {
                ctx.log_error(e.to_string());
                return Ok(());
            }
        };

        let mut calls = Vec::with_capacity(resthook.subscribers.len());
        for url in &resthook.subscribers {
            let mut call = service
                .call(&WebhookRequest {
                    method: "POST".into(),
                    url: url.clone(),
                    headers: vec![("Content-Type".into(), "application/json".into())],
                    body: body.clone(),
                })
                .await;
            call.resthook = Some(self.resthook.clone());

            ctx.log_event(EventPayload::WebhookCalled {
                url: call.url.clone(),
                status: call.status(true),
                status_code: call.status_code,
                elapsed_ms: call.elapsed_ms,
                request: call.request.clone(),
                response: call.response.clone(),
                resthook: Some(self.resthook.clone()),
            });
            calls.push(call);
        }

        let as_result = pick_result_call(&calls);
        if let Some(call) = as_result {
            ctx.set_webhook(Some(call.response_json().unwrap_or(Value::Null)));
        }

        if let Some(name) = &self.result_name {
            match as_result {
                Some(call) => {
                    save_webhook_result(ctx, name, call, call.status(true), false);
                }
                None => {
                    ctx.set_result(
                        name,
                        "no subscribers".into(),
                        Some(CATEGORY_FAILURE.to_string()),
                        None,
                        None,
                    );
                }
            }
        }

        Ok(())
    }

    /// The canonical payload POSTed to every subscriber.
    async fn build_payload(&self, ctx: &mut StepCtx<'_>) -> Value {
        let redaction = ctx.session().environment().redaction_policy;
        let contact = ctx.contact().map(|c| {
            json!({
                "uuid": c.uuid,
                "name": c.name,
                "urn": c.preferred_urn().map(|u| u.redacted(redaction)),
            })
        });
        let input = ctx.input().map(|i| {
            json!({
                "attachments": i.attachments,
                "channel": i.channel,
                "created_on": i.created_on,
                "text": i.text,
                "type": "msg",
                "urn": i.urn.as_ref().map(|u| json!({
                    "display": "",
                    "path": u.path(),
                    "scheme": u.scheme(),
                })),
                "uuid": i.uuid,
            })
        });
        let channel = ctx.input().and_then(|i| i.channel.clone());

        let run = ctx.run();
        let flow_uuid = run.flow_uuid;
        let flow = ctx
            .assets()
            .flow(flow_uuid)
            .await
            .ok()
            .map(|f| f.reference());

        let run = ctx.run();
        json!({
            "contact": contact,
            "flow": flow,
            "path": run.path,
            "results": run.results_detail(),
            "run": {
                "uuid": run.uuid,
                "created_on": run.created_on,
            },
            "input": input,
            "channel": channel,
        })
    }
}

/// Pick the call whose outcome becomes this action's result:
/// 1. any hard error (non-2xx, non-410) → the last such
/// 2. otherwise any success → the last 2xx
/// 3. otherwise the last 410
fn pick_result_call(calls: &[WebhookCall]) -> Option<&WebhookCall> {
    let mut last_success = None;
    let mut last_410 = None;
    let mut last_failure = None;

    for call in calls {
        if call.status_code / 100 == 2 {
            last_success = Some(call);
        } else if call.status_code == 410 {
            last_410 = Some(call);
        } else {
            last_failure = Some(call);
        }
    }

    last_failure.or(last_success).or(last_410)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(status_code: u16) -> WebhookCall {
        WebhookCall {
            url: format!("http://host/{status_code}"),
            method: "POST".into(),
            status_code,
            request: String::new(),
            response: String::new(),
            elapsed_ms: 1,
            resthook: None,
        }
    }

    #[test]
    fn failure_beats_success_beats_gone() {
        let calls = vec![call(200), call(410), call(500)];
        assert_eq!(pick_result_call(&calls).unwrap().status_code, 500);

        let calls = vec![call(200), call(410), call(201)];
        assert_eq!(pick_result_call(&calls).unwrap().status_code, 201);

        let calls = vec![call(410), call(410)];
        let picked = pick_result_call(&calls).unwrap();
        assert_eq!(picked.status_code, 410);
        assert_eq!(picked.url, "http://host/410");
    }

    #[test]
    fn connection_error_counts_as_failure() {
        let calls = vec![call(200), call(0)];
        assert_eq!(pick_result_call(&calls).unwrap().status_code, 0);
    }

    #[test]
    fn no_calls_no_result() {
        assert!(pick_result_call(&[]).is_none());
    }

    #[test]
    fn last_of_kind_wins() {
        let calls = vec![call(500), call(503)];
        assert_eq!(pick_result_call(&calls).unwrap().status_code, 503);
    }
}
