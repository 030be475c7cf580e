//! Script evaluation in the inspected page on behalf of an extension.
//!
//! Target selection, in order:
//!
//! 1. frame: the frame whose URL equals `frameURL`, else the main frame
//!    (an empty `frameURL` counts as absent);
//! 2. the frame URL must pass the permission gate;
//! 3. context: a named non-default context when the extension asks for its
//!    content-script world or an explicit non-empty security origin, else
//!    the frame's main world;
//! 4. the context origin must pass the permission gate.

use exthost_core::ExtensionError;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::BrokerContext;
use crate::host::{EvaluateRequest, EvaluationOutcome, ExecutionContextInfo, FrameInfo};
use crate::origins::Origin;

/// Object group for every handle created by extension evaluations.
pub const OBJECT_GROUP: &str = "extension";

/// Evaluation target options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateOptions {
    /// URL of the frame to evaluate in.
    #[serde(rename = "frameURL")]
    pub frame_url: Option<String>,
    /// Evaluate in the calling extension's content-script world.
    pub use_content_script_context: bool,
    /// Evaluate in the context with this security origin.
    pub script_execution_context: Option<String>,
}

/// Pick the frame and context, then evaluate.
pub async fn evaluate(
    broker: &BrokerContext,
    expression: &str,
    expose_command_line_api: bool,
    return_by_value: bool,
    options: &EvaluateOptions,
    caller: &Origin,
) -> Result<EvaluationOutcome, ExtensionError> {
    let frame_url = options.frame_url.as_deref().filter(|url| !url.is_empty());
    let frame = select_frame(broker, frame_url)?;
    if !broker.can_act_on_url(&frame.url) {
        return Err(ExtensionError::permission_denied());
    }

    let wanted_origin = if options.use_content_script_context {
        Some(caller.as_str())
    } else {
        options
            .script_execution_context
            .as_deref()
            .filter(|origin| !origin.is_empty())
    };
    let context = select_context(broker, &frame, wanted_origin)?;
    if !broker.can_act_on_url(&context.origin) {
        return Err(ExtensionError::permission_denied());
    }

    debug!(frame = %frame.url, context = context.id, "evaluating extension script");
    let request = EvaluateRequest {
        expression: expression.to_owned(),
        include_command_line_api: expose_command_line_api,
        return_by_value,
        object_group: OBJECT_GROUP,
    };
    Ok(broker.host.page.evaluate(&context, request).await)
}

fn select_frame(broker: &BrokerContext, frame_url: Option<&str>) -> Result<FrameInfo, ExtensionError> {
    let page = &broker.host.page;
    let frame = match frame_url {
        Some(url) => page.frames().into_iter().find(|f| f.url == url),
        None => page.main_frame(),
    };
    frame.ok_or_else(|| ExtensionError::not_found(frame_url.unwrap_or("<top>")))
}

fn select_context(
    broker: &BrokerContext,
    frame: &FrameInfo,
    origin: Option<&str>,
) -> Result<ExecutionContextInfo, ExtensionError> {
    let contexts = broker.host.page.execution_contexts(&frame.id);
    match origin {
        Some(origin) => contexts
            .into_iter()
            .find(|c| !c.is_default && c.origin == origin)
            .ok_or_else(|| ExtensionError::not_found(origin)),
        None => contexts
            .into_iter()
            .find(|c| c.is_default)
            .ok_or_else(|| ExtensionError::failed(format!("{} has no execution context", frame.url))),
    }
}

/// Reply for `evaluateOnInspectedPage`.
pub fn outcome_to_result(outcome: EvaluationOutcome) -> Result<Value, ExtensionError> {
    match outcome {
        EvaluationOutcome::Error(error) => Err(ExtensionError::protocol(error)),
        EvaluationOutcome::Exception { description } => {
            Ok(json!({ "isException": true, "value": description }))
        }
        EvaluationOutcome::Value(value) => Ok(json!({ "value": value })),
    }
}
