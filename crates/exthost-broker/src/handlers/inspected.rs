//! Inspected page handlers: evaluation, reload, resources.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::dispatcher::{CallContext, CommandHandler, Reply};
use crate::evaluate::{EvaluateOptions, evaluate, outcome_to_result};
use crate::host::RevealTarget;
use crate::resources;

/// Params of `evaluateOnInspectedPage`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    /// Script to run.
    pub expression: String,
    /// Evaluation target.
    #[serde(default)]
    pub evaluate_options: Option<EvaluateOptions>,
}

/// Evaluates a script in the inspected page and returns its value.
pub struct EvaluateOnInspectedPageHandler;

#[async_trait]
impl CommandHandler for EvaluateOnInspectedPageHandler {
    type Params = EvaluateParams;

    #[instrument(skip(self, params, call), fields(command = "evaluateOnInspectedPage"))]
    async fn handle(&self, params: EvaluateParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let options = params.evaluate_options.unwrap_or_default();
        let outcome = evaluate(&call.broker, &params.expression, true, true, &options, &call.origin).await?;
        outcome_to_result(outcome).map(Reply::Value)
    }
}

/// Options of `Reload`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReloadOptions {
    /// User agent override; cleared when absent.
    pub user_agent: Option<String>,
    /// Bypass the cache.
    pub ignore_cache: bool,
    /// Script to run before any page script.
    pub injected_script: Option<String>,
}

/// Params of `Reload`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReloadParams {
    /// Reload options.
    pub options: ReloadOptions,
}

/// Reloads the inspected page.
pub struct ReloadHandler;

#[async_trait]
impl CommandHandler for ReloadHandler {
    type Params = ReloadParams;

    #[instrument(skip(self, params, call), fields(command = "Reload"))]
    async fn handle(&self, params: ReloadParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let ReloadOptions {
            user_agent,
            ignore_cache,
            injected_script,
        } = params.options;
        let host = &call.broker.host;
        host.network
            .set_user_agent_override(user_agent.as_deref().unwrap_or(""));
        let script = injected_script
            .filter(|s| !s.is_empty())
            .map(|s| format!("(function(){{{s}}})()"));
        info!(origin = %call.origin, ignore_cache, injected = script.is_some(), "reloading inspected page");
        host.page.reload(ignore_cache, script);
        Ok(Reply::ok())
    }
}

/// Lists the resources of the inspected page.
pub struct GetPageResourcesHandler;

#[async_trait]
impl CommandHandler for GetPageResourcesHandler {
    type Params = serde::de::IgnoredAny;

    #[instrument(skip_all, fields(command = "getPageResources"))]
    async fn handle(&self, _params: serde::de::IgnoredAny, call: &CallContext) -> Result<Reply, ExtensionError> {
        Ok(Reply::Value(resources::page_resources(&call.broker).into()))
    }
}

/// Params of commands addressing a resource by URL.
#[derive(Debug, Deserialize)]
pub struct UrlParams {
    /// Resource URL.
    pub url: String,
}

/// Reads the content of a source or page resource.
pub struct GetResourceContentHandler;

#[async_trait]
impl CommandHandler for GetResourceContentHandler {
    type Params = UrlParams;

    #[instrument(skip(self, call), fields(command = "getResourceContent"))]
    async fn handle(&self, params: UrlParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        resources::resource_content(&call.broker, &params.url)
            .await
            .map(Reply::Value)
    }
}

/// Params of `setResourceContent`.
#[derive(Deserialize)]
pub struct SetResourceContentParams {
    /// Source URL.
    pub url: String,
    /// New content.
    pub content: String,
    /// Commit the working copy.
    #[serde(default)]
    pub commit: bool,
}

/// Replaces the working copy of an editable source.
pub struct SetResourceContentHandler;

#[async_trait]
impl CommandHandler for SetResourceContentHandler {
    type Params = SetResourceContentParams;

    #[instrument(skip_all, fields(command = "setResourceContent", url = %params.url))]
    async fn handle(
        &self,
        params: SetResourceContentParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        resources::set_resource_content(&call.broker, &params.url, &params.content, params.commit)?;
        Ok(Reply::ok())
    }
}

/// Params of `openResource`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResourceParams {
    /// Resource URL.
    pub url: String,
    /// Zero-based line.
    #[serde(default)]
    pub line_number: u32,
}

/// Reveals a source, page resource or request in the host UI.
pub struct OpenResourceHandler;

#[async_trait]
impl CommandHandler for OpenResourceHandler {
    type Params = OpenResourceParams;

    #[instrument(skip(self, call), fields(command = "openResource"))]
    async fn handle(&self, params: OpenResourceParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let host = &call.broker.host;
        let url = params.url;
        let target = if host.workspace.source_for_url(&url).is_some() {
            RevealTarget::Source {
                url,
                line: params.line_number,
            }
        } else if host.page.resource_for_url(&url).is_some() {
            RevealTarget::Resource { url }
        } else if host.network.request_for_url(&url).is_some() {
            RevealTarget::Request { url }
        } else {
            return Err(ExtensionError::not_found(url));
        };
        host.frontend.reveal(target);
        Ok(Reply::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{call_context, make_test_context, params};
    use crate::host::{EvaluationOutcome, NetworkRequest, ProjectType, ResourceType};
    use serde_json::json;

    #[tokio::test]
    async fn evaluate_returns_value_wrapper() {
        let (ctx, host) = make_test_context();
        host.script_evaluation("1 + 1", EvaluationOutcome::Value(json!(2)));
        let (call, _rx) = call_context(&ctx, "evaluateOnInspectedPage");
        let reply = EvaluateOnInspectedPageHandler
            .handle(params(json!({"expression": "1 + 1"})), &call)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Value(json!({"value": 2})));

        let (_, request) = host.evaluations().remove(0);
        assert!(request.include_command_line_api);
        assert!(request.return_by_value);
    }

    #[tokio::test]
    async fn evaluate_exception_is_a_value() {
        let (ctx, host) = make_test_context();
        host.script_evaluation("x", EvaluationOutcome::Exception { description: "ReferenceError: x".into() });
        let (call, _rx) = call_context(&ctx, "evaluateOnInspectedPage");
        let reply = EvaluateOnInspectedPageHandler
            .handle(params(json!({"expression": "x"})), &call)
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Value(json!({"isException": true, "value": "ReferenceError: x"}))
        );
    }

    #[tokio::test]
    async fn reload_wraps_injected_script() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "Reload");
        let reply = ReloadHandler
            .handle(
                params(json!({"options": {"userAgent": "Bot/1", "ignoreCache": true, "injectedScript": "hook()"}})),
                &call,
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::ok());
        assert_eq!(host.user_agent(), "Bot/1");
        assert_eq!(
            host.reloads(),
            vec![(true, Some("(function(){hook()})()".to_owned()))]
        );
    }

    #[tokio::test]
    async fn reload_without_options_clears_user_agent() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "Reload");
        let _ = ReloadHandler
            .handle(params(json!({"options": {"userAgent": "A"}})), &call)
            .await
            .unwrap();
        let _ = ReloadHandler.handle(params(json!({})), &call).await.unwrap();
        assert_eq!(host.user_agent(), "");
        assert_eq!(host.reloads()[1], (false, None));
    }

    #[tokio::test]
    async fn resources_roundtrip_through_handlers() {
        let (ctx, host) = make_test_context();
        host.add_source("https://inspected.example/app.js", ResourceType::Script, ProjectType::Network, "old");
        let (call, _rx) = call_context(&ctx, "setResourceContent");

        let listed = GetPageResourcesHandler
            .handle(params(json!({})), &call)
            .await
            .unwrap();
        assert_eq!(
            listed,
            Reply::Value(json!([{"url": "https://inspected.example/app.js", "type": "script"}]))
        );

        let _ = SetResourceContentHandler
            .handle(
                params(json!({"url": "https://inspected.example/app.js", "content": "new", "commit": true})),
                &call,
            )
            .await
            .unwrap();
        let reply = GetResourceContentHandler
            .handle(params(json!({"url": "https://inspected.example/app.js"})), &call)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Value(json!({"encoding": "", "content": "new"})));
    }

    #[tokio::test]
    async fn open_resource_prefers_source_then_resource_then_request() {
        let (ctx, host) = make_test_context();
        host.add_source("https://inspected.example/a.js", ResourceType::Script, ProjectType::Network, "");
        host.add_frame_resource("https://inspected.example/b.css", ResourceType::Stylesheet, "");
        host.add_request(
            NetworkRequest {
                id: "r1".into(),
                url: "https://api.example/c".into(),
                method: "GET".into(),
                status: Some(200),
                mime_type: None,
            },
            None,
        );
        let (call, _rx) = call_context(&ctx, "openResource");
        for url in [
            "https://inspected.example/a.js",
            "https://inspected.example/b.css",
            "https://api.example/c",
        ] {
            let reply = OpenResourceHandler
                .handle(params(json!({"url": url, "lineNumber": 4})), &call)
                .await
                .unwrap();
            assert_eq!(reply, Reply::ok());
        }
        assert_eq!(
            host.ui().reveals,
            vec![
                RevealTarget::Source { url: "https://inspected.example/a.js".into(), line: 4 },
                RevealTarget::Resource { url: "https://inspected.example/b.css".into() },
                RevealTarget::Request { url: "https://api.example/c".into() },
            ]
        );

        let err = OpenResourceHandler
            .handle(params(json!({"url": "https://nowhere/"})), &call)
            .await
            .unwrap_err();
        assert_eq!(err, ExtensionError::not_found("https://nowhere/"));
    }
}
