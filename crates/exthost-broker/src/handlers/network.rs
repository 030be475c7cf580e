//! Network handlers: extra headers, HAR export, response bodies.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::dispatcher::{CallContext, CommandHandler, Reply, json_type_name};
use crate::resources;

/// Params of `addRequestHeaders`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequestHeadersParams {
    /// Id the headers are filed under; must be a string.
    #[serde(default)]
    pub extension_id: Option<Value>,
    /// Header name → value.
    #[serde(default)]
    pub headers: Map<String, Value>,
}

/// Adds extra headers to every request the inspected page makes.
pub struct AddRequestHeadersHandler;

#[async_trait]
impl CommandHandler for AddRequestHeadersHandler {
    type Params = AddRequestHeadersParams;

    #[instrument(skip(self, call), fields(command = "addRequestHeaders"))]
    async fn handle(
        &self,
        params: AddRequestHeadersParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let extension_id = match &params.extension_id {
            Some(Value::String(id)) => id.as_str(),
            Some(other) => {
                return Err(ExtensionError::bad_arg_type(
                    "extensionId",
                    json_type_name(other),
                    "string",
                ));
            }
            None => {
                return Err(ExtensionError::bad_arg_type("extensionId", "undefined", "string"));
            }
        };
        let merged = call.broker.headers.add(extension_id, &params.headers);
        call.broker.host.network.set_extra_headers(merged);
        Ok(Reply::Empty)
    }
}

/// Exports the network log as HAR, each entry tagged with its request id.
pub struct GetHarHandler;

#[async_trait]
impl CommandHandler for GetHarHandler {
    type Params = serde::de::IgnoredAny;

    #[instrument(skip_all, fields(command = "getHAR"))]
    async fn handle(&self, _params: serde::de::IgnoredAny, call: &CallContext) -> Result<Reply, ExtensionError> {
        let network = &call.broker.host.network;
        let requests = network.requests();
        let mut har = network.har_log(&requests).await;

        if let Some(entries) = har.get_mut("entries").and_then(Value::as_array_mut) {
            for (entry, request) in entries.iter_mut().zip(&requests) {
                if let Some(entry) = entry.as_object_mut() {
                    let id = call.broker.requests.id_for(request);
                    let _ = entry.insert("_requestId".to_owned(), id.into());
                }
            }
        }
        debug!(entries = requests.len(), "HAR exported");
        Ok(Reply::Value(har))
    }
}

/// Params of `getRequestContent`.
#[derive(Debug, Deserialize)]
pub struct GetRequestContentParams {
    /// Id from a HAR entry's `_requestId`.
    pub id: Value,
}

/// Reads a response body by request id.
pub struct GetRequestContentHandler;

#[async_trait]
impl CommandHandler for GetRequestContentHandler {
    type Params = GetRequestContentParams;

    #[instrument(skip(self, call), fields(command = "getRequestContent"))]
    async fn handle(
        &self,
        params: GetRequestContentParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        resources::request_content(&call.broker, &params.id)
            .await
            .map(Reply::Value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{call_context, make_test_context, params};
    use crate::host::NetworkRequest;
    use serde_json::json;

    fn request(id: &str, url: &str) -> NetworkRequest {
        NetworkRequest {
            id: id.into(),
            url: url.into(),
            method: "GET".into(),
            status: Some(200),
            mime_type: Some("text/plain".into()),
        }
    }

    #[tokio::test]
    async fn headers_reach_network_log() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "addRequestHeaders");
        let reply = AddRequestHeadersHandler
            .handle(
                params(json!({"extensionId": "ext", "headers": {"X-Trace": "on", "X-Bad": 1}})),
                &call,
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::Empty);
        assert_eq!(host.extra_headers().len(), 1);
        assert_eq!(host.extra_headers()["X-Trace"], "on");
    }

    #[tokio::test]
    async fn headers_need_string_extension_id() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "addRequestHeaders");
        let err = AddRequestHeadersHandler
            .handle(params(json!({"extensionId": 7, "headers": {}})), &call)
            .await
            .unwrap_err();
        assert_eq!(err, ExtensionError::bad_arg_type("extensionId", "number", "string"));

        let err = AddRequestHeadersHandler
            .handle(params(json!({"headers": {"X-A": "1"}})), &call)
            .await
            .unwrap_err();
        assert_eq!(err, ExtensionError::bad_arg_type("extensionId", "undefined", "string"));
        assert!(host.extra_headers().is_empty());
    }

    #[tokio::test]
    async fn har_entries_carry_request_ids() {
        let (ctx, host) = make_test_context();
        host.add_request(request("r1", "https://a/1"), Some("body one"));
        host.add_request(request("r2", "https://a/2"), None);
        let (call, _rx) = call_context(&ctx, "getHAR");

        let Reply::Value(har) = GetHarHandler.handle(params(json!({})), &call).await.unwrap() else {
            panic!("expected a value reply");
        };
        let entries = har["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        let first = entries[0]["_requestId"].clone();
        assert_ne!(first, entries[1]["_requestId"]);

        let reply = GetRequestContentHandler
            .handle(params(json!({"id": first})), &call)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Value(json!({"encoding": "", "content": "body one"})));

        // Ids are stable across exports.
        let Reply::Value(again) = GetHarHandler.handle(params(json!({})), &call).await.unwrap() else {
            panic!("expected a value reply");
        };
        assert_eq!(again["entries"][0]["_requestId"], first);
    }

    #[tokio::test]
    async fn unknown_request_id_is_not_found() {
        let (ctx, _host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "getRequestContent");
        let err = GetRequestContentHandler
            .handle(params(json!({"id": 99})), &call)
            .await
            .unwrap_err();
        assert_eq!(err, ExtensionError::not_found("99"));
    }
}
