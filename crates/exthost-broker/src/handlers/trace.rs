//! Trace provider handlers.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::dispatcher::{CallContext, CommandHandler, Reply};
use crate::objects::{ClientObject, TraceProvider};

/// Params of `addTraceProvider`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTraceProviderParams {
    /// Client id.
    pub id: String,
    /// Category shown in the recording settings.
    pub category_name: String,
    /// Tooltip of the category.
    #[serde(default)]
    pub category_tooltip: String,
}

/// Registers a trace category contributed by an extension.
pub struct AddTraceProviderHandler;

#[async_trait]
impl CommandHandler for AddTraceProviderHandler {
    type Params = AddTraceProviderParams;

    #[instrument(skip(self, call), fields(command = "addTraceProvider"))]
    async fn handle(
        &self,
        params: AddTraceProviderParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        call.broker.objects.create(
            &params.id,
            &call.origin,
            ClientObject::TraceProvider(TraceProvider {
                category_name: params.category_name.clone(),
                category_tooltip: params.category_tooltip.clone(),
            }),
        )?;
        call.broker.host.frontend.add_trace_provider(
            &params.id,
            call.origin.as_str(),
            &params.category_name,
            &params.category_tooltip,
        );
        Ok(Reply::Empty)
    }
}

/// Params of `completeTraceSession`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTraceSessionParams {
    /// Session id from the `trace-recording-started` notification.
    pub id: String,
    /// Where the recorded trace can be fetched.
    #[serde(default)]
    pub url: Option<String>,
    /// Offset of the extension's clock, in milliseconds.
    #[serde(default)]
    pub time_offset: f64,
}

/// Delivers the data of a finished trace recording.
pub struct CompleteTraceSessionHandler;

#[async_trait]
impl CommandHandler for CompleteTraceSessionHandler {
    type Params = CompleteTraceSessionParams;

    #[instrument(skip(self, call), fields(command = "completeTraceSession"))]
    async fn handle(
        &self,
        params: CompleteTraceSessionParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let session = call
            .broker
            .traces
            .take(&params.id)
            .ok_or_else(|| ExtensionError::not_found(params.id.clone()))?;
        info!(session = %params.id, has_url = params.url.is_some(), "trace session completed");
        session.complete(params.url, params.time_offset);
        Ok(Reply::Empty)
    }
}
