//! Sidebar pane handlers.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::dispatcher::{CallContext, CommandHandler, Reply, json_type_name};
use crate::evaluate::{EvaluateOptions, evaluate};
use crate::host::EvaluationOutcome;
use crate::objects::{ClientObject, SidebarPane};
use crate::paths::expand_resource_path;

/// Host panels that accept extension sidebars.
const SIDEBAR_PANELS: [&str; 2] = ["elements", "sources"];

/// Params of `createSidebarPane`.
#[derive(Debug, Deserialize)]
pub struct CreateSidebarPaneParams {
    /// Client id.
    pub id: String,
    /// Host panel: `elements` or `sources`.
    pub panel: String,
    /// Pane title.
    pub title: String,
}

/// Adds a sidebar pane to the elements or sources panel.
pub struct CreateSidebarPaneHandler;

#[async_trait]
impl CommandHandler for CreateSidebarPaneHandler {
    type Params = CreateSidebarPaneParams;

    #[instrument(skip(self, call), fields(command = "createSidebarPane"))]
    async fn handle(
        &self,
        params: CreateSidebarPaneParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        if !SIDEBAR_PANELS.contains(&params.panel.as_str()) {
            return Err(ExtensionError::not_found(params.panel));
        }
        call.broker.objects.create(
            &params.id,
            &call.origin,
            ClientObject::SidebarPane(SidebarPane {
                panel: params.panel.clone(),
                title: params.title.clone(),
                height: None,
                page: None,
            }),
        )?;
        call.broker
            .host
            .frontend
            .add_sidebar_pane(&params.panel, &params.id, &params.title);
        Ok(Reply::ok())
    }
}

/// Params of `setSidebarHeight`.
#[derive(Debug, Deserialize)]
pub struct SetSidebarHeightParams {
    /// Client id.
    pub id: String,
    /// CSS height.
    pub height: String,
}

/// Resizes a sidebar pane.
pub struct SetSidebarHeightHandler;

#[async_trait]
impl CommandHandler for SetSidebarHeightHandler {
    type Params = SetSidebarHeightParams;

    #[instrument(skip(self, call), fields(command = "setSidebarHeight"))]
    async fn handle(
        &self,
        params: SetSidebarHeightParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let _ = call
            .broker
            .objects
            .update_sidebar(&params.id, |pane| pane.height = Some(params.height.clone()))?;
        call.broker
            .host
            .frontend
            .set_sidebar_height(&params.id, &params.height);
        Ok(Reply::ok())
    }
}

/// Params of `setSidebarContent`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSidebarContentParams {
    /// Client id.
    pub id: String,
    /// The object to show, or the script producing it.
    pub expression: Value,
    /// Title of the object tree root.
    #[serde(default)]
    pub root_title: Option<String>,
    /// Treat `expression` as script to evaluate in the page.
    #[serde(default)]
    pub evaluate_on_page: bool,
    /// Evaluation target.
    #[serde(default)]
    pub evaluate_options: Option<EvaluateOptions>,
}

/// Shows a JSON object, or the result of a page evaluation, in a pane.
pub struct SetSidebarContentHandler;

#[async_trait]
impl CommandHandler for SetSidebarContentHandler {
    type Params = SetSidebarContentParams;

    #[instrument(skip(self, call), fields(command = "setSidebarContent"))]
    async fn handle(
        &self,
        params: SetSidebarContentParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let _ = call.broker.objects.sidebar(&params.id)?;

        let object = if params.evaluate_on_page {
            let Value::String(expression) = &params.expression else {
                return Err(ExtensionError::bad_arg_type(
                    "expression",
                    json_type_name(&params.expression),
                    "string",
                ));
            };
            let options = params.evaluate_options.unwrap_or_default();
            match evaluate(&call.broker, expression, true, false, &options, &call.origin).await? {
                EvaluationOutcome::Error(error) => return Err(ExtensionError::failed(error)),
                EvaluationOutcome::Exception { description } => {
                    return Err(ExtensionError::failed(description));
                }
                EvaluationOutcome::Value(value) => value,
            }
        } else {
            params.expression
        };

        debug!(pane = %params.id, "setting sidebar object");
        call.broker
            .host
            .frontend
            .set_sidebar_object(&params.id, object, params.root_title)
            .map_err(ExtensionError::failed)?;
        Ok(Reply::ok())
    }
}

/// Params of `setSidebarPage`.
#[derive(Debug, Deserialize)]
pub struct SetSidebarPageParams {
    /// Client id.
    pub id: String,
    /// Extension-relative page.
    #[serde(default)]
    pub page: Option<String>,
}

/// Shows an extension page in a pane.
pub struct SetSidebarPageHandler;

#[async_trait]
impl CommandHandler for SetSidebarPageHandler {
    type Params = SetSidebarPageParams;

    #[instrument(skip(self, call), fields(command = "setSidebarPage"))]
    async fn handle(&self, params: SetSidebarPageParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let page = expand_resource_path(&call.origin, params.page.as_deref());
        let _ = call
            .broker
            .objects
            .update_sidebar(&params.id, |pane| pane.page.clone_from(&page))?;
        call.broker.host.frontend.set_sidebar_page(&params.id, page);
        Ok(Reply::Empty)
    }
}
