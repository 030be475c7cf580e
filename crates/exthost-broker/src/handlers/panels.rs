//! Panel handlers: createPanel, showPanel, createToolbarButton, updateButton.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use tracing::instrument;

use crate::dispatcher::{CallContext, CommandHandler, Reply};
use crate::objects::{Button, ClientObject, Panel};
use crate::paths::expand_resource_path;

/// Params of `createPanel`.
#[derive(Debug, Deserialize)]
pub struct CreatePanelParams {
    /// Client id.
    pub id: String,
    /// Tab title.
    pub title: String,
    /// Extension-relative page.
    #[serde(default)]
    pub page: Option<String>,
}

/// Adds an extension panel to the host.
pub struct CreatePanelHandler;

#[async_trait]
impl CommandHandler for CreatePanelHandler {
    type Params = CreatePanelParams;

    #[instrument(skip(self, call), fields(command = "createPanel"))]
    async fn handle(&self, params: CreatePanelParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let view_id: String = format!("{}{}", call.origin, params.title)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let page = expand_resource_path(&call.origin, params.page.as_deref());
        let frontend = &call.broker.host.frontend;

        call.broker.objects.create_unless_taken(
            &params.id,
            &call.origin,
            ClientObject::Panel(Panel {
                view_id: view_id.clone(),
                title: params.title.clone(),
                page: page.clone(),
            }),
            |id| frontend.has_panel(id),
        )?;
        frontend.add_panel(&view_id, &params.title, page);
        Ok(Reply::ok())
    }
}

/// Params of commands addressing one object by id.
#[derive(Debug, Deserialize)]
pub struct IdParams {
    /// Client id.
    pub id: String,
}

/// Brings a panel to front. Unknown ids are passed through as host panel ids.
pub struct ShowPanelHandler;

#[async_trait]
impl CommandHandler for ShowPanelHandler {
    type Params = IdParams;

    #[instrument(skip(self, call), fields(command = "showPanel"))]
    async fn handle(&self, params: IdParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let view_id = call
            .broker
            .objects
            .panel(&params.id)
            .map_or(params.id, |panel| panel.view_id);
        call.broker.host.frontend.show_panel(&view_id);
        Ok(Reply::Empty)
    }
}

/// Params of `createToolbarButton`.
#[derive(Debug, Deserialize)]
pub struct CreateToolbarButtonParams {
    /// Client id of the button.
    pub id: String,
    /// Client id of the owning panel.
    pub panel: String,
    /// Extension-relative icon.
    #[serde(default)]
    pub icon: Option<String>,
    /// Tooltip.
    #[serde(default)]
    pub tooltip: Option<String>,
    /// Initially disabled.
    #[serde(default)]
    pub disabled: bool,
}

/// Adds a button to an extension panel's toolbar.
pub struct CreateToolbarButtonHandler;

#[async_trait]
impl CommandHandler for CreateToolbarButtonHandler {
    type Params = CreateToolbarButtonParams;

    #[instrument(skip(self, call), fields(command = "createToolbarButton"))]
    async fn handle(
        &self,
        params: CreateToolbarButtonParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let panel = call.broker.objects.panel(&params.panel)?;
        let button = Button {
            panel: params.panel,
            icon: expand_resource_path(&call.origin, params.icon.as_deref()),
            tooltip: params.tooltip,
            disabled: params.disabled,
        };
        call.broker
            .objects
            .create(&params.id, &call.origin, ClientObject::Button(button.clone()))?;
        call.broker
            .host
            .frontend
            .add_toolbar_button(&panel.view_id, &params.id, &button);
        Ok(Reply::ok())
    }
}

/// Params of `updateButton`. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateButtonParams {
    /// Client id of the button.
    pub id: String,
    /// New extension-relative icon.
    #[serde(default)]
    pub icon: Option<String>,
    /// New tooltip.
    #[serde(default)]
    pub tooltip: Option<String>,
    /// New disabled state.
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// Updates a toolbar button in place.
pub struct UpdateButtonHandler;

#[async_trait]
impl CommandHandler for UpdateButtonHandler {
    type Params = UpdateButtonParams;

    #[instrument(skip(self, call), fields(command = "updateButton"))]
    async fn handle(&self, params: UpdateButtonParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        let icon = expand_resource_path(&call.origin, params.icon.as_deref());
        let button = call.broker.objects.update_button(&params.id, |button| {
            if icon.is_some() {
                button.icon = icon;
            }
            if params.tooltip.is_some() {
                button.tooltip = params.tooltip;
            }
            if let Some(disabled) = params.disabled {
                button.disabled = disabled;
            }
        })?;
        call.broker.host.frontend.update_button(&params.id, &button);
        Ok(Reply::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BrokerContext;
    use crate::handlers::test_helpers::{call_context, make_test_context, params};
    use crate::host::{HostServices, MockFrontend};
    use crate::memory::MemoryHost;
    use assert_matches::assert_matches;
    use exthost_core::StatusCode;
    use exthost_settings::ExtHostSettings;
    use mockall::predicate::{always, eq};
    use serde_json::json;
    use std::sync::Arc;

    async fn create_panel(call: &CallContext, id: &str, title: &str) -> Result<Reply, ExtensionError> {
        CreatePanelHandler
            .handle(params(json!({"id": id, "title": title, "page": "panel.html"})), call)
            .await
    }

    #[tokio::test]
    async fn create_panel_adds_view() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "createPanel");
        let reply = create_panel(&call, "panel-1", "My Panel").await.unwrap();
        assert_eq!(reply, Reply::ok());

        let panels = host.ui().panels;
        let (title, page) = &panels["chrome-extension://test-extMyPanel"];
        assert_eq!(title, "My Panel");
        assert_eq!(page.as_deref(), Some("chrome-extension://test-ext/panel.html"));
    }

    #[tokio::test]
    async fn duplicate_panel_keeps_first() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "createPanel");
        let _ = create_panel(&call, "panel-1", "First").await.unwrap();
        let err = create_panel(&call, "panel-1", "Second").await.unwrap_err();
        assert_eq!(err, ExtensionError::exists("panel-1"));
        assert_eq!(ctx.objects.panel("panel-1").unwrap().title, "First");
        assert_eq!(host.ui().panels.len(), 1);
    }

    #[tokio::test]
    async fn host_panel_id_is_taken() {
        let (ctx, _host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "createPanel");
        let err = create_panel(&call, "elements", "Elements").await.unwrap_err();
        assert_eq!(err.code(), StatusCode::Exists);
        assert!(ctx.objects.is_empty());
    }

    #[tokio::test]
    async fn show_panel_resolves_view_id() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "showPanel");
        let _ = create_panel(&call, "panel-1", "P").await.unwrap();
        let reply = ShowPanelHandler
            .handle(params(json!({"id": "panel-1"})), &call)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Empty);
        let _ = ShowPanelHandler
            .handle(params(json!({"id": "network"})), &call)
            .await
            .unwrap();
        assert_eq!(
            host.ui().shown_panels,
            vec!["chrome-extension://test-extP", "network"]
        );
    }

    #[tokio::test]
    async fn button_requires_panel() {
        let (ctx, _host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "createToolbarButton");
        let err = CreateToolbarButtonHandler
            .handle(params(json!({"id": "b1", "panel": "missing"})), &call)
            .await
            .unwrap_err();
        assert_eq!(err, ExtensionError::not_found("missing"));
    }

    #[tokio::test]
    async fn button_lifecycle() {
        let (ctx, host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "createToolbarButton");
        let _ = create_panel(&call, "p1", "P").await.unwrap();
        let _ = CreateToolbarButtonHandler
            .handle(
                params(json!({"id": "b1", "panel": "p1", "icon": "./img/run.png", "tooltip": "Run"})),
                &call,
            )
            .await
            .unwrap();
        let (panel_view, button) = host.ui().buttons["b1"].clone();
        assert_eq!(panel_view, "chrome-extension://test-extP");
        assert_eq!(button.icon.as_deref(), Some("chrome-extension://test-ext/img/run.png"));

        let _ = UpdateButtonHandler
            .handle(params(json!({"id": "b1", "disabled": true})), &call)
            .await
            .unwrap();
        let (_, button) = host.ui().buttons["b1"].clone();
        assert!(button.disabled);
        assert_eq!(button.tooltip.as_deref(), Some("Run"));
    }

    #[tokio::test]
    async fn update_unknown_button_is_not_found() {
        let (ctx, _host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "updateButton");
        let _ = create_panel(&call, "panel-1", "P").await.unwrap();
        assert_matches!(
            UpdateButtonHandler
                .handle(params(json!({"id": "panel-2"})), &call)
                .await,
            Err(ExtensionError::NotFound { what }) if what == "panel-2"
        );
        // A panel is not a button.
        assert_matches!(
            UpdateButtonHandler
                .handle(params(json!({"id": "panel-1"})), &call)
                .await,
            Err(ExtensionError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn frontend_sees_one_add_per_panel() {
        let mut frontend = MockFrontend::new();
        let _ = frontend.expect_has_panel().returning(|id| id == "console");
        let _ = frontend
            .expect_add_panel()
            .with(
                eq("chrome-extension://test-extTools"),
                eq("Tools"),
                always(),
            )
            .times(1)
            .return_const(());

        let host = Arc::new(MemoryHost::with_page("https://inspected.example/"));
        let services = HostServices {
            frontend: Arc::new(frontend),
            ..host.services()
        };
        let ctx = Arc::new(BrokerContext::new(ExtHostSettings::default(), services));
        let (call, _rx) = call_context(&ctx, "createPanel");

        let _ = create_panel(&call, "tools", "Tools").await.unwrap();
        assert_eq!(
            create_panel(&call, "tools", "Tools").await.unwrap_err(),
            ExtensionError::exists("tools")
        );
        assert_eq!(
            create_panel(&call, "console", "Console").await.unwrap_err(),
            ExtensionError::exists("console")
        );
    }
}
