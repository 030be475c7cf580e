//! Host UI handlers: style sheets, keyboard forwarding, link handlers,
//! language plugins.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::dispatcher::{CallContext, CommandHandler, Reply};
use crate::host::{KeyboardEventEntry, LanguagePlugin};

const ESCAPE_KEY: &str = "Escape";
const ESCAPE_KEY_CODE: u32 = 27;

/// Params of `applyStyleSheet`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyStyleSheetParams {
    /// CSS text.
    pub style_sheet: String,
}

/// Injects extension CSS into the host UI, when the experiment allows it.
pub struct ApplyStyleSheetHandler;

#[async_trait]
impl CommandHandler for ApplyStyleSheetHandler {
    type Params = ApplyStyleSheetParams;

    #[instrument(skip_all, fields(command = "applyStyleSheet"))]
    async fn handle(&self, params: ApplyStyleSheetParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        if call.broker.settings.broker.apply_custom_stylesheet {
            call.broker.host.frontend.apply_style_sheet(&params.style_sheet);
        } else {
            debug!(origin = %call.origin, "custom style sheets disabled, ignoring");
        }
        Ok(Reply::Empty)
    }
}

/// Params of `_forwardKeyboardEvent`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForwardKeyboardEventParams {
    /// Key events, in order.
    pub entries: Vec<KeyboardEventEntry>,
}

/// Replays key events from an extension panel in the host.
pub struct ForwardKeyboardEventHandler;

#[async_trait]
impl CommandHandler for ForwardKeyboardEventHandler {
    type Params = ForwardKeyboardEventParams;

    #[instrument(skip(self, call), fields(command = "_forwardKeyboardEvent"))]
    async fn handle(
        &self,
        params: ForwardKeyboardEventParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        for mut entry in params.entries {
            if entry.key_code == 0 && entry.key == ESCAPE_KEY {
                entry.key_code = ESCAPE_KEY_CODE;
            }
            call.broker.host.frontend.forward_keyboard_event(entry);
        }
        Ok(Reply::Empty)
    }
}

/// Params of `setOpenResourceHandler`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetOpenResourceHandlerParams {
    /// Whether the extension wants link activations.
    pub handler_present: bool,
}

/// Registers or removes the calling extension as an open-resource handler.
pub struct SetOpenResourceHandlerHandler;

#[async_trait]
impl CommandHandler for SetOpenResourceHandlerHandler {
    type Params = SetOpenResourceHandlerParams;

    #[instrument(skip(self, call), fields(command = "setOpenResourceHandler"))]
    async fn handle(
        &self,
        params: SetOpenResourceHandlerParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let name = call
            .broker
            .origins
            .name_of(&call.origin)
            .unwrap_or_else(|| format!("Extension {}", call.origin));
        let frontend = &call.broker.host.frontend;
        if params.handler_present {
            call.broker.links.set(&name, &call.channel);
            frontend.register_link_handler(&name);
        } else if call.broker.links.remove(&name) {
            frontend.unregister_link_handler(&name);
        }
        Ok(Reply::Empty)
    }
}

/// Script types a language plugin handles.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SupportedScriptTypes {
    /// Source language.
    pub language: String,
    /// Symbol types; ignored unless an array of strings.
    pub symbol_types: Value,
}

/// Params of `registerLanguageExtensionPlugin`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLanguagePluginParams {
    /// Plugin name.
    pub plugin_name: String,
    /// What the plugin handles.
    #[serde(default)]
    pub supported_script_types: SupportedScriptTypes,
}

/// Registers a language extension plugin with the host's plugin manager.
pub struct RegisterLanguageExtensionPluginHandler;

#[async_trait]
impl CommandHandler for RegisterLanguageExtensionPluginHandler {
    type Params = RegisterLanguagePluginParams;

    #[instrument(skip(self, call), fields(command = "registerLanguageExtensionPlugin"))]
    async fn handle(
        &self,
        params: RegisterLanguagePluginParams,
        call: &CallContext,
    ) -> Result<Reply, ExtensionError> {
        let frontend = &call.broker.host.frontend;
        if !frontend.has_plugin_manager() {
            return Err(ExtensionError::failed(
                "WebAssembly DWARF support needs to be enabled to use this extension",
            ));
        }
        let SupportedScriptTypes { language, symbol_types } = params.supported_script_types;
        let symbol_types = string_array(&symbol_types).unwrap_or_default();
        info!(plugin = %params.plugin_name, %language, "registering language plugin");
        frontend.add_language_plugin(LanguagePlugin {
            name: params.plugin_name,
            language,
            symbol_types,
            origin: call.origin.to_string(),
        });
        Ok(Reply::ok())
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_owned))
        .collect()
}
