//! Host collaborators.
//!
//! The broker never touches the inspected page, the workspace, the network
//! log or the UI directly. It goes through these four traits. The host
//! application provides real implementations; [`crate::memory::MemoryHost`]
//! implements all four for tests and the standalone binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

// ─────────────────────────────────────────────────────────────────────────────
// Shared records
// ─────────────────────────────────────────────────────────────────────────────

/// Content type of a resource, as reported to extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    /// HTML document.
    Document,
    /// Script.
    Script,
    /// CSS.
    Stylesheet,
    /// Image.
    Image,
    /// Font.
    Font,
    /// Audio or video.
    Media,
    /// XHR or fetch.
    Fetch,
    /// WebAssembly module.
    Wasm,
    /// Source map payload.
    SourceMapScript,
    /// Anything else.
    Other,
}

impl ResourceType {
    /// Name sent as a resource's `type`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Font => "font",
            Self::Media => "media",
            Self::Fetch => "fetch",
            Self::Wasm => "wasm",
            Self::SourceMapScript => "sm-script",
            Self::Other => "other",
        }
    }

    /// Whether extensions may rewrite content of this type.
    pub fn is_document_or_script_or_stylesheet(self) -> bool {
        matches!(self, Self::Document | Self::Script | Self::Stylesheet)
    }
}

/// A resource as extensions see it: `{url, type}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    /// Resource URL.
    pub url: String,
    /// Content type.
    pub kind: ResourceType,
}

impl ResourceRef {
    /// New reference.
    pub fn new(url: impl Into<String>, kind: ResourceType) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// `{ "url", "type" }`.
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "url": self.url, "type": self.kind.name() })
    }
}

/// Workspace project a source belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectType {
    /// Loaded over the network.
    Network,
    /// Extension content scripts.
    ContentScripts,
    /// Local file system mapping.
    FileSystem,
    /// Anything generated by the debugger.
    Debugger,
}

/// A workspace source (the UI's editable view of a resource).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    /// Resource reference.
    pub resource: ResourceRef,
    /// Owning project.
    pub project: ProjectType,
}

/// Fetched resource content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceContent {
    /// Text, or base64 when `encoded`.
    pub content: Option<String>,
    /// Whether `content` is base64.
    pub encoded: bool,
}

/// A working copy committed by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedContent {
    /// The committed resource.
    pub resource: ResourceRef,
    /// New content.
    pub content: String,
}

/// A page frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame id.
    pub id: String,
    /// Current URL.
    pub url: String,
}

/// A JavaScript execution context inside a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContextInfo {
    /// Context id.
    pub id: u64,
    /// Owning frame.
    pub frame_id: String,
    /// Security origin of the context.
    pub origin: String,
    /// Whether this is the frame's main world.
    pub is_default: bool,
}

/// Parameters of one evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluateRequest {
    /// Script source.
    pub expression: String,
    /// Make console utilities (`$0`, `inspect`, …) available.
    pub include_command_line_api: bool,
    /// Return the result by value instead of a remote handle.
    pub return_by_value: bool,
    /// Object group for any handles created.
    pub object_group: &'static str,
}

/// How an evaluation ended.
#[derive(Clone, Debug, PartialEq)]
pub enum EvaluationOutcome {
    /// The protocol call itself failed.
    Error(String),
    /// The script threw.
    Exception {
        /// Description of the thrown value.
        description: String,
    },
    /// The script produced a value.
    Value(Value),
}

/// Main-target navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigation {
    /// New inspected URL.
    pub url: String,
    /// Whether the navigating target is the main target.
    pub is_main_target: bool,
}

/// A request in the network log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkRequest {
    /// Host-internal request id.
    pub id: String,
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Response status, once known.
    pub status: Option<u16>,
    /// MIME type of the response.
    pub mime_type: Option<String>,
}

/// What `openResource` should reveal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealTarget {
    /// A workspace source at a line.
    Source {
        /// Source URL.
        url: String,
        /// Zero-based line.
        line: u32,
    },
    /// A page resource.
    Resource {
        /// Resource URL.
        url: String,
    },
    /// A network request.
    Request {
        /// Request URL.
        url: String,
    },
}

/// Keyboard event forwarded from an extension panel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyboardEventEntry {
    /// `keydown`, `keyup`, …
    pub event_type: String,
    /// `KeyboardEvent.key`.
    pub key: String,
    /// `KeyboardEvent.code`.
    pub code: String,
    /// Legacy key code; `0` when absent.
    pub key_code: u32,
    /// Key location.
    pub location: u32,
    /// Control pressed.
    pub ctrl_key: bool,
    /// Alt pressed.
    pub alt_key: bool,
    /// Shift pressed.
    pub shift_key: bool,
    /// Meta pressed.
    pub meta_key: bool,
}

/// Language extension plugin registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguagePlugin {
    /// Plugin name.
    pub name: String,
    /// Source language handled.
    pub language: String,
    /// Symbol types handled.
    pub symbol_types: Vec<String>,
    /// Origin of the extension providing the plugin.
    pub origin: String,
}

/// A host-started trace recording awaiting its result.
pub trait TraceSession: Send + Sync {
    /// Deliver the recorded trace.
    fn complete(&self, url: Option<String>, time_offset: f64);
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// The inspected page: frames, execution contexts, evaluation.
#[async_trait]
pub trait InspectedPage: Send + Sync {
    /// Every live frame.
    fn frames(&self) -> Vec<FrameInfo>;
    /// The main frame, once available.
    fn main_frame(&self) -> Option<FrameInfo>;
    /// Execution contexts of `frame_id`.
    fn execution_contexts(&self, frame_id: &str) -> Vec<ExecutionContextInfo>;
    /// Evaluate in `context`.
    async fn evaluate(
        &self,
        context: &ExecutionContextInfo,
        request: EvaluateRequest,
    ) -> EvaluationOutcome;
    /// URL of the main target, empty before the first navigation.
    fn inspected_url(&self) -> String;
    /// Reload every page, optionally bypassing the cache and injecting a
    /// script before any page script runs.
    fn reload(&self, ignore_cache: bool, injected_script: Option<String>);
    /// Resources of every frame.
    fn frame_resources(&self) -> Vec<ResourceRef>;
    /// Page resource for `url`.
    fn resource_for_url(&self, url: &str) -> Option<ResourceRef>;
    /// Content of the page resource for `url`.
    async fn resource_content(&self, url: &str) -> Option<ResourceContent>;
    /// Navigations of any target.
    fn navigations(&self) -> broadcast::Receiver<Navigation>;
    /// Element selection changes in the elements panel.
    fn element_selections(&self) -> broadcast::Receiver<()>;
}

/// The UI workspace: sources and their working copies.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Source for `url`.
    fn source_for_url(&self, url: &str) -> Option<SourceInfo>;
    /// Sources of a project type.
    fn sources_for_project(&self, project: ProjectType) -> Vec<ResourceRef>;
    /// Current content of the source for `url`.
    async fn source_content(&self, url: &str) -> Option<ResourceContent>;
    /// Replace the working copy of `url`.
    fn set_working_copy(&self, url: &str, content: &str) -> Result<(), String>;
    /// Commit the working copy of `url`.
    fn commit_working_copy(&self, url: &str) -> Result<(), String>;
    /// Whether extensions track committed content.
    fn set_has_resource_content_tracking(&self, enabled: bool);
    /// Sources added to the workspace.
    fn sources_added(&self) -> broadcast::Receiver<ResourceRef>;
    /// Working copies committed by the user.
    fn working_copies_committed(&self) -> broadcast::Receiver<CommittedContent>;
}

/// The network log.
#[async_trait]
pub trait NetworkLog: Send + Sync {
    /// Replace the extra headers sent with every request.
    fn set_extra_headers(&self, headers: BTreeMap<String, String>);
    /// Override the user agent (empty clears the override).
    fn set_user_agent_override(&self, user_agent: &str);
    /// Every logged request.
    fn requests(&self) -> Vec<NetworkRequest>;
    /// Request for `url`.
    fn request_for_url(&self, url: &str) -> Option<NetworkRequest>;
    /// HAR log of `requests`; `entries` are in the same order.
    async fn har_log(&self, requests: &[NetworkRequest]) -> Value;
    /// HAR entry of a single request.
    async fn har_entry(&self, request: &NetworkRequest) -> Value;
    /// Response body of `request`.
    async fn request_content(&self, request: &NetworkRequest) -> Option<ResourceContent>;
    /// Finished-request streams, one per network model.
    fn requests_finished(&self) -> Vec<broadcast::Receiver<NetworkRequest>>;
}

/// The host UI.
#[cfg_attr(test, mockall::automock)]
pub trait Frontend: Send + Sync {
    /// Whether the host already has a panel with this id.
    fn has_panel(&self, id: &str) -> bool;
    /// Add an extension panel.
    fn add_panel(&self, view_id: &str, title: &str, page: Option<String>);
    /// Bring a panel to front.
    fn show_panel(&self, view_id: &str);
    /// Add a toolbar button to an extension panel.
    fn add_toolbar_button(&self, panel_view_id: &str, button_id: &str, button: &crate::objects::Button);
    /// Refresh a toolbar button.
    fn update_button(&self, button_id: &str, button: &crate::objects::Button);
    /// Add a sidebar pane to `panel`.
    fn add_sidebar_pane(&self, panel: &str, pane_id: &str, title: &str);
    /// Resize a sidebar pane.
    fn set_sidebar_height(&self, pane_id: &str, height: &str);
    /// Show a JSON object in a sidebar pane.
    fn set_sidebar_object(&self, pane_id: &str, object: Value, root_title: Option<String>) -> Result<(), String>;
    /// Show a page in a sidebar pane.
    fn set_sidebar_page(&self, pane_id: &str, page: Option<String>);
    /// Add a trace provider to the recording settings.
    fn add_trace_provider(&self, provider_id: &str, origin: &str, category_name: &str, category_tooltip: &str);
    /// Reveal a source, resource or request.
    fn reveal(&self, target: RevealTarget);
    /// Route link activations for `name` to the broker.
    fn register_link_handler(&self, name: &str);
    /// Stop routing link activations for `name`.
    fn unregister_link_handler(&self, name: &str);
    /// Inject a custom style sheet into every root.
    fn apply_style_sheet(&self, css: &str);
    /// Dispatch a synthetic keyboard event in the host.
    fn forward_keyboard_event(&self, event: KeyboardEventEntry);
    /// Whether language plugins are supported.
    fn has_plugin_manager(&self) -> bool;
    /// Register a language plugin.
    fn add_language_plugin(&self, plugin: LanguagePlugin);
    /// Load an extension start page in a hidden frame.
    fn load_extension_frame(&self, start_page: &str, name: &str);
}

/// The four collaborators the broker works through.
#[derive(Clone)]
pub struct HostServices {
    /// Inspected page.
    pub page: Arc<dyn InspectedPage>,
    /// Workspace.
    pub workspace: Arc<dyn Workspace>,
    /// Network log.
    pub network: Arc<dyn NetworkLog>,
    /// Host UI.
    pub frontend: Arc<dyn Frontend>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ref_json() {
        let r = ResourceRef::new("https://a.example/app.js", ResourceType::Script);
        assert_eq!(
            r.to_json(),
            serde_json::json!({"url": "https://a.example/app.js", "type": "script"})
        );
    }

    #[test]
    fn editable_types() {
        assert!(ResourceType::Document.is_document_or_script_or_stylesheet());
        assert!(ResourceType::Stylesheet.is_document_or_script_or_stylesheet());
        assert!(!ResourceType::Image.is_document_or_script_or_stylesheet());
        assert!(!ResourceType::Fetch.is_document_or_script_or_stylesheet());
    }

    #[test]
    fn keyboard_entry_defaults() {
        let e: KeyboardEventEntry =
            serde_json::from_str(r#"{"eventType":"keydown","key":"Escape"}"#).unwrap();
        assert_eq!(e.key_code, 0);
        assert_eq!(e.event_type, "keydown");
        assert!(!e.ctrl_key);
    }
}
