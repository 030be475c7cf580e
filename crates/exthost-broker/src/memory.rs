//! In-memory host.
//!
//! [`MemoryHost`] implements every collaborator trait over plain data. Tests
//! script it (frames, contexts, sources, requests, evaluation results) and
//! read back what the broker did to it; the standalone binary runs on it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::host::{
    CommittedContent, EvaluateRequest, EvaluationOutcome, ExecutionContextInfo, FrameInfo,
    Frontend, HostServices, InspectedPage, KeyboardEventEntry, LanguagePlugin, Navigation, NetworkLog,
    NetworkRequest, ProjectType, ResourceContent, ResourceRef, ResourceType, RevealTarget,
    SourceInfo, Workspace,
};
use crate::objects::Button;

const EVENT_CAPACITY: usize = 256;

/// Panels every host has before extensions add their own.
const BUILTIN_PANELS: [&str; 4] = ["elements", "sources", "network", "console"];

/// Snapshot of everything the broker asked the UI to do.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiState {
    /// Extension panels: view id → (title, page).
    pub panels: BTreeMap<String, (String, Option<String>)>,
    /// `show_panel` calls, in order.
    pub shown_panels: Vec<String>,
    /// Buttons: id → (panel view id, state).
    pub buttons: BTreeMap<String, (String, Button)>,
    /// Sidebar panes: id → (panel, title).
    pub sidebar_panes: BTreeMap<String, (String, String)>,
    /// Sidebar heights.
    pub sidebar_heights: BTreeMap<String, String>,
    /// Sidebar objects: id → (object, root title).
    pub sidebar_objects: BTreeMap<String, (Value, Option<String>)>,
    /// Sidebar pages.
    pub sidebar_pages: BTreeMap<String, Option<String>>,
    /// Trace providers: id → (origin, category name).
    pub trace_providers: BTreeMap<String, (String, String)>,
    /// Reveal requests, in order.
    pub reveals: Vec<RevealTarget>,
    /// Registered link handler names.
    pub link_handlers: BTreeSet<String>,
    /// Applied style sheets.
    pub style_sheets: Vec<String>,
    /// Forwarded keyboard events.
    pub keyboard_events: Vec<KeyboardEventEntry>,
    /// Registered language plugins.
    pub language_plugins: Vec<LanguagePlugin>,
    /// Loaded extension frames: (start page, name).
    pub extension_frames: Vec<(String, String)>,
}

#[derive(Clone, Debug)]
struct StoredSource {
    info: SourceInfo,
    content: ResourceContent,
    working_copy: Option<String>,
}

#[derive(Default)]
struct State {
    inspected_url: String,
    frames: Vec<FrameInfo>,
    main_frame: Option<String>,
    contexts: Vec<ExecutionContextInfo>,
    next_context_id: u64,
    scripted: HashMap<String, EvaluationOutcome>,
    evaluated: Vec<(ExecutionContextInfo, EvaluateRequest)>,
    reloads: Vec<(bool, Option<String>)>,
    frame_resources: Vec<(ResourceRef, ResourceContent)>,
    sources: Vec<StoredSource>,
    content_tracking: bool,
    extra_headers: BTreeMap<String, String>,
    user_agent: String,
    requests: Vec<(NetworkRequest, Option<ResourceContent>)>,
    plugin_manager: bool,
    ui: UiState,
}

/// In-memory implementation of every host collaborator.
pub struct MemoryHost {
    state: Mutex<State>,
    navigations: broadcast::Sender<Navigation>,
    selections: broadcast::Sender<()>,
    sources_added: broadcast::Sender<ResourceRef>,
    committed: broadcast::Sender<CommittedContent>,
    network_models: Mutex<Vec<broadcast::Sender<NetworkRequest>>>,
}

impl MemoryHost {
    /// Empty host with one network model and a plugin manager.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_context_id: 1,
                plugin_manager: true,
                ..State::default()
            }),
            navigations: broadcast::channel(EVENT_CAPACITY).0,
            selections: broadcast::channel(EVENT_CAPACITY).0,
            sources_added: broadcast::channel(EVENT_CAPACITY).0,
            committed: broadcast::channel(EVENT_CAPACITY).0,
            network_models: Mutex::new(vec![broadcast::channel(EVENT_CAPACITY).0]),
        }
    }

    /// All four collaborator handles, backed by this host.
    pub fn services(self: &Arc<Self>) -> HostServices {
        HostServices {
            page: Arc::clone(self) as _,
            workspace: Arc::clone(self) as _,
            network: Arc::clone(self) as _,
            frontend: Arc::clone(self) as _,
        }
    }

    /// Host inspecting `url`, with a main frame and its default context.
    pub fn with_page(url: &str) -> Self {
        let host = Self::new();
        host.set_inspected_url(url);
        let frame = host.add_frame("main", url);
        host.set_main_frame(&frame.id);
        let origin = crate::origins::Origin::parse(url)
            .map(|o| o.as_str().to_owned())
            .unwrap_or_default();
        let _ = host.add_context(&frame.id, &origin, true);
        host
    }

    // ── Page scripting ──────────────────────────────────────────────

    /// Set the inspected URL without emitting a navigation.
    pub fn set_inspected_url(&self, url: &str) {
        self.state.lock().inspected_url = url.to_owned();
    }

    /// Add a frame.
    pub fn add_frame(&self, id: &str, url: &str) -> FrameInfo {
        let frame = FrameInfo {
            id: id.to_owned(),
            url: url.to_owned(),
        };
        self.state.lock().frames.push(frame.clone());
        frame
    }

    /// Mark `frame_id` as the main frame.
    pub fn set_main_frame(&self, frame_id: &str) {
        self.state.lock().main_frame = Some(frame_id.to_owned());
    }

    /// Add an execution context to `frame_id`.
    pub fn add_context(&self, frame_id: &str, origin: &str, is_default: bool) -> ExecutionContextInfo {
        let mut state = self.state.lock();
        let context = ExecutionContextInfo {
            id: state.next_context_id,
            frame_id: frame_id.to_owned(),
            origin: origin.to_owned(),
            is_default,
        };
        state.next_context_id += 1;
        state.contexts.push(context.clone());
        context
    }

    /// Result returned when `expression` is evaluated.
    pub fn script_evaluation(&self, expression: &str, outcome: EvaluationOutcome) {
        let _ = self
            .state
            .lock()
            .scripted
            .insert(expression.to_owned(), outcome);
    }

    /// Evaluations performed so far.
    pub fn evaluations(&self) -> Vec<(ExecutionContextInfo, EvaluateRequest)> {
        self.state.lock().evaluated.clone()
    }

    /// Reloads performed so far: (ignore cache, injected script).
    pub fn reloads(&self) -> Vec<(bool, Option<String>)> {
        self.state.lock().reloads.clone()
    }

    /// Add a frame resource.
    pub fn add_frame_resource(&self, url: &str, kind: ResourceType, content: &str) {
        self.state.lock().frame_resources.push((
            ResourceRef::new(url, kind),
            ResourceContent {
                content: Some(content.to_owned()),
                encoded: false,
            },
        ));
    }

    /// Emit a navigation of the main target (or another target).
    pub fn navigate(&self, url: &str, is_main_target: bool) {
        if is_main_target {
            self.set_inspected_url(url);
        }
        let _ = self.navigations.send(Navigation {
            url: url.to_owned(),
            is_main_target,
        });
    }

    /// Emit an element selection change.
    pub fn select_element(&self) {
        let _ = self.selections.send(());
    }

    // ── Workspace scripting ─────────────────────────────────────────

    /// Add a workspace source and announce it.
    pub fn add_source(&self, url: &str, kind: ResourceType, project: ProjectType, content: &str) {
        let resource = ResourceRef::new(url, kind);
        self.state.lock().sources.push(StoredSource {
            info: SourceInfo {
                resource: resource.clone(),
                project,
            },
            content: ResourceContent {
                content: Some(content.to_owned()),
                encoded: false,
            },
            working_copy: None,
        });
        let _ = self.sources_added.send(resource);
    }

    /// Simulate the user committing `content` to `url`.
    pub fn user_commit(&self, url: &str, content: &str) {
        let resource = {
            let mut state = self.state.lock();
            let Some(source) = state.sources.iter_mut().find(|s| s.info.resource.url == url) else {
                return;
            };
            source.content.content = Some(content.to_owned());
            source.working_copy = None;
            source.info.resource.clone()
        };
        let _ = self.committed.send(CommittedContent {
            resource,
            content: content.to_owned(),
        });
    }

    /// Current content and pending working copy of `url`.
    pub fn source_state(&self, url: &str) -> Option<(Option<String>, Option<String>)> {
        self.state
            .lock()
            .sources
            .iter()
            .find(|s| s.info.resource.url == url)
            .map(|s| (s.content.content.clone(), s.working_copy.clone()))
    }

    /// Whether content tracking was switched on.
    pub fn content_tracking(&self) -> bool {
        self.state.lock().content_tracking
    }

    // ── Network scripting ───────────────────────────────────────────

    /// Log a request with an optional body.
    pub fn add_request(&self, request: NetworkRequest, body: Option<&str>) {
        self.state.lock().requests.push((
            request,
            body.map(|b| ResourceContent {
                content: Some(b.to_owned()),
                encoded: false,
            }),
        ));
    }

    /// Add another network model; returns its index.
    pub fn add_network_model(&self) -> usize {
        let mut models = self.network_models.lock();
        models.push(broadcast::channel(EVENT_CAPACITY).0);
        models.len() - 1
    }

    /// Emit a finished request on network model `model`.
    pub fn finish_request(&self, model: usize, request: NetworkRequest) {
        if let Some(tx) = self.network_models.lock().get(model) {
            let _ = tx.send(request);
        }
    }

    /// Extra headers last pushed by the broker.
    pub fn extra_headers(&self) -> BTreeMap<String, String> {
        self.state.lock().extra_headers.clone()
    }

    /// Current user-agent override.
    pub fn user_agent(&self) -> String {
        self.state.lock().user_agent.clone()
    }

    // ── UI scripting ────────────────────────────────────────────────

    /// Snapshot of UI calls.
    pub fn ui(&self) -> UiState {
        self.state.lock().ui.clone()
    }

    /// Toggle language plugin support.
    pub fn set_plugin_manager(&self, available: bool) {
        self.state.lock().plugin_manager = available;
    }

    fn content_of(&self, url: &str) -> Option<ResourceContent> {
        self.state
            .lock()
            .frame_resources
            .iter()
            .find(|(r, _)| r.url == url)
            .map(|(_, c)| c.clone())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InspectedPage for MemoryHost {
    fn frames(&self) -> Vec<FrameInfo> {
        self.state.lock().frames.clone()
    }

    fn main_frame(&self) -> Option<FrameInfo> {
        let state = self.state.lock();
        let id = state.main_frame.as_ref()?;
        state.frames.iter().find(|f| &f.id == id).cloned()
    }

    fn execution_contexts(&self, frame_id: &str) -> Vec<ExecutionContextInfo> {
        self.state
            .lock()
            .contexts
            .iter()
            .filter(|c| c.frame_id == frame_id)
            .cloned()
            .collect()
    }

    async fn evaluate(
        &self,
        context: &ExecutionContextInfo,
        request: EvaluateRequest,
    ) -> EvaluationOutcome {
        let mut state = self.state.lock();
        let outcome = state
            .scripted
            .get(&request.expression)
            .cloned()
            .unwrap_or(EvaluationOutcome::Value(Value::Null));
        state.evaluated.push((context.clone(), request));
        outcome
    }

    fn inspected_url(&self) -> String {
        self.state.lock().inspected_url.clone()
    }

    fn reload(&self, ignore_cache: bool, injected_script: Option<String>) {
        self.state.lock().reloads.push((ignore_cache, injected_script));
    }

    fn frame_resources(&self) -> Vec<ResourceRef> {
        self.state
            .lock()
            .frame_resources
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    fn resource_for_url(&self, url: &str) -> Option<ResourceRef> {
        self.state
            .lock()
            .frame_resources
            .iter()
            .find(|(r, _)| r.url == url)
            .map(|(r, _)| r.clone())
    }

    async fn resource_content(&self, url: &str) -> Option<ResourceContent> {
        self.content_of(url)
    }

    fn navigations(&self) -> broadcast::Receiver<Navigation> {
        self.navigations.subscribe()
    }

    fn element_selections(&self) -> broadcast::Receiver<()> {
        self.selections.subscribe()
    }
}

#[async_trait]
impl Workspace for MemoryHost {
    fn source_for_url(&self, url: &str) -> Option<SourceInfo> {
        self.state
            .lock()
            .sources
            .iter()
            .find(|s| s.info.resource.url == url)
            .map(|s| s.info.clone())
    }

    fn sources_for_project(&self, project: ProjectType) -> Vec<ResourceRef> {
        self.state
            .lock()
            .sources
            .iter()
            .filter(|s| s.info.project == project)
            .map(|s| s.info.resource.clone())
            .collect()
    }

    async fn source_content(&self, url: &str) -> Option<ResourceContent> {
        self.state
            .lock()
            .sources
            .iter()
            .find(|s| s.info.resource.url == url)
            .map(|s| s.content.clone())
    }

    fn set_working_copy(&self, url: &str, content: &str) -> Result<(), String> {
        let mut state = self.state.lock();
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.info.resource.url == url)
            .ok_or_else(|| format!("no source for {url}"))?;
        source.working_copy = Some(content.to_owned());
        Ok(())
    }

    fn commit_working_copy(&self, url: &str) -> Result<(), String> {
        let mut state = self.state.lock();
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.info.resource.url == url)
            .ok_or_else(|| format!("no source for {url}"))?;
        if let Some(copy) = source.working_copy.take() {
            source.content.content = Some(copy);
        }
        Ok(())
    }

    fn set_has_resource_content_tracking(&self, enabled: bool) {
        self.state.lock().content_tracking = enabled;
    }

    fn sources_added(&self) -> broadcast::Receiver<ResourceRef> {
        self.sources_added.subscribe()
    }

    fn working_copies_committed(&self) -> broadcast::Receiver<CommittedContent> {
        self.committed.subscribe()
    }
}

#[async_trait]
impl NetworkLog for MemoryHost {
    fn set_extra_headers(&self, headers: BTreeMap<String, String>) {
        self.state.lock().extra_headers = headers;
    }

    fn set_user_agent_override(&self, user_agent: &str) {
        user_agent.clone_into(&mut self.state.lock().user_agent);
    }

    fn requests(&self) -> Vec<NetworkRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    fn request_for_url(&self, url: &str) -> Option<NetworkRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .find(|(r, _)| r.url == url)
            .map(|(r, _)| r.clone())
    }

    async fn har_log(&self, requests: &[NetworkRequest]) -> Value {
        let mut entries = Vec::with_capacity(requests.len());
        for request in requests {
            entries.push(self.har_entry(request).await);
        }
        json!({
            "version": "1.2",
            "creator": { "name": "exthost", "version": env!("CARGO_PKG_VERSION") },
            "pages": [],
            "entries": entries,
        })
    }

    async fn har_entry(&self, request: &NetworkRequest) -> Value {
        json!({
            "startedDateTime": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "request": { "method": request.method, "url": request.url },
            "response": {
                "status": request.status.unwrap_or(0),
                "content": { "mimeType": request.mime_type.clone().unwrap_or_default() },
            },
        })
    }

    async fn request_content(&self, request: &NetworkRequest) -> Option<ResourceContent> {
        self.state
            .lock()
            .requests
            .iter()
            .find(|(r, _)| r.id == request.id)
            .and_then(|(_, body)| body.clone())
    }

    fn requests_finished(&self) -> Vec<broadcast::Receiver<NetworkRequest>> {
        self.network_models
            .lock()
            .iter()
            .map(broadcast::Sender::subscribe)
            .collect()
    }
}

impl Frontend for MemoryHost {
    fn has_panel(&self, id: &str) -> bool {
        BUILTIN_PANELS.contains(&id) || self.state.lock().ui.panels.contains_key(id)
    }

    fn add_panel(&self, view_id: &str, title: &str, page: Option<String>) {
        let _ = self
            .state
            .lock()
            .ui
            .panels
            .insert(view_id.to_owned(), (title.to_owned(), page));
    }

    fn show_panel(&self, view_id: &str) {
        self.state.lock().ui.shown_panels.push(view_id.to_owned());
    }

    fn add_toolbar_button(&self, panel_view_id: &str, button_id: &str, button: &Button) {
        let _ = self
            .state
            .lock()
            .ui
            .buttons
            .insert(button_id.to_owned(), (panel_view_id.to_owned(), button.clone()));
    }

    fn update_button(&self, button_id: &str, button: &Button) {
        if let Some(entry) = self.state.lock().ui.buttons.get_mut(button_id) {
            entry.1 = button.clone();
        }
    }

    fn add_sidebar_pane(&self, panel: &str, pane_id: &str, title: &str) {
        let _ = self
            .state
            .lock()
            .ui
            .sidebar_panes
            .insert(pane_id.to_owned(), (panel.to_owned(), title.to_owned()));
    }

    fn set_sidebar_height(&self, pane_id: &str, height: &str) {
        let _ = self
            .state
            .lock()
            .ui
            .sidebar_heights
            .insert(pane_id.to_owned(), height.to_owned());
    }

    fn set_sidebar_object(
        &self,
        pane_id: &str,
        object: Value,
        root_title: Option<String>,
    ) -> Result<(), String> {
        let _ = self
            .state
            .lock()
            .ui
            .sidebar_objects
            .insert(pane_id.to_owned(), (object, root_title));
        Ok(())
    }

    fn set_sidebar_page(&self, pane_id: &str, page: Option<String>) {
        let _ = self
            .state
            .lock()
            .ui
            .sidebar_pages
            .insert(pane_id.to_owned(), page);
    }

    fn add_trace_provider(
        &self,
        provider_id: &str,
        origin: &str,
        category_name: &str,
        _category_tooltip: &str,
    ) {
        let _ = self.state.lock().ui.trace_providers.insert(
            provider_id.to_owned(),
            (origin.to_owned(), category_name.to_owned()),
        );
    }

    fn reveal(&self, target: RevealTarget) {
        self.state.lock().ui.reveals.push(target);
    }

    fn register_link_handler(&self, name: &str) {
        let _ = self.state.lock().ui.link_handlers.insert(name.to_owned());
    }

    fn unregister_link_handler(&self, name: &str) {
        let _ = self.state.lock().ui.link_handlers.remove(name);
    }

    fn apply_style_sheet(&self, css: &str) {
        self.state.lock().ui.style_sheets.push(css.to_owned());
    }

    fn forward_keyboard_event(&self, event: KeyboardEventEntry) {
        self.state.lock().ui.keyboard_events.push(event);
    }

    fn has_plugin_manager(&self) -> bool {
        self.state.lock().plugin_manager
    }

    fn add_language_plugin(&self, plugin: LanguagePlugin) {
        self.state.lock().ui.language_plugins.push(plugin);
    }

    fn load_extension_frame(&self, start_page: &str, name: &str) {
        self.state
            .lock()
            .ui
            .extension_frames
            .push((start_page.to_owned(), name.to_owned()));
    }
}
