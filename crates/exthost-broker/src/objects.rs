//! Client object table.
//!
//! Extensions name the proxies they create (panels, toolbar buttons, sidebar
//! panes, trace providers) with their own string ids. The table maps those
//! ids to broker-owned records and enforces id uniqueness.
//!
//! Commands create, resolve and update entries but never remove them.
//! [`ClientObjectTable::dispose`] exists for the host to call when the UI
//! proxy behind an entry is torn down.

use std::collections::HashMap;
use std::fmt;

use exthost_core::ExtensionError;
use parking_lot::RwLock;
use serde::Serialize;

use crate::origins::Origin;

/// Discriminant of [`ClientObject`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    /// Extension panel.
    Panel,
    /// Toolbar button inside an extension panel.
    Button,
    /// Sidebar pane in the elements or sources panel.
    SidebarPane,
    /// Performance trace provider.
    TraceProvider,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Panel => "panel",
            Self::Button => "button",
            Self::SidebarPane => "sidebar pane",
            Self::TraceProvider => "trace provider",
        })
    }
}

/// Extension panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    /// Persistent view id in the host UI.
    pub view_id: String,
    /// Tab title.
    pub title: String,
    /// Expanded page URL.
    pub page: Option<String>,
}

/// Toolbar button.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    /// Client id of the owning panel.
    pub panel: String,
    /// Expanded icon URL.
    pub icon: Option<String>,
    /// Tooltip text.
    pub tooltip: Option<String>,
    /// Whether the button is greyed out.
    pub disabled: bool,
}

/// Sidebar pane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarPane {
    /// Host panel: `elements` or `sources`.
    pub panel: String,
    /// Pane title.
    pub title: String,
    /// CSS height, once set.
    pub height: Option<String>,
    /// Expanded page URL, once set.
    pub page: Option<String>,
}

/// Trace provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceProvider {
    /// Category shown in the recording settings.
    pub category_name: String,
    /// Tooltip of the category.
    pub category_tooltip: String,
}

/// A broker-owned proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientObject {
    /// See [`Panel`].
    Panel(Panel),
    /// See [`Button`].
    Button(Button),
    /// See [`SidebarPane`].
    SidebarPane(SidebarPane),
    /// See [`TraceProvider`].
    TraceProvider(TraceProvider),
}

impl ClientObject {
    /// Kind of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Panel(_) => ObjectKind::Panel,
            Self::Button(_) => ObjectKind::Button,
            Self::SidebarPane(_) => ObjectKind::SidebarPane,
            Self::TraceProvider(_) => ObjectKind::TraceProvider,
        }
    }
}

/// A table entry: the object and the origin that created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientEntry {
    /// Creating extension.
    pub owner: Origin,
    /// The proxy record.
    pub object: ClientObject,
}

/// Id → proxy map shared by all extensions.
#[derive(Default)]
pub struct ClientObjectTable {
    entries: RwLock<HashMap<String, ClientEntry>>,
}

impl ClientObjectTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new object under `id`.
    pub fn create(
        &self,
        id: &str,
        owner: &Origin,
        object: ClientObject,
    ) -> Result<(), ExtensionError> {
        self.create_unless_taken(id, owner, object, |_| false)
    }

    /// Insert a new object under `id`, also refusing ids that
    /// `taken_elsewhere` reports as used by another namespace sharing the
    /// same id space (e.g. the host's own panel ids).
    ///
    /// `taken_elsewhere` runs under the table's write lock.
    pub fn create_unless_taken(
        &self,
        id: &str,
        owner: &Origin,
        object: ClientObject,
        taken_elsewhere: impl FnOnce(&str) -> bool,
    ) -> Result<(), ExtensionError> {
        let mut entries = self.entries.write();
        if entries.contains_key(id) || taken_elsewhere(id) {
            return Err(ExtensionError::exists(id));
        }
        let _ = entries.insert(
            id.to_owned(),
            ClientEntry {
                owner: owner.clone(),
                object,
            },
        );
        Ok(())
    }

    /// Entry under `id`, any kind.
    pub fn get(&self, id: &str) -> Option<ClientEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Object under `id` if it is of `kind`; `E_NOTFOUND(id)` otherwise.
    pub fn resolve(&self, id: &str, kind: ObjectKind) -> Result<ClientObject, ExtensionError> {
        self.entries
            .read()
            .get(id)
            .filter(|e| e.object.kind() == kind)
            .map(|e| e.object.clone())
            .ok_or_else(|| ExtensionError::not_found(id))
    }

    /// Panel under `id`.
    pub fn panel(&self, id: &str) -> Result<Panel, ExtensionError> {
        match self.resolve(id, ObjectKind::Panel)? {
            ClientObject::Panel(p) => Ok(p),
            _ => Err(ExtensionError::not_found(id)),
        }
    }

    /// Sidebar pane under `id`.
    pub fn sidebar(&self, id: &str) -> Result<SidebarPane, ExtensionError> {
        match self.resolve(id, ObjectKind::SidebarPane)? {
            ClientObject::SidebarPane(s) => Ok(s),
            _ => Err(ExtensionError::not_found(id)),
        }
    }

    /// Mutate the object under `id` in place.
    ///
    /// `E_NOTFOUND(id)` if absent. The closure sees the object of any kind
    /// and may itself reject it.
    pub fn update<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut ClientObject) -> Result<T, ExtensionError>,
    ) -> Result<T, ExtensionError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| ExtensionError::not_found(id))?;
        apply(&mut entry.object)
    }

    /// Mutate the button under `id`.
    pub fn update_button(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Button),
    ) -> Result<Button, ExtensionError> {
        self.update(id, |object| match object {
            ClientObject::Button(button) => {
                apply(button);
                Ok(button.clone())
            }
            _ => Err(ExtensionError::not_found(id)),
        })
    }

    /// Mutate the sidebar pane under `id`.
    pub fn update_sidebar(
        &self,
        id: &str,
        apply: impl FnOnce(&mut SidebarPane),
    ) -> Result<SidebarPane, ExtensionError> {
        self.update(id, |object| match object {
            ClientObject::SidebarPane(pane) => {
                apply(pane);
                Ok(pane.clone())
            }
            _ => Err(ExtensionError::not_found(id)),
        })
    }

    /// Remove the entry under `id`, returning it.
    pub fn dispose(&self, id: &str) -> Option<ClientEntry> {
        self.entries.write().remove(id)
    }

    /// Ids of every object of `kind`, sorted.
    pub fn ids_of_kind(&self, kind: ObjectKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.object.kind() == kind)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
