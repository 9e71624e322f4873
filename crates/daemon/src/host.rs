// Host-facing surface: the document handle the host passes with every
// notification, and the notifications themselves.

use deltrack_common::layout::project_name_from_path;
use deltrack_common::types::ElementId;
use serde::{Deserialize, Serialize};

/// Level an item is hosted on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum LevelRef {
    /// Item has no level reference at all.
    #[default]
    None,
    /// Reference resolves to a level with this name.
    Named(String),
    /// Reference is set but no longer resolves.
    Dangling,
}

/// One item of the host's document model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveItem {
    pub id: ElementId,
    /// Category name; `None` for uncategorized items.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: LevelRef,
    /// Type definitions are not tracked, only their instances.
    #[serde(default)]
    pub is_type: bool,
}

/// Read access to an open document.
pub trait DocumentModel: Send + Sync {
    /// Full path of the document file; empty for never-saved documents.
    fn path_name(&self) -> String;

    /// User name the host has signed in for this document.
    fn user_name(&self) -> String;

    /// Every item currently in the document.
    fn items(&self) -> Vec<LiveItem>;

    fn project_name(&self) -> String {
        project_name_from_path(&self.path_name())
    }
}

/// A document described entirely by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticDocument {
    pub path: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub items: Vec<LiveItem>,
}

impl DocumentModel for StaticDocument {
    fn path_name(&self) -> String {
        self.path.clone()
    }

    fn user_name(&self) -> String {
        self.user.clone()
    }

    fn items(&self) -> Vec<LiveItem> {
        self.items.clone()
    }
}

/// A notification as delivered by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Opened { document: StaticDocument },
    Changed { document: StaticDocument, deleted_ids: Vec<ElementId> },
    Synchronized { document: StaticDocument },
    Saved { document: StaticDocument },
    Shutdown,
}

impl HostEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "opened",
            Self::Changed { .. } => "changed",
            Self::Synchronized { .. } => "synchronized",
            Self::Saved { .. } => "saved",
            Self::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_name_comes_from_document_path() {
        let doc = StaticDocument { path: "C:\\Models\\Tower.rvt".into(), ..Default::default() };
        assert_eq!(doc.project_name(), "Tower");
    }

    #[test]
    fn host_event_parses_from_json_line() {
        let line = r#"{"event":"changed","document":{"path":"/m/Tower.rvt","user":"bob"},"deleted_ids":[4,5]}"#;
        let event: HostEvent = serde_json::from_str(line).unwrap();
        match event {
            HostEvent::Changed { document, deleted_ids } => {
                assert_eq!(document.user, "bob");
                assert!(document.items.is_empty());
                assert_eq!(deleted_ids, vec![4, 5]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn live_item_level_defaults_to_none() {
        let item: LiveItem = serde_json::from_str(r#"{"id":1,"name":"W1"}"#).unwrap();
        assert_eq!(item.level, LevelRef::None);
        assert!(!item.is_type);

        let item: LiveItem =
            serde_json::from_str(r#"{"id":2,"level":{"kind":"named","name":"L1"}}"#).unwrap();
        assert_eq!(item.level, LevelRef::Named("L1".into()));
    }

    #[test]
    fn shutdown_event_has_no_payload() {
        let event: HostEvent = serde_json::from_str(r#"{"event":"shutdown"}"#).unwrap();
        assert_eq!(event.kind(), "shutdown");
    }
}
