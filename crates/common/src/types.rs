// Core record types shared by the tracker crates.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in every table: second precision, local clock.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder written when an item has no category or no level.
pub const UNKNOWN: &str = "Unknown";

/// Host-assigned item identifier.
pub type ElementId = i64;

/// Format a timestamp the way deletion records store it.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// One logged removal of an item, captured when the host reports a change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionRecord {
    pub project_name: String,
    /// `yyyy-mm-dd HH:MM:SS`, local clock.
    pub timestamp: String,
    pub element_id: ElementId,
    pub user_name: String,
}

/// Identifying metadata of one live item at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub project_name: String,
    pub element_id: ElementId,
    pub element_type: String,
    pub element_name: String,
    pub level: String,
}

/// A deleted item enriched with the metadata of its last snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedItem {
    pub project_name: String,
    pub element_id: ElementId,
    pub element_type: String,
    pub element_name: String,
    pub level: String,
    pub timestamp: String,
    pub user_name: String,
}

impl DeletedItem {
    /// Combine a deletion with the snapshot row sharing its id.
    ///
    /// Project name, time and user come from the deletion; type, name and
    /// level from the snapshot.
    pub fn join(deletion: &DeletionRecord, snapshot: &SnapshotRecord) -> Self {
        Self {
            project_name: deletion.project_name.clone(),
            element_id: deletion.element_id,
            element_type: snapshot.element_type.clone(),
            element_name: snapshot.element_name.clone(),
            level: snapshot.level.clone(),
            timestamp: deletion.timestamp.clone(),
            user_name: deletion.user_name.clone(),
        }
    }
}
