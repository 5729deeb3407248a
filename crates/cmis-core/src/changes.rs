use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::object::{ObjectId, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Security,
}

impl ChangeType {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            "security" => Some(Self::Security),
            _ => None,
        }
    }
}

/// One entry of the repository change log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub object_id: ObjectId,
    pub change_type: ChangeType,
    pub change_time: Option<DateTime<Utc>>,
    /// Populated only when properties were requested and the repository supports it.
    pub properties: Properties,
}

impl ChangeEvent {
    /// Two events describe the same log entry.
    pub fn same_entry(&self, other: &ChangeEvent) -> bool {
        self.object_id == other.object_id
            && self.change_type == other.change_type
            && self.change_time == other.change_time
    }
}

/// A bounded page of change events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeEventsPage {
    pub events: Vec<ChangeEvent>,
    /// Token to resume from. `None` when the repository did not report one.
    pub latest_change_token: Option<String>,
    pub has_more: bool,
}
