use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItemType {
    BacklogItem,
    Task,
    Other(String),
}

impl WorkItemType {
    /// Types that are exported when no explicit filter is given.
    pub const OF_INTEREST: [WorkItemType; 2] = [WorkItemType::BacklogItem, WorkItemType::Task];

    pub fn from_service_name(name: &str) -> Self {
        match name {
            "Product Backlog Item" => WorkItemType::BacklogItem,
            "Task" => WorkItemType::Task,
            other => WorkItemType::Other(other.to_string()),
        }
    }

    pub fn service_name(&self) -> &str {
        match self {
            WorkItemType::BacklogItem => "Product Backlog Item",
            WorkItemType::Task => "Task",
            WorkItemType::Other(name) => name,
        }
    }

    /// Short name used in output file suffixes.
    pub fn file_suffix(&self) -> String {
        match self {
            WorkItemType::BacklogItem => "PBI".into(),
            WorkItemType::Task => "Task".into(),
            WorkItemType::Other(name) => name.replace(' ', ""),
        }
    }

    pub fn is_of_interest(&self) -> bool {
        Self::OF_INTEREST.contains(self)
    }
}

impl fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// Start and finish derived from an item's state history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeadTime {
    pub start: Option<DateTime<Utc>>,
    pub finish: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: i64,
    pub item_type: WorkItemType,
    pub parent: Option<i64>,
    pub title: String,
    /// Raw HTML as stored by the service.
    pub description: Option<String>,
    pub tags: Option<String>,
    pub value_area: Option<String>,
    pub business_value: Option<i64>,
    /// Display name only; the service returns a full identity object.
    pub assigned_to: Option<String>,
    pub state: String,
    pub created_date: Option<DateTime<Utc>>,
    pub changed_date: Option<DateTime<Utc>>,
    pub area_path: String,
    pub iteration_path: String,
    pub lead_time: LeadTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// One entry of an item's update history.
#[derive(Debug, Clone)]
pub struct Revision {
    pub changed_date: DateTime<Utc>,
    pub state: Option<FieldChange>,
    pub iteration_path: Option<String>,
}
