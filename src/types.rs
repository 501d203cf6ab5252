use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Backlog,
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl Status {
    /// Get the string representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Done => "done",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Status::Backlog),
            "todo" => Ok(Status::Todo),
            "in_progress" => Ok(Status::InProgress),
            "blocked" => Ok(Status::Blocked),
            "done" => Ok(Status::Done),
            _ => Err(anyhow::anyhow!(
                "Invalid status: '{}'. Valid values are: backlog, todo, in_progress, blocked, done",
                s
            )),
        }
    }
}

/// Manual priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Get the string representation of this priority
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(anyhow::anyhow!(
                "Invalid priority: '{}'. Valid values are: low, medium, high, urgent",
                s
            )),
        }
    }
}

/// Breakdown workflow state for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakdownStatus {
    Pending,
    Suggested,
    Approved,
    Rejected,
}

impl BreakdownStatus {
    /// Get the string representation of this breakdown status
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakdownStatus::Pending => "pending",
            BreakdownStatus::Suggested => "suggested",
            BreakdownStatus::Approved => "approved",
            BreakdownStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for BreakdownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A proposed child item, as produced by the external breakdown source.
///
/// The engine only consumes these records; how they were generated (LLM,
/// template, hand-written file) is the caller's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedChild {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

/// Notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Priority,
    Blocking,
    Context,
    Reminder,
}

impl NotificationKind {
    /// Get the string representation of this notification kind
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Priority => "priority",
            NotificationKind::Blocking => "blocking",
            NotificationKind::Context => "context",
            NotificationKind::Reminder => "reminder",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored notification, e.g. the done-while-blocked anomaly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: String,
    pub priority: Priority,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// The unified work item: a node in the ownership tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// None for a root item
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Ancestor hops to the root; 0 for roots, recomputed on reparent
    pub depth: u32,
    #[serde(default)]
    pub order: i64,
    pub status: Status,
    pub priority: Priority,
    pub breakdown_status: BreakdownStatus,
    /// Non-empty exactly while breakdown_status == Suggested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_children: Vec<SuggestedChild>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub blocking: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Strategy credited with solving this item; feeds the completion
    /// feedback hook on the transition into done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_with_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_success: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: String, title: String, parent_id: Option<String>, depth: u32) -> Self {
        let now = Utc::now();
        let status = if parent_id.is_none() {
            Status::Backlog
        } else {
            Status::Todo
        };
        Self {
            id,
            title,
            description: None,
            parent_id,
            depth,
            order: 0,
            status,
            priority: Priority::Medium,
            breakdown_status: BreakdownStatus::Pending,
            suggested_children: Vec::new(),
            blocked_by: Vec::new(),
            blocking: Vec::new(),
            tags: Vec::new(),
            estimated_hours: None,
            actual_hours: None,
            due_date: None,
            solved_with_strategy: None,
            strategy_success: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True for items with no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True while at least one blocking dependency is recorded.
    ///
    /// Scoring and notification logic treat such items as blocked even
    /// when their manual status says otherwise.
    pub fn is_blocked(&self) -> bool {
        !self.blocked_by.is_empty()
    }
}

/// Schema version written by this crate and required on load
pub const SCHEMA_VERSION: u32 = 2;

/// The persisted document: the whole item collection plus notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub version: u32,
    pub items: Vec<Item>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Collection {
    /// A well-formed empty collection at the current schema version
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            items: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::empty()
    }
}

/// Counts reported by the stats command
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_items: usize,
    pub backlog_items: usize,
    pub todo_items: usize,
    pub in_progress_items: usize,
    pub done_items: usize,
    /// Non-done items with at least one blocking dependency
    pub blocked_items: usize,
    /// Backlog/todo items with no blocking dependencies
    pub ready_items: usize,
}
