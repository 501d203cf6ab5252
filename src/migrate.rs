use crate::error::{Error, Result};
use crate::store::{atomic_write, DOC_FILE};
use crate::types::{
    BreakdownStatus, Collection, Item, Notification, Priority, Status, SuggestedChild,
    SCHEMA_VERSION,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Legacy two-level document: flat problem and task arrays
#[derive(Debug, Deserialize)]
struct LegacyDoc {
    #[serde(default)]
    problems: Vec<LegacyProblem>,
    #[serde(default)]
    tasks: Vec<LegacyTask>,
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyProblem {
    id: String,
    text: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    breakdown_status: Option<BreakdownStatus>,
    #[serde(default)]
    suggested_tasks: Vec<LegacySuggested>,
    #[serde(default)]
    blocked_by: Vec<String>,
    #[serde(default)]
    blocking: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    estimated_hours: Option<f64>,
    #[serde(default)]
    actual_hours: Option<f64>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTask {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    problem_id: Option<String>,
    #[serde(default)]
    parent_task_id: Option<String>,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    order: Option<i64>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    blocked_by: Vec<String>,
    #[serde(default)]
    blocking: Vec<String>,
    #[serde(default)]
    estimated_hours: Option<f64>,
    #[serde(default)]
    actual_hours: Option<f64>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
}

/// A legacy suggested task; only the suggestion fields carry over
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySuggested {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    estimated_hours: Option<f64>,
}

/// What the migration did (or why it did nothing)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub migrated: bool,
    pub problems: usize,
    pub tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

impl MigrationReport {
    fn noop() -> Self {
        Self {
            migrated: false,
            problems: 0,
            tasks: 0,
            backup: None,
        }
    }
}

/// Convert a legacy `{problems, tasks}` document in `dir` to the unified
/// version-2 `{items}` tree.
///
/// Idempotent: a document already at version 2 is a detected no-op. A
/// cycle in the legacy task parent chain aborts before anything is
/// written. On success a timestamped backup of the original sits next to
/// the document, and the new document is written atomically.
pub fn migrate(dir: &Path) -> Result<MigrationReport> {
    let doc_path = dir.join(DOC_FILE);
    if !doc_path.exists() {
        return Ok(MigrationReport::noop());
    }

    let raw = fs::read_to_string(&doc_path)?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| Error::Corrupt {
        path: doc_path.clone(),
        detail: e.to_string(),
    })?;

    if value.get("version").and_then(serde_json::Value::as_u64) == Some(SCHEMA_VERSION as u64)
        && value.get("items").map(|v| v.is_array()).unwrap_or(false)
    {
        return Ok(MigrationReport::noop());
    }

    // Only a document that actually carries the legacy keys is a
    // migration candidate. Anything else (e.g. a versioned document
    // with a mangled items field) is corruption, never an empty legacy
    // doc to re-transform.
    if value.get("problems").is_none() && value.get("tasks").is_none() {
        return Err(Error::Corrupt {
            path: doc_path.clone(),
            detail: "neither a version-2 collection nor a legacy problems/tasks document"
                .to_string(),
        });
    }

    let legacy: LegacyDoc = serde_json::from_value(value).map_err(|e| Error::Corrupt {
        path: doc_path.clone(),
        detail: e.to_string(),
    })?;

    // Resolve every task depth up front; a cycle must abort the whole
    // migration while the original file is still untouched.
    let parent_map: HashMap<&str, &str> = legacy
        .tasks
        .iter()
        .filter_map(|t| {
            t.parent_task_id
                .as_deref()
                .or(t.problem_id.as_deref())
                .map(|p| (t.id.as_str(), p))
        })
        .collect();
    let mut depths: HashMap<&str, u32> = HashMap::new();
    for task in &legacy.tasks {
        depths.insert(task.id.as_str(), task_depth(task.id.as_str(), &parent_map)?);
    }

    let backup_path = dir.join(format!(
        "problems.backup.{}.json",
        Utc::now().format("%Y-%m-%dT%H-%M-%S")
    ));
    fs::write(&backup_path, &raw)?;

    let mut items = Vec::with_capacity(legacy.problems.len() + legacy.tasks.len());
    for (index, problem) in legacy.problems.iter().enumerate() {
        items.push(problem_to_item(problem, index as i64));
    }
    for task in &legacy.tasks {
        items.push(task_to_item(task, depths[task.id.as_str()]));
    }
    normalize_edges(&mut items);

    let collection = Collection {
        version: SCHEMA_VERSION,
        items,
        notifications: legacy.notifications,
    };

    let json = serde_json::to_string_pretty(&collection)?;
    atomic_write(dir, &doc_path, json.as_bytes())?;

    Ok(MigrationReport {
        migrated: true,
        problems: legacy.problems.len(),
        tasks: legacy.tasks.len(),
        backup: Some(backup_path),
    })
}

/// Count ancestor hops for a legacy task, guarding against parent-chain
/// cycles with a visited set
fn task_depth(task_id: &str, parent_map: &HashMap<&str, &str>) -> Result<u32> {
    let mut depth = 0;
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = task_id;

    visited.insert(current);
    while let Some(parent) = parent_map.get(current) {
        if !visited.insert(parent) {
            return Err(Error::MigrationCycle(task_id.to_string()));
        }
        depth += 1;
        current = parent;
    }

    Ok(depth)
}

fn problem_to_item(problem: &LegacyProblem, order: i64) -> Item {
    let breakdown_status = problem.breakdown_status.unwrap_or(BreakdownStatus::Pending);
    let suggested_children: Vec<SuggestedChild> = if breakdown_status == BreakdownStatus::Suggested
    {
        problem
            .suggested_tasks
            .iter()
            .map(|s| SuggestedChild {
                title: s.title.clone(),
                description: s.description.clone(),
                priority: s.priority.unwrap_or(Priority::Medium),
                estimated_hours: s.estimated_hours,
            })
            .collect()
    } else {
        Vec::new()
    };
    // Invariant repair: suggested with nothing to show reverts to pending
    let breakdown_status = if breakdown_status == BreakdownStatus::Suggested
        && suggested_children.is_empty()
    {
        BreakdownStatus::Pending
    } else {
        breakdown_status
    };

    Item {
        id: problem.id.clone(),
        title: problem.text.clone(),
        description: None,
        parent_id: None,
        depth: 0,
        order,
        status: problem.status.unwrap_or(Status::Backlog),
        priority: problem.priority.unwrap_or(Priority::Medium),
        breakdown_status,
        suggested_children,
        blocked_by: problem.blocked_by.clone(),
        blocking: problem.blocking.clone(),
        tags: problem.tags.clone(),
        estimated_hours: problem.estimated_hours,
        actual_hours: problem.actual_hours,
        due_date: problem.due_date,
        solved_with_strategy: None,
        strategy_success: None,
        created_at: problem.created_at,
        updated_at: problem.updated_at.unwrap_or(problem.created_at),
    }
}

fn task_to_item(task: &LegacyTask, depth: u32) -> Item {
    Item {
        id: task.id.clone(),
        title: task.title.clone(),
        description: task.description.clone().filter(|d| !d.is_empty()),
        parent_id: task.parent_task_id.clone().or_else(|| task.problem_id.clone()),
        depth,
        order: task.order.unwrap_or(0),
        status: task.status.unwrap_or(Status::Todo),
        priority: task.priority.unwrap_or(Priority::Medium),
        breakdown_status: BreakdownStatus::Pending,
        suggested_children: Vec::new(),
        blocked_by: task.blocked_by.clone(),
        blocking: task.blocking.clone(),
        tags: Vec::new(),
        estimated_hours: task.estimated_hours,
        actual_hours: task.actual_hours,
        due_date: task.due_date,
        solved_with_strategy: None,
        strategy_success: None,
        created_at: task.created_at,
        updated_at: task.updated_at.unwrap_or(task.created_at),
    }
}

/// Drop references to unknown or self ids, then mirror every surviving
/// edge onto both endpoints so the symmetry invariant holds on the
/// migrated collection.
fn normalize_edges(items: &mut [Item]) {
    let ids: HashSet<String> = items.iter().map(|i| i.id.clone()).collect();

    for item in items.iter_mut() {
        let own = item.id.clone();
        let mut seen = HashSet::new();
        item.blocked_by
            .retain(|id| id != &own && ids.contains(id) && seen.insert(id.clone()));
        let mut seen = HashSet::new();
        item.blocking
            .retain(|id| id != &own && ids.contains(id) && seen.insert(id.clone()));
    }

    let mut edges: Vec<(String, String)> = Vec::new();
    for item in items.iter() {
        for blocked in &item.blocking {
            edges.push((item.id.clone(), blocked.clone()));
        }
        for blocker in &item.blocked_by {
            edges.push((blocker.clone(), item.id.clone()));
        }
    }
    for (blocker_id, blocked_id) in edges {
        if let Some(blocker) = items.iter_mut().find(|i| i.id == blocker_id) {
            if !blocker.blocking.contains(&blocked_id) {
                blocker.blocking.push(blocked_id.clone());
            }
        }
        if let Some(blocked) = items.iter_mut().find(|i| i.id == blocked_id) {
            if !blocked.blocked_by.contains(&blocker_id) {
                blocked.blocked_by.push(blocker_id.clone());
            }
        }
    }
}
