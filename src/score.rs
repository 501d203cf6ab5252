use crate::types::{Item, Priority, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Weight table. The exact numbers are policy, but they are kept
// internally consistent: priority tiers strictly increase, age bands
// strictly increase, and the blocked-by penalty is small enough that it
// can never dominate the age and blocking signals before the floor
// clamp at zero.
const PRIORITY_LOW: i64 = 25;
const PRIORITY_MEDIUM: i64 = 50;
const PRIORITY_HIGH: i64 = 100;
const PRIORITY_URGENT: i64 = 150;

const AGE_OVER_7_DAYS: i64 = 15;
const AGE_OVER_14_DAYS: i64 = 30;
const AGE_OVER_30_DAYS: i64 = 50;

const STATUS_TODO: i64 = 20;
const STATUS_IN_PROGRESS: i64 = 40;
const STATUS_BLOCKED: i64 = 60;

const PER_BLOCKING_EDGE: i64 = 25;
const PER_BLOCKED_BY_EDGE: i64 = -10;
const ROOT_BOOST: i64 = 10;

/// A ranked entry in the what-to-work-on-next view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    pub score: i64,
    pub reason: String,
    pub age_days: i64,
}

/// Urgency score for one item at the given instant.
///
/// Pure and deterministic: the same item and `now` always produce the
/// same score. Clamped at zero so blocked-by penalties can never push an
/// item below every idle one.
pub fn score(item: &Item, now: DateTime<Utc>) -> i64 {
    score_with_reason(item, now).0
}

fn score_with_reason(item: &Item, now: DateTime<Utc>) -> (i64, String) {
    let mut score = 0;
    let mut reasons = Vec::new();

    score += match item.priority {
        Priority::Low => PRIORITY_LOW,
        Priority::Medium => PRIORITY_MEDIUM,
        Priority::High => PRIORITY_HIGH,
        Priority::Urgent => PRIORITY_URGENT,
    };

    let age = age_days(item, now);
    if age > 30 {
        score += AGE_OVER_30_DAYS;
        reasons.push("over 30 days old".to_string());
    } else if age > 14 {
        score += AGE_OVER_14_DAYS;
        reasons.push("over 2 weeks old".to_string());
    } else if age > 7 {
        score += AGE_OVER_7_DAYS;
        reasons.push("over 1 week old".to_string());
    }

    // An item with open blockers counts as blocked no matter what its
    // manual status says
    if item.status != Status::Done && (item.status == Status::Blocked || item.is_blocked()) {
        score += STATUS_BLOCKED;
        reasons.push("blocked - needs attention".to_string());
    } else {
        match item.status {
            Status::InProgress => {
                score += STATUS_IN_PROGRESS;
                reasons.push("currently in progress".to_string());
            }
            Status::Todo => {
                score += STATUS_TODO;
                reasons.push("ready to start".to_string());
            }
            Status::Backlog | Status::Blocked | Status::Done => {}
        }
    }

    if !item.blocking.is_empty() {
        score += item.blocking.len() as i64 * PER_BLOCKING_EDGE;
        reasons.push(format!("blocking {} other item(s)", item.blocking.len()));
    }

    if !item.blocked_by.is_empty() {
        score += item.blocked_by.len() as i64 * PER_BLOCKED_BY_EDGE;
        reasons.push(format!("blocked by {} item(s)", item.blocked_by.len()));
    }

    if item.depth == 0 {
        score += ROOT_BOOST;
    }

    let reason = if reasons.is_empty() {
        "standard priority".to_string()
    } else {
        reasons.join(", ")
    };

    (score.max(0), reason)
}

fn age_days(item: &Item, now: DateTime<Utc>) -> i64 {
    (now - item.created_at).num_days()
}

/// Rank the non-done items of a snapshot, highest score first.
///
/// Ties are broken by created_at ascending (oldest first), then by id,
/// so repeated calls over a fixed snapshot produce the same order.
pub fn rank(items: &[Item], now: DateTime<Utc>) -> Vec<RankedItem> {
    let mut ranked: Vec<RankedItem> = items
        .iter()
        .filter(|i| i.status != Status::Done)
        .map(|item| {
            let (score, reason) = score_with_reason(item, now);
            RankedItem {
                id: item.id.clone(),
                title: item.title.clone(),
                status: item.status,
                priority: item.priority,
                score,
                reason,
                age_days: age_days(item, now),
            }
        })
        .collect();

    let created: std::collections::HashMap<&str, DateTime<Utc>> = items
        .iter()
        .map(|i| (i.id.as_str(), i.created_at))
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| created[a.id.as_str()].cmp(&created[b.id.as_str()]))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}
