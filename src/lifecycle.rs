use crate::error::Result;
use crate::repo::Repository;
use crate::store::Store;
use crate::types::{Item, Notification, NotificationKind, Status};
use chrono::Utc;

/// Collector for strategy outcome statistics, invoked on qualifying
/// completions. Fire-and-forget: a hook failure never rolls back the
/// status transition.
pub trait FeedbackHook {
    fn record(&mut self, item_id: &str, strategy_id: &str, success: bool) -> anyhow::Result<()>;
}

/// Hook that records nothing
pub struct NoopFeedback;

impl FeedbackHook for NoopFeedback {
    fn record(&mut self, _item_id: &str, _strategy_id: &str, _success: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<S: Store> Repository<S> {
    /// Set an item's status.
    ///
    /// Any transition between the five states is permitted, including
    /// reopening from done. Two side effects fire only on a transition
    /// *into* done (not on repeated done updates):
    /// - completing while blocking dependencies remain open is recorded
    ///   as an anomaly notification instead of being rejected;
    /// - an item carrying a solved-with-strategy reference reports its
    ///   outcome through the feedback hook.
    pub fn set_status(
        &mut self,
        id: &str,
        status: Status,
        hook: &mut dyn FeedbackHook,
    ) -> Result<Item> {
        let item = self.get_mut(id)?;
        let previous = item.status;
        item.status = status;
        item.updated_at = Utc::now();

        let completed = status == Status::Done && previous != Status::Done;
        let anomaly = completed && item.is_blocked();
        let feedback = if completed {
            item.solved_with_strategy
                .clone()
                .map(|strategy| (strategy, item.strategy_success.unwrap_or(true)))
        } else {
            None
        };
        let item = item.clone();

        if anomaly {
            let notification = Notification {
                id: self.next_notification_id(),
                kind: NotificationKind::Blocking,
                title: "Completed while blocked".to_string(),
                message: format!(
                    "'{}' was marked done while still blocked by: {}",
                    item.title,
                    item.blocked_by.join(", ")
                ),
                related_id: item.id.clone(),
                priority: item.priority,
                read: false,
                created_at: Utc::now(),
            };
            self.collection.notifications.push(notification);
        }

        if let Some((strategy, success)) = feedback {
            // Outcome collection is best-effort by contract
            let _ = hook.record(&item.id, &strategy, success);
        }

        self.persist()?;
        Ok(item)
    }

    fn next_notification_id(&self) -> String {
        let mut max_num = 0;
        for n in &self.collection.notifications {
            if let Some(num_str) = n.id.strip_prefix("note-") {
                if let Ok(num) = num_str.parse::<u64>() {
                    max_num = max_num.max(num);
                }
            }
        }
        format!("note-{}", max_num + 1)
    }
}
