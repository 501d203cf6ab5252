use crate::error::{Error, Result};
use crate::repo::Repository;
use crate::store::Store;
use crate::types::{BreakdownStatus, Item, SuggestedChild};
use chrono::Utc;

/// Breakdown workflow: pending -> suggested -> approved | rejected, with
/// re-requesting allowed after rejection.
impl<S: Store> Repository<S> {
    /// Store externally produced child suggestions and move the item to
    /// the suggested state.
    ///
    /// Legal only from pending or rejected: an open suggestion set must
    /// be approved or rejected before a new one can replace it.
    pub fn request_breakdown(
        &mut self,
        id: &str,
        suggestions: Vec<SuggestedChild>,
    ) -> Result<Item> {
        if suggestions.is_empty() {
            return Err(Error::InvalidValue(
                "a breakdown request needs at least one suggestion".to_string(),
            ));
        }

        let current = self.get(id)?.breakdown_status;
        match current {
            BreakdownStatus::Pending | BreakdownStatus::Rejected => {}
            BreakdownStatus::Suggested | BreakdownStatus::Approved => {
                return Err(Error::InvalidState(format!(
                    "cannot request a breakdown for {} while it is {}",
                    id, current
                )));
            }
        }

        let item = self.get_mut(id)?;
        item.suggested_children = suggestions;
        item.breakdown_status = BreakdownStatus::Suggested;
        item.updated_at = Utc::now();

        let item = item.clone();
        self.persist()?;
        Ok(item)
    }

    /// Materialize every stored suggestion as a child item.
    ///
    /// All-or-nothing: the full child set is validated and built before
    /// anything is attached, so a bad suggestion leaves the tree
    /// untouched and the item still suggested.
    pub fn approve_breakdown(&mut self, id: &str, prefix: &str) -> Result<Vec<Item>> {
        let parent = self.get(id)?;
        if parent.breakdown_status != BreakdownStatus::Suggested {
            return Err(Error::InvalidState(format!(
                "cannot approve a breakdown for {} while it is {}",
                id, parent.breakdown_status
            )));
        }

        let parent_depth = parent.depth;
        let suggestions = parent.suggested_children.clone();
        let base_order = self.children(id)?.len() as i64;
        let mut next_num = self.next_number(prefix);

        let mut children = Vec::with_capacity(suggestions.len());
        for (i, suggestion) in suggestions.iter().enumerate() {
            let title = suggestion.title.trim().to_string();
            if title.is_empty() {
                return Err(Error::EmptyTitle);
            }
            if let Some(estimate) = suggestion.estimated_hours {
                if !estimate.is_finite() || estimate < 0.0 {
                    return Err(Error::InvalidValue(format!(
                        "suggested estimatedHours must be non-negative, got {}",
                        estimate
                    )));
                }
            }

            let child_id = format!("{}-{}", prefix, next_num);
            next_num += 1;

            let mut child = Item::new(child_id, title, Some(id.to_string()), parent_depth + 1);
            child.order = base_order + i as i64;
            child.description = suggestion.description.clone().filter(|d| !d.is_empty());
            child.priority = suggestion.priority;
            child.estimated_hours = suggestion.estimated_hours;
            children.push(child);
        }

        let parent = self.get_mut(id)?;
        parent.breakdown_status = BreakdownStatus::Approved;
        parent.suggested_children.clear();
        parent.updated_at = Utc::now();
        self.collection.items.extend(children.iter().cloned());

        self.persist()?;
        Ok(children)
    }

    /// Discard the stored suggestions. Legal only from suggested; the
    /// item can be re-requested afterwards.
    pub fn reject_breakdown(&mut self, id: &str) -> Result<Item> {
        let current = self.get(id)?.breakdown_status;
        if current != BreakdownStatus::Suggested {
            return Err(Error::InvalidState(format!(
                "cannot reject a breakdown for {} while it is {}",
                id, current
            )));
        }

        let item = self.get_mut(id)?;
        item.suggested_children.clear();
        item.breakdown_status = BreakdownStatus::Rejected;
        item.updated_at = Utc::now();

        let item = item.clone();
        self.persist()?;
        Ok(item)
    }
}
