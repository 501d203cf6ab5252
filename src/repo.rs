use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Collection, Item, Priority, Stats, Status};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

/// Fields accepted when creating an item
#[derive(Debug, Default, Clone)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub tags: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update; only supplied fields are merged.
///
/// Status changes go through `Repository::set_status` so completion side
/// effects fire, and parent changes go through `Repository::reparent` so
/// depths are recomputed; neither is expressible here.
#[derive(Debug, Default, Clone)]
pub struct ItemPatch {
    pub title: Option<String>,
    /// Empty string clears the description
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub order: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub solved_with_strategy: Option<String>,
    pub strategy_success: Option<bool>,
}

/// The sole mutator of the item collection.
///
/// Owns the store handle and the in-memory snapshot loaded from it, and
/// writes the whole document back through the store after every
/// successful mutation (write-through, no batching).
pub struct Repository<S: Store> {
    store: S,
    pub(crate) collection: Collection,
}

impl<S: Store> Repository<S> {
    /// Load the collection through the given store
    pub fn open(store: S) -> Result<Self> {
        let collection = store.load()?;
        Ok(Self { store, collection })
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub(crate) fn persist(&mut self) -> Result<()> {
        self.store.save(&self.collection)
    }

    /// Get an item by id
    pub fn get(&self, id: &str) -> Result<&Item> {
        self.collection
            .items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Item> {
        self.collection
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Root items, in sibling order
    pub fn roots(&self) -> Vec<&Item> {
        let mut roots: Vec<&Item> = self
            .collection
            .items
            .iter()
            .filter(|i| i.parent_id.is_none())
            .collect();
        sort_siblings(&mut roots);
        roots
    }

    /// Every item, ordered for tree-style display: shallower items
    /// first, siblings in sibling order
    pub fn all(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.collection.items.iter().collect();
        items.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| sibling_order(a, b)));
        items
    }

    /// Direct children of an item, in sibling order
    pub fn children(&self, parent_id: &str) -> Result<Vec<&Item>> {
        self.get(parent_id)?;
        let mut children: Vec<&Item> = self
            .collection
            .items
            .iter()
            .filter(|i| i.parent_id.as_deref() == Some(parent_id))
            .collect();
        sort_siblings(&mut children);
        Ok(children)
    }

    /// Transitive children via breadth-first traversal.
    ///
    /// The walk is bounded by the collection size so a corrupted parent
    /// chain surfaces as a cycle error instead of looping.
    pub fn descendants(&self, id: &str) -> Result<Vec<&Item>> {
        self.get(id)?;

        let mut child_index: HashMap<&str, Vec<&Item>> = HashMap::new();
        for item in &self.collection.items {
            if let Some(parent) = item.parent_id.as_deref() {
                child_index.entry(parent).or_default().push(item);
            }
        }

        let mut result: Vec<&Item> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);
        visited.insert(id);

        while let Some(current) = queue.pop_front() {
            if let Some(children) = child_index.get(current) {
                for child in children {
                    if !visited.insert(child.id.as_str()) {
                        return Err(Error::Cycle(child.id.clone()));
                    }
                    if visited.len() > self.collection.items.len() {
                        return Err(Error::Cycle(child.id.clone()));
                    }
                    result.push(child);
                    queue.push_back(child.id.as_str());
                }
            }
        }

        Ok(result)
    }

    /// Ancestors from the item's parent up to its root, nearest first.
    ///
    /// Iterative walk with a visited guard: a revisited id raises a cycle
    /// error instead of recursing forever.
    pub fn ancestor_chain(&self, id: &str) -> Result<Vec<&Item>> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);

        let mut current = self.get(id)?;
        while let Some(parent_id) = current.parent_id.as_deref() {
            if !visited.insert(parent_id) {
                return Err(Error::Cycle(parent_id.to_string()));
            }
            let parent = self.get(parent_id)?;
            chain.push(parent);
            current = parent;
        }

        Ok(chain)
    }

    /// Depth of an item measured by walking its ancestor chain. Always
    /// equals the stored `depth` field on a well-formed collection.
    pub fn depth_of(&self, id: &str) -> Result<u32> {
        Ok(self.ancestor_chain(id)?.len() as u32)
    }

    /// Next numeric id suffix for the given prefix.
    ///
    /// Ids that do not match `{prefix}-{number}` (e.g. migrated legacy
    /// UUIDs) are opaque and skipped.
    pub fn next_number(&self, prefix: &str) -> u64 {
        let mut max_num = 0;
        for item in &self.collection.items {
            if let Some(rest) = item.id.strip_prefix(prefix) {
                if let Some(num_str) = rest.strip_prefix('-') {
                    if let Ok(num) = num_str.parse::<u64>() {
                        max_num = max_num.max(num);
                    }
                }
            }
        }
        max_num + 1
    }

    /// Create a new item under the resolved parent (root if none)
    pub fn create(&mut self, prefix: &str, spec: NewItem) -> Result<Item> {
        let title = spec.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::EmptyTitle);
        }
        validate_hours(spec.estimated_hours, "estimatedHours")?;

        let (depth, order) = match spec.parent_id.as_deref() {
            Some(parent_id) => {
                let parent_depth = self.get(parent_id)?.depth;
                (parent_depth + 1, self.children(parent_id)?.len() as i64)
            }
            None => (0, self.roots().len() as i64),
        };

        let id = format!("{}-{}", prefix, self.next_number(prefix));
        let mut item = Item::new(id, title, spec.parent_id, depth);
        item.order = order;
        item.description = spec.description.filter(|d| !d.is_empty());
        item.tags = spec.tags;
        item.estimated_hours = spec.estimated_hours;
        item.due_date = spec.due_date;
        if let Some(priority) = spec.priority {
            item.priority = priority;
        }
        if let Some(status) = spec.status {
            item.status = status;
        }

        self.collection.items.push(item.clone());
        self.persist()?;
        Ok(item)
    }

    /// Merge the supplied fields into an item and refresh updated_at
    pub fn update(&mut self, id: &str, patch: ItemPatch) -> Result<Item> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(Error::EmptyTitle);
            }
        }
        validate_hours(patch.estimated_hours, "estimatedHours")?;
        validate_hours(patch.actual_hours, "actualHours")?;

        let item = self.get_mut(id)?;
        if let Some(title) = patch.title {
            item.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            item.description = if description.is_empty() {
                None
            } else {
                Some(description)
            };
        }
        if let Some(priority) = patch.priority {
            item.priority = priority;
        }
        if let Some(order) = patch.order {
            item.order = order;
        }
        if let Some(tags) = patch.tags {
            item.tags = tags;
        }
        if let Some(estimate) = patch.estimated_hours {
            item.estimated_hours = Some(estimate);
        }
        if let Some(actual) = patch.actual_hours {
            item.actual_hours = Some(actual);
        }
        if let Some(due) = patch.due_date {
            item.due_date = Some(due);
        }
        if let Some(strategy) = patch.solved_with_strategy {
            item.solved_with_strategy = if strategy.is_empty() {
                None
            } else {
                Some(strategy)
            };
        }
        if let Some(success) = patch.strategy_success {
            item.strategy_success = Some(success);
        }
        item.updated_at = Utc::now();

        let updated = item.clone();
        self.persist()?;
        Ok(updated)
    }

    /// Move an item under a new parent (or to root) and recompute the
    /// depth of the whole moved subtree.
    ///
    /// Rejected before any mutation if the new parent is the item itself
    /// or one of its descendants (ownership must stay acyclic).
    pub fn reparent(&mut self, id: &str, new_parent: Option<&str>) -> Result<Item> {
        self.get(id)?;

        let (new_depth, new_order) = match new_parent {
            Some(parent_id) => {
                if parent_id == id {
                    return Err(Error::Cycle(id.to_string()));
                }
                let parent = self.get(parent_id)?;
                if self.ancestor_chain(parent_id)?.iter().any(|a| a.id == id) {
                    return Err(Error::Cycle(id.to_string()));
                }
                (parent.depth + 1, self.children(parent_id)?.len() as i64)
            }
            None => (0, self.roots().len() as i64),
        };

        let subtree: Vec<String> = self
            .descendants(id)?
            .into_iter()
            .map(|i| i.id.clone())
            .collect();

        let item = self.get_mut(id)?;
        item.parent_id = new_parent.map(|p| p.to_string());
        item.depth = new_depth;
        item.order = new_order;
        item.updated_at = Utc::now();

        // Shift every descendant: child depth is always parent depth + 1
        for desc_id in subtree {
            let parent_id = self.get(&desc_id)?.parent_id.clone();
            let parent_depth = match parent_id.as_deref() {
                Some(p) => self.get(p)?.depth,
                None => unreachable!("descendant without parent"),
            };
            self.get_mut(&desc_id)?.depth = parent_depth + 1;
        }

        let updated = self.get(id)?.clone();
        self.persist()?;
        Ok(updated)
    }

    /// Delete an item. Without cascade, an item with descendants is
    /// rejected; with cascade the whole subtree goes, and every dangling
    /// dependency reference to a removed id is purged collection-wide.
    pub fn delete(&mut self, id: &str, cascade: bool) -> Result<Vec<String>> {
        let descendants: Vec<String> = self
            .descendants(id)?
            .into_iter()
            .map(|i| i.id.clone())
            .collect();

        if !cascade && !descendants.is_empty() {
            return Err(Error::HasChildren(id.to_string()));
        }

        let mut removed: HashSet<String> = descendants.into_iter().collect();
        removed.insert(id.to_string());

        self.collection.items.retain(|i| !removed.contains(&i.id));
        crate::deps::scrub_edges(&mut self.collection.items, &removed);

        self.persist()?;
        let mut ids: Vec<String> = removed.into_iter().collect();
        ids.sort();
        Ok(ids)
    }

    /// Status and readiness counts across the collection
    pub fn stats(&self) -> Stats {
        let items = &self.collection.items;
        Stats {
            total_items: items.len(),
            backlog_items: items.iter().filter(|i| i.status == Status::Backlog).count(),
            todo_items: items.iter().filter(|i| i.status == Status::Todo).count(),
            in_progress_items: items
                .iter()
                .filter(|i| i.status == Status::InProgress)
                .count(),
            done_items: items.iter().filter(|i| i.status == Status::Done).count(),
            blocked_items: items
                .iter()
                .filter(|i| i.status != Status::Done && i.is_blocked())
                .count(),
            ready_items: items
                .iter()
                .filter(|i| {
                    matches!(i.status, Status::Backlog | Status::Todo) && !i.is_blocked()
                })
                .count(),
        }
    }
}

fn sort_siblings(items: &mut [&Item]) {
    items.sort_by(|a, b| sibling_order(a, b));
}

fn sibling_order(a: &Item, b: &Item) -> std::cmp::Ordering {
    a.order
        .cmp(&b.order)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn validate_hours(value: Option<f64>, field: &str) -> Result<()> {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            return Err(Error::InvalidValue(format!(
                "{} must be a non-negative number, got {}",
                field, v
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn repo() -> Repository<MemStore> {
        Repository::open(MemStore::new()).unwrap()
    }

    fn new_titled(title: &str) -> NewItem {
        NewItem {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn child_of(title: &str, parent: &str) -> NewItem {
        NewItem {
            title: title.to_string(),
            parent_id: Some(parent.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_assigns_sequential_ids_and_depth() {
        let mut repo = repo();
        let root = repo.create("lt", new_titled("Root")).unwrap();
        assert_eq!(root.id, "lt-1");
        assert_eq!(root.depth, 0);
        assert_eq!(root.status, Status::Backlog);

        let child = repo.create("lt", child_of("Child", "lt-1")).unwrap();
        assert_eq!(child.id, "lt-2");
        assert_eq!(child.depth, 1);
        assert_eq!(child.status, Status::Todo);
        assert!(child.updated_at >= child.created_at);
    }

    #[test]
    fn test_create_skips_opaque_legacy_ids() {
        let mut repo = repo();
        repo.collection.items.push(Item::new(
            "3f2a77f6-aaaa-bbbb-cccc-000000000000".to_string(),
            "Migrated".to_string(),
            None,
            0,
        ));
        let item = repo.create("lt", new_titled("Fresh")).unwrap();
        assert_eq!(item.id, "lt-1");
    }

    #[test]
    fn test_create_rejects_empty_title() {
        let mut repo = repo();
        assert!(matches!(
            repo.create("lt", new_titled("   ")),
            Err(Error::EmptyTitle)
        ));
        assert!(repo.collection().items.is_empty());
    }

    #[test]
    fn test_create_rejects_missing_parent() {
        let mut repo = repo();
        assert!(matches!(
            repo.create("lt", child_of("Orphan", "lt-99")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_create_rejects_negative_estimate() {
        let mut repo = repo();
        let spec = NewItem {
            title: "Bad".to_string(),
            estimated_hours: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            repo.create("lt", spec),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_children_in_sibling_order() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root")).unwrap();
        repo.create("lt", child_of("A", "lt-1")).unwrap();
        repo.create("lt", child_of("B", "lt-1")).unwrap();
        repo.create("lt", child_of("C", "lt-1")).unwrap();

        let children = repo.children("lt-1").unwrap();
        let titles: Vec<&str> = children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(children[2].order, 2);
    }

    #[test]
    fn test_all_lists_shallow_first_in_sibling_order() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root A")).unwrap();
        repo.create("lt", child_of("A child", "lt-1")).unwrap();
        repo.create("lt", new_titled("Root B")).unwrap();
        repo.create("lt", child_of("A second child", "lt-1")).unwrap();

        // Interleaved creation, but roots come first and siblings keep
        // their order
        let ids: Vec<&str> = repo.all().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["lt-1", "lt-3", "lt-2", "lt-4"]);
    }

    #[test]
    fn test_descendants_and_ancestors() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root")).unwrap();
        repo.create("lt", child_of("Child", "lt-1")).unwrap();
        repo.create("lt", child_of("Grandchild", "lt-2")).unwrap();

        let desc = repo.descendants("lt-1").unwrap();
        let ids: Vec<&str> = desc.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["lt-2", "lt-3"]);

        let chain = repo.ancestor_chain("lt-3").unwrap();
        let ids: Vec<&str> = chain.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["lt-2", "lt-1"]);

        // The walked depth agrees with the stored field
        assert_eq!(repo.depth_of("lt-3").unwrap(), 2);
        assert_eq!(repo.get("lt-3").unwrap().depth, 2);
    }

    #[test]
    fn test_ancestor_walk_detects_corrupted_cycle() {
        let mut repo = repo();
        repo.create("lt", new_titled("A")).unwrap();
        repo.create("lt", child_of("B", "lt-1")).unwrap();
        // Corrupt the tree directly: lt-1 claims lt-2 as its parent
        repo.get_mut("lt-1").unwrap().parent_id = Some("lt-2".to_string());

        assert!(matches!(
            repo.ancestor_chain("lt-2"),
            Err(Error::Cycle(_))
        ));
        assert!(matches!(repo.descendants("lt-1"), Err(Error::Cycle(_))));
    }

    #[test]
    fn test_reparent_recomputes_subtree_depths() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root A")).unwrap();
        repo.create("lt", new_titled("Root B")).unwrap();
        repo.create("lt", child_of("Child", "lt-1")).unwrap();
        repo.create("lt", child_of("Grandchild", "lt-3")).unwrap();

        // Move the child subtree under root B's child chain
        repo.reparent("lt-3", Some("lt-2")).unwrap();
        assert_eq!(repo.get("lt-3").unwrap().depth, 1);
        assert_eq!(repo.get("lt-4").unwrap().depth, 2);

        // And up to root
        repo.reparent("lt-3", None).unwrap();
        assert_eq!(repo.get("lt-3").unwrap().depth, 0);
        assert_eq!(repo.get("lt-4").unwrap().depth, 1);
    }

    #[test]
    fn test_reparent_rejects_ownership_cycle() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root")).unwrap();
        repo.create("lt", child_of("Child", "lt-1")).unwrap();
        repo.create("lt", child_of("Grandchild", "lt-2")).unwrap();

        assert!(matches!(
            repo.reparent("lt-1", Some("lt-3")),
            Err(Error::Cycle(_))
        ));
        assert!(matches!(
            repo.reparent("lt-1", Some("lt-1")),
            Err(Error::Cycle(_))
        ));
        // Nothing was mutated
        assert_eq!(repo.get("lt-1").unwrap().depth, 0);
        assert!(repo.get("lt-1").unwrap().parent_id.is_none());
    }

    #[test]
    fn test_delete_without_cascade_rejects_children() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root")).unwrap();
        repo.create("lt", child_of("Child", "lt-1")).unwrap();

        assert!(matches!(
            repo.delete("lt-1", false),
            Err(Error::HasChildren(_))
        ));
        assert_eq!(repo.collection().items.len(), 2);

        let removed = repo.delete("lt-1", true).unwrap();
        assert_eq!(removed, ["lt-1", "lt-2"]);
        assert!(repo.collection().items.is_empty());
    }

    #[test]
    fn test_update_merges_only_supplied_fields() {
        let mut repo = repo();
        repo.create("lt", new_titled("Root")).unwrap();

        let patch = ItemPatch {
            priority: Some(Priority::Urgent),
            tags: Some(vec!["health".to_string()]),
            ..Default::default()
        };
        let updated = repo.update("lt-1", patch).unwrap();
        assert_eq!(updated.priority, Priority::Urgent);
        assert_eq!(updated.title, "Root");
        assert_eq!(updated.tags, ["health"]);
    }
}
