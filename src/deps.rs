use crate::error::{Error, Result};
use crate::repo::Repository;
use crate::store::Store;
use crate::types::Item;
use chrono::Utc;
use std::collections::HashSet;

/// Dependency-edge operations.
///
/// Every edge is stored on both endpoints: `blocker.blocking` holds the
/// blocked id and `blocked.blockedBy` holds the blocker id. Both sides
/// are updated on the in-memory graph before the single persisted save,
/// so readers can never observe a one-sided edge.
impl<S: Store> Repository<S> {
    /// Record that `blocker_id` blocks `blocked_id`.
    ///
    /// Blocking chains and cross-links are allowed (this is not an
    /// ownership relation); only self-edges are rejected. Adding an edge
    /// that already exists is a no-op.
    pub fn add_edge(&mut self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        if blocker_id == blocked_id {
            return Err(Error::SelfDependency(blocker_id.to_string()));
        }
        self.get(blocker_id)?;
        self.get(blocked_id)?;

        let now = Utc::now();
        let blocker = self.get_mut(blocker_id)?;
        if !blocker.blocking.iter().any(|id| id == blocked_id) {
            blocker.blocking.push(blocked_id.to_string());
            blocker.updated_at = now;
        }
        let blocked = self.get_mut(blocked_id)?;
        if !blocked.blocked_by.iter().any(|id| id == blocker_id) {
            blocked.blocked_by.push(blocker_id.to_string());
            blocked.updated_at = now;
        }

        self.persist()
    }

    /// Remove the edge in both directions. Removing an edge that does
    /// not exist is a no-op, not an error.
    pub fn remove_edge(&mut self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        self.get(blocker_id)?;
        self.get(blocked_id)?;

        let now = Utc::now();
        let blocker = self.get_mut(blocker_id)?;
        let before = blocker.blocking.len();
        blocker.blocking.retain(|id| id != blocked_id);
        if blocker.blocking.len() != before {
            blocker.updated_at = now;
        }
        let blocked = self.get_mut(blocked_id)?;
        let before = blocked.blocked_by.len();
        blocked.blocked_by.retain(|id| id != blocker_id);
        if blocked.blocked_by.len() != before {
            blocked.updated_at = now;
        }

        self.persist()
    }
}

/// Purge references to removed ids from every remaining item's edge sets
pub(crate) fn scrub_edges(items: &mut [Item], removed: &HashSet<String>) {
    for item in items.iter_mut() {
        item.blocked_by.retain(|id| !removed.contains(id));
        item.blocking.retain(|id| !removed.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::NewItem;
    use crate::store::MemStore;

    fn repo_with(n: usize) -> Repository<MemStore> {
        let mut repo = Repository::open(MemStore::new()).unwrap();
        for i in 0..n {
            repo.create(
                "lt",
                NewItem {
                    title: format!("Item {}", i + 1),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        repo
    }

    #[test]
    fn test_add_edge_updates_both_sides() {
        let mut repo = repo_with(2);
        repo.add_edge("lt-1", "lt-2").unwrap();

        assert_eq!(repo.get("lt-1").unwrap().blocking, ["lt-2"]);
        assert_eq!(repo.get("lt-2").unwrap().blocked_by, ["lt-1"]);
        assert!(repo.get("lt-1").unwrap().blocked_by.is_empty());
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut repo = repo_with(2);
        repo.add_edge("lt-1", "lt-2").unwrap();
        repo.add_edge("lt-1", "lt-2").unwrap();

        assert_eq!(repo.get("lt-1").unwrap().blocking.len(), 1);
        assert_eq!(repo.get("lt-2").unwrap().blocked_by.len(), 1);
    }

    #[test]
    fn test_self_edge_rejected_before_mutation() {
        let mut repo = repo_with(1);
        assert!(matches!(
            repo.add_edge("lt-1", "lt-1"),
            Err(Error::SelfDependency(_))
        ));
        assert!(repo.get("lt-1").unwrap().blocking.is_empty());
        assert!(repo.get("lt-1").unwrap().blocked_by.is_empty());
    }

    #[test]
    fn test_add_edge_unknown_id() {
        let mut repo = repo_with(1);
        assert!(matches!(
            repo.add_edge("lt-1", "lt-9"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            repo.add_edge("lt-9", "lt-1"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_edge_symmetric_and_idempotent() {
        let mut repo = repo_with(2);
        repo.add_edge("lt-1", "lt-2").unwrap();
        repo.remove_edge("lt-1", "lt-2").unwrap();

        assert!(repo.get("lt-1").unwrap().blocking.is_empty());
        assert!(repo.get("lt-2").unwrap().blocked_by.is_empty());

        // Removing again is a no-op
        repo.remove_edge("lt-1", "lt-2").unwrap();
    }

    #[test]
    fn test_blocking_chains_allowed() {
        let mut repo = repo_with(3);
        repo.add_edge("lt-1", "lt-2").unwrap();
        repo.add_edge("lt-2", "lt-3").unwrap();
        // Even a back-edge is fine; blocking is not ownership
        repo.add_edge("lt-3", "lt-1").unwrap();

        assert_eq!(repo.get("lt-1").unwrap().blocked_by, ["lt-3"]);
    }

    #[test]
    fn test_delete_purges_dangling_edges() {
        let mut repo = repo_with(3);
        repo.add_edge("lt-1", "lt-2").unwrap();
        repo.add_edge("lt-3", "lt-2").unwrap();
        repo.add_edge("lt-2", "lt-3").unwrap();

        repo.delete("lt-2", false).unwrap();

        assert!(repo.get("lt-1").unwrap().blocking.is_empty());
        assert!(repo.get("lt-3").unwrap().blocking.is_empty());
        assert!(repo.get("lt-3").unwrap().blocked_by.is_empty());
    }
}
