//! Integration tests driving the full stack through a file-backed store:
//! every mutation must survive reopening the data directory.

use lifetrack::lifecycle::NoopFeedback;
use lifetrack::repo::{NewItem, Repository};
use lifetrack::score;
use lifetrack::store::FileStore;
use lifetrack::types::{Priority, Status, SuggestedChild};
use std::path::Path;

fn open_repo(dir: &Path) -> Repository<FileStore> {
    let store = FileStore::open(dir.join(".lifetrack")).unwrap();
    Repository::open(store).unwrap()
}

fn new_item(title: &str) -> NewItem {
    NewItem {
        title: title.to_string(),
        ..Default::default()
    }
}

fn child_item(title: &str, parent: &str) -> NewItem {
    NewItem {
        title: title.to_string(),
        parent_id: Some(parent.to_string()),
        ..Default::default()
    }
}

#[test]
fn test_mutations_survive_reopen() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let mut repo = open_repo(tmp.path());
        repo.create("lt", new_item("Fix sleep schedule")).unwrap();
        repo.create("lt", child_item("Buy blackout curtains", "lt-1"))
            .unwrap();
        repo.add_edge("lt-2", "lt-1").unwrap();
        repo.set_status("lt-2", Status::InProgress, &mut NoopFeedback)
            .unwrap();
    }

    // A fresh process sees exactly what the first one left behind
    let repo = open_repo(tmp.path());
    assert_eq!(repo.collection().items.len(), 2);
    assert_eq!(repo.get("lt-2").unwrap().status, Status::InProgress);
    assert_eq!(repo.get("lt-1").unwrap().blocked_by, ["lt-2"]);
    assert_eq!(repo.get("lt-2").unwrap().depth, 1);
}

#[test]
fn test_concurrent_writers_last_save_wins() {
    // Two repositories on the same directory. There is no cross-process
    // locking: whichever saves last owns the document, wholesale.
    let tmp = tempfile::tempdir().unwrap();
    open_repo(tmp.path())
        .create("lt", new_item("Shared root"))
        .unwrap();

    let mut first = open_repo(tmp.path());
    let mut second = open_repo(tmp.path());

    first.create("lt", new_item("From first writer")).unwrap();
    second.create("lt", new_item("From second writer")).unwrap();

    let repo = open_repo(tmp.path());
    let titles: Vec<&str> = repo
        .collection()
        .items
        .iter()
        .map(|i| i.title.as_str())
        .collect();
    // The first writer's item was clobbered by the second's save
    assert_eq!(titles, ["Shared root", "From second writer"]);
}

#[test]
fn test_breakdown_approval_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let mut repo = open_repo(tmp.path());
    repo.create("lt", new_item("Learn Spanish")).unwrap();

    let suggestions = vec![
        SuggestedChild {
            title: "Find a tutor".to_string(),
            description: Some("Weekly sessions".to_string()),
            priority: Priority::High,
            estimated_hours: Some(2.0),
        },
        SuggestedChild {
            title: "Install a flashcard app".to_string(),
            description: None,
            priority: Priority::Low,
            estimated_hours: Some(0.5),
        },
        SuggestedChild {
            title: "Set a daily reminder".to_string(),
            description: None,
            priority: Priority::Medium,
            estimated_hours: None,
        },
    ];
    repo.request_breakdown("lt-1", suggestions).unwrap();
    let children = repo.approve_breakdown("lt-1", "lt").unwrap();
    assert_eq!(children.len(), 3);

    // The materialized children persist with sequential ids and the
    // suggestion fields carried over
    let repo = open_repo(tmp.path());
    let children = repo.children("lt-1").unwrap();
    assert_eq!(children.len(), 3);
    assert_eq!(children[0].id, "lt-2");
    assert_eq!(children[0].title, "Find a tutor");
    assert_eq!(children[0].priority, Priority::High);
    assert_eq!(children[0].depth, 1);
    assert_eq!(children[2].id, "lt-4");
    assert!(repo.get("lt-1").unwrap().suggested_children.is_empty());
}

#[test]
fn test_done_while_blocked_notification_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let mut repo = open_repo(tmp.path());
    repo.create("lt", new_item("Renew passport")).unwrap();
    repo.create("lt", new_item("Get photos taken")).unwrap();
    repo.add_edge("lt-2", "lt-1").unwrap();

    repo.set_status("lt-1", Status::Done, &mut NoopFeedback)
        .unwrap();

    let repo = open_repo(tmp.path());
    let notes = &repo.collection().notifications;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].related_id, "lt-1");
    assert!(!notes[0].read);
}

#[test]
fn test_cascade_delete_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let mut repo = open_repo(tmp.path());
    repo.create("lt", new_item("Root")).unwrap();
    repo.create("lt", child_item("Child", "lt-1")).unwrap();
    repo.create("lt", child_item("Grandchild", "lt-2")).unwrap();
    repo.create("lt", new_item("Bystander")).unwrap();
    repo.add_edge("lt-2", "lt-4").unwrap();

    let removed = repo.delete("lt-1", true).unwrap();
    assert_eq!(removed, ["lt-1", "lt-2", "lt-3"]);

    // The bystander survives with its dangling edge purged
    let repo = open_repo(tmp.path());
    assert_eq!(repo.collection().items.len(), 1);
    assert!(repo.get("lt-4").unwrap().blocked_by.is_empty());
}

#[test]
fn test_rank_over_persisted_collection() {
    let tmp = tempfile::tempdir().unwrap();
    let mut repo = open_repo(tmp.path());
    repo.create(
        "lt",
        NewItem {
            title: "Urgent chore".to_string(),
            priority: Some(Priority::Urgent),
            ..Default::default()
        },
    )
    .unwrap();
    repo.create("lt", new_item("Ordinary chore")).unwrap();
    repo.create("lt", new_item("Finished chore")).unwrap();
    repo.set_status("lt-3", Status::Done, &mut NoopFeedback)
        .unwrap();

    let repo = open_repo(tmp.path());
    let ranked = score::rank(&repo.collection().items, chrono::Utc::now());
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].id, "lt-1");
    assert!(ranked[0].score > ranked[1].score);
    assert!(!ranked[0].reason.is_empty());
}

#[test]
fn test_stats_reflect_collection() {
    let tmp = tempfile::tempdir().unwrap();
    let mut repo = open_repo(tmp.path());
    repo.create("lt", new_item("A")).unwrap();
    repo.create("lt", new_item("B")).unwrap();
    repo.create("lt", new_item("C")).unwrap();
    repo.add_edge("lt-1", "lt-2").unwrap();
    repo.set_status("lt-3", Status::Done, &mut NoopFeedback)
        .unwrap();

    let stats = repo.stats();
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.done_items, 1);
    assert_eq!(stats.blocked_items, 1);
    // lt-1 blocks but is not blocked, so it is the only ready item
    assert_eq!(stats.ready_items, 1);
}
