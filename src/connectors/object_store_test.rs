use std::collections::VecDeque;
use std::sync::Arc;

use super::*;
use crate::test_utils::enable_logger;
use crate::test_utils::mem_store;
use crate::test_utils::RecordingHandler;
use crate::Error;
use crate::KvStore;
use crate::Pollable;
use crate::RemoteError;
use crate::ResourceState;
use crate::ValidationError;

fn object(
    key: &str,
    e_tag: &str,
    size: i64,
) -> RemoteObject {
    RemoteObject {
        key: key.to_string(),
        last_modified: Some(1_700_000_000_000),
        e_tag: e_tag.to_string(),
        size,
    }
}

/// Lister replaying one listing per tick, then empty buckets
fn lister(listings: Vec<Vec<RemoteObject>>) -> Arc<MockObjectLister> {
    let mut listings = VecDeque::from(listings);
    let mut mock = MockObjectLister::new();
    mock.expect_list_objects()
        .returning(move |_| Ok(listings.pop_front().unwrap_or_default()));
    Arc::new(mock)
}

fn watcher(
    lister: Arc<MockObjectLister>,
    store: Arc<dyn KvStore>,
) -> Arc<BucketWatcher> {
    BucketWatcher::new("w1", "media-bucket", lister, store, "dpoll").unwrap()
}

fn keys(events: &[BucketEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            BucketEvent::Object(o) => o.key.clone(),
            BucketEvent::Objects(s) => format!("snapshot:{}", s.len()),
        })
        .collect()
}

#[test]
fn test_new_rejects_invalid_bucket() {
    let result = BucketWatcher::new("w1", "Not_A_Bucket", lister(vec![]), mem_store(), "dpoll");
    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::InvalidBucket(_)))
    ));
}

#[test]
fn test_on_event_type_parses_names() {
    let w = watcher(lister(vec![]), mem_store());
    let handler = RecordingHandler::<BucketEvent>::new();

    assert!(w.on_event_type("ObjectAdded", handler.clone(), None).is_ok());
    assert!(matches!(
        w.on_event_type("ObjectRenamed", handler, None),
        Err(Error::Validation(ValidationError::InvalidEventType(_)))
    ));
}

#[test]
fn test_same_as_ignores_key() {
    let a = ObjectState::try_from(object("a", "t1", 10)).unwrap();
    let mut b = a.clone();
    b.key = "b".to_string();
    assert!(a.same_as(&b));

    b.size = 11;
    assert!(!a.same_as(&b));
}

#[test]
fn test_remote_object_validation() {
    assert!(ObjectState::try_from(object("", "t", 1)).is_err());
    assert!(ObjectState::try_from(object("a", "", 1)).is_err());
    assert!(ObjectState::try_from(object("a", "t", -1)).is_err());

    let mut no_time = object("a", "t", 1);
    no_time.last_modified = None;
    assert!(matches!(
        ObjectState::try_from(no_time),
        Err(Error::Validation(ValidationError::InvalidRemoteEntry(_)))
    ));
}

#[tokio::test]
async fn test_first_tick_only_initializes() {
    enable_logger();
    let w = watcher(lister(vec![vec![object("a", "t1", 1), object("b", "t2", 2)]]), mem_store());

    let init = RecordingHandler::<BucketEvent>::new();
    let added = RecordingHandler::<BucketEvent>::new();
    w.on_event_type("BucketInitialized", init.clone(), None).unwrap();
    w.on_event_type("ObjectAdded", added.clone(), None).unwrap();

    w.on_poll().await.unwrap();

    assert_eq!(keys(&init.events()), vec!["snapshot:2"]);
    assert_eq!(added.count(), 0);
}

#[tokio::test]
async fn test_changes_fire_per_category() {
    enable_logger();
    let w = watcher(
        lister(vec![
            vec![object("a", "t1", 1), object("b", "t2", 2)],
            vec![object("a", "t1-new", 1), object("c", "t3", 3)],
            vec![object("a", "t1-new", 1), object("c", "t3", 3)],
        ]),
        mem_store(),
    );

    let changed = RecordingHandler::<BucketEvent>::new();
    let added = RecordingHandler::<BucketEvent>::new();
    let modified = RecordingHandler::<BucketEvent>::new();
    let removed = RecordingHandler::<BucketEvent>::new();
    w.on_event_type("BucketChanged", changed.clone(), None).unwrap();
    w.on_event_type("ObjectAdded", added.clone(), None).unwrap();
    w.on_event_type("ObjectModified", modified.clone(), None).unwrap();
    w.on_event_type("ObjectRemoved", removed.clone(), None).unwrap();

    w.on_poll().await.unwrap();
    w.on_poll().await.unwrap();

    assert_eq!(keys(&changed.events()), vec!["snapshot:2"]);
    assert_eq!(keys(&added.events()), vec!["c"]);
    assert_eq!(keys(&modified.events()), vec!["a"]);
    assert_eq!(keys(&removed.events()), vec!["b"]);

    // Identical listing: silence
    w.on_poll().await.unwrap();
    assert_eq!(changed.count(), 1);
    assert_eq!(added.count(), 1);
}

#[tokio::test]
async fn test_snapshot_survives_watcher_restart() {
    let store = mem_store();
    let first = watcher(lister(vec![vec![object("a", "t1", 1)]]), store.clone());
    first.on_poll().await.unwrap();
    drop(first);

    let second = watcher(lister(vec![vec![object("a", "t1", 1), object("b", "t2", 2)]]), store);
    let init = RecordingHandler::<BucketEvent>::new();
    let added = RecordingHandler::<BucketEvent>::new();
    second.on_event_type("BucketInitialized", init.clone(), None).unwrap();
    second.on_event_type("ObjectAdded", added.clone(), None).unwrap();

    second.on_poll().await.unwrap();

    assert_eq!(init.count(), 0);
    assert_eq!(keys(&added.events()), vec!["b"]);
}

#[tokio::test]
async fn test_listing_failure_aborts_tick_without_touching_snapshot() {
    let store = mem_store();
    let mut mock = MockObjectLister::new();
    mock.expect_list_objects()
        .returning(|_| Err(RemoteError::Service("listing unavailable".to_string()).into()));
    let w = watcher(Arc::new(mock), store.clone());

    assert!(matches!(w.on_poll().await, Err(Error::Remote(_))));
    assert!(store.list("").unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_failure_does_not_block_other_categories() {
    let w = watcher(
        lister(vec![
            vec![object("a", "t1", 1)],
            vec![object("a", "t1", 1), object("b", "t2", 2)],
        ]),
        mem_store(),
    );

    let failing = RecordingHandler::<BucketEvent>::failing_on(|_| true);
    let added = RecordingHandler::<BucketEvent>::new();
    w.on_event_type("BucketChanged", failing, None).unwrap();
    w.on_event_type("ObjectAdded", added.clone(), None).unwrap();

    w.on_poll().await.unwrap();
    let result = w.on_poll().await;

    assert!(matches!(result, Err(Error::Handler(ref e)) if e.failures.len() == 1));
    assert_eq!(keys(&added.events()), vec!["b"]);
}

#[test]
fn test_name_includes_id() {
    let w = watcher(lister(vec![]), mem_store());
    assert_eq!(w.name(), "BucketWatcher:w1");
    assert_eq!(w.bucket(), "media-bucket");
}
