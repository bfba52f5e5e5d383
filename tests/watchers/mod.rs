use std::sync::Arc;

use async_trait::async_trait;
use d_poll::BucketEvent;
use d_poll::BucketWatcher;
use d_poll::MemKvStore;
use d_poll::ObjectLister;
use d_poll::Pollable;
use d_poll::RemoteObject;
use d_poll::Result;
use parking_lot::Mutex;
use tokio::time::timeout;

use crate::common::forward;
use crate::common::runtime;
use crate::common::RECV_TIMEOUT;
use crate::enable_logger;

/// Bucket whose contents tests rewrite between ticks
#[derive(Default)]
struct FakeBucket {
    objects: Mutex<Vec<RemoteObject>>,
}

impl FakeBucket {
    fn put(
        &self,
        key: &str,
        e_tag: &str,
        last_modified: i64,
    ) {
        let mut objects = self.objects.lock();
        objects.retain(|o| o.key != key);
        objects.push(RemoteObject {
            key: key.to_string(),
            last_modified: Some(last_modified),
            e_tag: e_tag.to_string(),
            size: 1,
        });
    }
}

#[async_trait]
impl ObjectLister for FakeBucket {
    async fn list_objects(
        &self,
        _bucket: &str,
    ) -> Result<Vec<RemoteObject>> {
        Ok(self.objects.lock().clone())
    }
}

fn object_keys(event: &BucketEvent) -> Vec<String> {
    match event {
        BucketEvent::Objects(snapshot) => snapshot.keys().cloned().collect(),
        BucketEvent::Object(o) => vec![o.key.clone()],
    }
}

#[tokio::test]
async fn test_first_tick_then_single_addition() {
    enable_logger();
    let bucket = Arc::new(FakeBucket::default());
    let watcher =
        BucketWatcher::new("scenario-a", "media-bucket", bucket.clone(), Arc::new(MemKvStore::new()), "it").unwrap();

    let (init, mut init_rx) = forward::<BucketEvent>();
    let (added, mut added_rx) = forward::<BucketEvent>();
    let (modified, mut modified_rx) = forward::<BucketEvent>();
    let (removed, mut removed_rx) = forward::<BucketEvent>();
    watcher.on_event_type("BucketInitialized", init, None).unwrap();
    watcher.on_event_type("ObjectAdded", added, None).unwrap();
    watcher.on_event_type("ObjectModified", modified, None).unwrap();
    watcher.on_event_type("ObjectRemoved", removed, None).unwrap();

    watcher.on_poll().await.unwrap();
    assert_eq!(object_keys(&init_rx.try_recv().unwrap()), Vec::<String>::new());
    assert!(added_rx.try_recv().is_err());

    bucket.put("a", "etag-1", 1);
    watcher.on_poll().await.unwrap();

    assert_eq!(object_keys(&added_rx.try_recv().unwrap()), vec!["a"]);
    assert!(added_rx.try_recv().is_err());
    assert!(modified_rx.try_recv().is_err());
    assert!(removed_rx.try_recv().is_err());
    assert!(init_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_ignored_fields_do_not_count_as_modification() {
    let bucket = Arc::new(FakeBucket::default());
    bucket.put("clip.mov", "etag-1", 100);
    let watcher =
        BucketWatcher::new("scenario-d", "media-bucket", bucket.clone(), Arc::new(MemKvStore::new()), "it").unwrap();
    let (modified, mut modified_rx) = forward::<BucketEvent>();
    watcher.on_event_type("ObjectModified", modified, None).unwrap();

    watcher.on_poll().await.unwrap();
    // Same tag, size and time stamp: re-listing the object is not a change
    bucket.put("clip.mov", "etag-1", 100);
    watcher.on_poll().await.unwrap();
    assert!(modified_rx.try_recv().is_err());

    bucket.put("clip.mov", "etag-2", 200);
    watcher.on_poll().await.unwrap();
    assert_eq!(object_keys(&modified_rx.try_recv().unwrap()), vec!["clip.mov"]);
}

#[tokio::test]
async fn test_scheduled_watcher_reports_uploads() {
    let runtime = runtime();
    let bucket = Arc::new(FakeBucket::default());
    let watcher = runtime
        .bucket_watcher("scheduled", "media-bucket", bucket.clone())
        .unwrap();
    let (changed, mut changed_rx) = forward::<BucketEvent>();
    let (added, mut added_rx) = forward::<BucketEvent>();
    watcher.on_event_type("BucketChanged", changed, None).unwrap();
    watcher.on_event_type("ObjectAdded", added, None).unwrap();

    // Let the initializing tick pass before uploading
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    bucket.put("upload.jpg", "etag-9", 5);

    let event = timeout(RECV_TIMEOUT, added_rx.recv()).await.unwrap().unwrap();
    assert_eq!(object_keys(&event), vec!["upload.jpg"]);
    let snapshot = timeout(RECV_TIMEOUT, changed_rx.recv()).await.unwrap().unwrap();
    assert_eq!(object_keys(&snapshot), vec!["upload.jpg"]);

    runtime.shutdown().await;
}
