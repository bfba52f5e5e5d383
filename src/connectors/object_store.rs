use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::validate_bucket;
use super::TickFailures;
use crate::Error;
use crate::EventHandler;
use crate::EventRegistry;
use crate::KvStore;
use crate::PollOutcome;
use crate::Pollable;
use crate::ResourceState;
use crate::Result;
use crate::ScopedStore;
use crate::Snapshot;
use crate::SnapshotTracker;
use crate::ValidationError;

pub(crate) const BUCKET_WATCHER_KIND: &str = "BucketWatcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketEventType {
    /// First observation of the bucket, carries every object
    BucketInitialized,
    /// Any change, carries every object after the change
    BucketChanged,
    ObjectAdded,
    ObjectModified,
    ObjectRemoved,
}

impl FromStr for BucketEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BucketInitialized" => Ok(Self::BucketInitialized),
            "BucketChanged" => Ok(Self::BucketChanged),
            "ObjectAdded" => Ok(Self::ObjectAdded),
            "ObjectModified" => Ok(Self::ObjectModified),
            "ObjectRemoved" => Ok(Self::ObjectRemoved),
            other => Err(ValidationError::InvalidEventType(other.to_string()).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEventOptions {
    pub event_type: BucketEventType,
}

/// One entry of a remote object listing, as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    /// Milliseconds since epoch
    pub last_modified: Option<i64>,
    pub e_tag: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    pub key: String,
    pub last_modified: i64,
    pub e_tag: String,
    pub size: u64,
}

impl ResourceState for ObjectState {
    // Tags of multipart uploads are not content hashes, so two uploads of the
    // same bytes may still compare as modified.
    fn same_as(
        &self,
        other: &Self,
    ) -> bool {
        self.e_tag == other.e_tag && self.last_modified == other.last_modified && self.size == other.size
    }
}

impl TryFrom<RemoteObject> for ObjectState {
    type Error = Error;

    fn try_from(o: RemoteObject) -> Result<Self> {
        let invalid = |what: String| -> Error { ValidationError::InvalidRemoteEntry(what).into() };

        if o.key.is_empty() {
            return Err(invalid("object key is empty".to_string()));
        }
        let last_modified = o
            .last_modified
            .ok_or_else(|| invalid(format!("object {} has no time stamp", o.key)))?;
        if o.e_tag.is_empty() {
            return Err(invalid(format!("object {} has an empty tag", o.key)));
        }
        let size = u64::try_from(o.size).map_err(|_| invalid(format!("object {} has size {}", o.key, o.size)))?;

        Ok(ObjectState {
            key: o.key,
            last_modified,
            e_tag: o.e_tag,
            size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BucketEvent {
    /// Payload of `BucketInitialized` and `BucketChanged`
    Objects(Snapshot<ObjectState>),
    /// Payload of the per-object events
    Object(ObjectState),
}

/// Lists every object of a bucket, following pagination
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectLister: Send + Sync + 'static {
    async fn list_objects(
        &self,
        bucket: &str,
    ) -> Result<Vec<RemoteObject>>;
}

/// Watches the contents of one bucket
pub struct BucketWatcher {
    id: String,
    bucket: String,
    lister: Arc<dyn ObjectLister>,
    tracker: SnapshotTracker<ObjectState>,
    events: EventRegistry<BucketEventOptions, BucketEvent>,
}

impl Debug for BucketWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BucketWatcher")
            .field("id", &self.id)
            .field("bucket", &self.bucket)
            .field("events", &self.events)
            .finish()
    }
}

impl BucketWatcher {
    pub fn new(
        id: impl Into<String>,
        bucket: &str,
        lister: Arc<dyn ObjectLister>,
        store: Arc<dyn KvStore>,
        namespace: &str,
    ) -> Result<Arc<Self>> {
        let id = id.into();
        let bucket = validate_bucket(bucket)?.to_string();
        let store = ScopedStore::new(store, namespace, BUCKET_WATCHER_KIND).with_descriptor(&bucket)?;

        Ok(Arc::new(Self {
            tracker: SnapshotTracker::new(store, bucket.clone())?,
            events: EventRegistry::new(BUCKET_WATCHER_KIND, id.clone()),
            id,
            bucket,
            lister,
        }))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn on(
        &self,
        options: BucketEventOptions,
        handler: Arc<dyn EventHandler<BucketEvent>>,
        id: Option<String>,
    ) -> Result<String> {
        self.events.add_event(options, handler, id)
    }

    /// [`BucketWatcher::on`] with the event type given as a string
    pub fn on_event_type(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler<BucketEvent>>,
        id: Option<String>,
    ) -> Result<String> {
        let event_type = event_type.parse()?;
        self.on(BucketEventOptions { event_type }, handler, id)
    }

    pub fn remove_event(
        &self,
        id: &str,
    ) -> bool {
        self.events.remove_event(id)
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot<ObjectState>> {
        let listing = self.lister.list_objects(&self.bucket).await?;
        listing
            .into_iter()
            .map(|o| ObjectState::try_from(o).map(|s| (s.key.clone(), s)))
            .collect()
    }

    async fn fire(
        &self,
        event_type: BucketEventType,
        payloads: Vec<BucketEvent>,
    ) -> Result<usize> {
        self.events.fire(|o| o.event_type == event_type, &payloads).await
    }
}

#[async_trait]
impl Pollable for BucketWatcher {
    fn name(&self) -> String {
        format!("{}:{}", BUCKET_WATCHER_KIND, self.id)
    }

    async fn on_poll(&self) -> Result<()> {
        let snapshot = self.fetch_snapshot().await?;
        let outcome = self.tracker.observe(snapshot)?;
        let mut failures = TickFailures::default();

        match outcome {
            PollOutcome::Initialized(objects) => {
                info!(bucket = %self.bucket, objects = objects.len(), "bucket initialized");
                failures.record(
                    self.fire(BucketEventType::BucketInitialized, vec![BucketEvent::Objects(objects)])
                        .await,
                )?;
            }
            PollOutcome::Changed { snapshot, diff, .. } => {
                debug!(
                    bucket = %self.bucket,
                    added = diff.additions.len(),
                    modified = diff.modifications.len(),
                    removed = diff.removals.len(),
                    "bucket changed"
                );
                let wrap = |v: Vec<ObjectState>| v.into_iter().map(BucketEvent::Object).collect();

                failures.record(
                    self.fire(BucketEventType::BucketChanged, vec![BucketEvent::Objects(snapshot)])
                        .await,
                )?;
                failures.record(self.fire(BucketEventType::ObjectAdded, wrap(diff.additions)).await)?;
                failures.record(
                    self.fire(BucketEventType::ObjectModified, wrap(diff.modifications))
                        .await,
                )?;
                failures.record(self.fire(BucketEventType::ObjectRemoved, wrap(diff.removals)).await)?;
            }
            PollOutcome::Unchanged(_) => {}
        }

        failures.finish()
    }
}
