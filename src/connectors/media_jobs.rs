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

use super::TickFailures;
use crate::constants::JOBS_KEY;
use crate::Error;
use crate::EventHandler;
use crate::EventRegistry;
use crate::KvStore;
use crate::PollOutcome;
use crate::Pollable;
use crate::ResourceState;
use crate::Result;
use crate::ScopedStore;
use crate::SnapshotTracker;
use crate::ValidationError;

pub(crate) const MEDIA_JOB_WATCHER_KIND: &str = "MediaJobWatcher";

pub const UNKNOWN_JOB_STATUS: &str = "UNKNOWN";
pub const CREATED_JOB_STATUS: &str = "NEW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaJobEventType {
    JobStatusChanged,
}

impl FromStr for MediaJobEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "JobStatusChanged" => Ok(Self::JobStatusChanged),
            other => Err(ValidationError::InvalidEventType(other.to_string()).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaJobEventOptions {
    pub event_type: MediaJobEventType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaJob {
    pub id: String,
    pub status: Option<String>,
}

impl MediaJob {
    fn with_status(
        id: &str,
        status: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            status: Some(status.to_string()),
        }
    }
}

impl ResourceState for MediaJob {
    fn same_as(
        &self,
        other: &Self,
    ) -> bool {
        self.status == other.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusChange {
    pub job_id: String,
    pub old: MediaJob,
    pub current: MediaJob,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaJobLister: Send + Sync + 'static {
    async fn list_jobs(&self) -> Result<Vec<MediaJob>>;
}

/// Fires a [`JobStatusChange`] whenever a media job changes status
pub struct MediaJobWatcher {
    id: String,
    lister: Arc<dyn MediaJobLister>,
    tracker: SnapshotTracker<MediaJob>,
    events: EventRegistry<MediaJobEventOptions, JobStatusChange>,
}

impl Debug for MediaJobWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MediaJobWatcher")
            .field("id", &self.id)
            .field("tracker", &self.tracker)
            .field("events", &self.events)
            .finish()
    }
}

impl MediaJobWatcher {
    pub fn new(
        id: impl Into<String>,
        lister: Arc<dyn MediaJobLister>,
        store: Arc<dyn KvStore>,
        namespace: &str,
    ) -> Result<Arc<Self>> {
        let id = id.into();
        let store = ScopedStore::new(store, namespace, MEDIA_JOB_WATCHER_KIND).with_descriptor(&id)?;
        Ok(Arc::new(Self {
            tracker: SnapshotTracker::new(store, JOBS_KEY)?,
            events: EventRegistry::new(MEDIA_JOB_WATCHER_KIND, id.clone()),
            id,
            lister,
        }))
    }

    pub fn on(
        &self,
        options: MediaJobEventOptions,
        handler: Arc<dyn EventHandler<JobStatusChange>>,
        id: Option<String>,
    ) -> Result<String> {
        self.events.add_event(options, handler, id)
    }

    pub fn on_event_type(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler<JobStatusChange>>,
        id: Option<String>,
    ) -> Result<String> {
        let event_type = event_type.parse()?;
        self.on(MediaJobEventOptions { event_type }, handler, id)
    }

    pub fn remove_event(
        &self,
        id: &str,
    ) -> bool {
        self.events.remove_event(id)
    }

    /// Announces a job the application just created and starts tracking it,
    /// so the next tick only reports transitions after creation.
    pub async fn track_created_job(
        &self,
        job: MediaJob,
    ) -> Result<()> {
        if job.id.is_empty() {
            return Err(ValidationError::InvalidRemoteEntry("media job without id".to_string()).into());
        }
        info!(watcher = %self.id, job_id = %job.id, "tracking created job");

        let change = JobStatusChange {
            job_id: job.id.clone(),
            old: MediaJob::with_status(&job.id, CREATED_JOB_STATUS),
            current: job.clone(),
        };
        let fired = self.fire(vec![change]).await;
        let id = job.id.clone();
        self.tracker.merge(&id, job)?;
        fired.map(|_| ())
    }

    async fn fire(
        &self,
        changes: Vec<JobStatusChange>,
    ) -> Result<usize> {
        self.events
            .fire(|o| o.event_type == MediaJobEventType::JobStatusChanged, &changes)
            .await
    }
}

#[async_trait]
impl Pollable for MediaJobWatcher {
    fn name(&self) -> String {
        format!("{}:{}", MEDIA_JOB_WATCHER_KIND, self.id)
    }

    async fn on_poll(&self) -> Result<()> {
        let jobs = self.lister.list_jobs().await?;
        let fresh = jobs.into_iter().map(|j| (j.id.clone(), j)).collect();

        let (previous, diff) = match self.tracker.observe(fresh)? {
            PollOutcome::Changed { previous, diff, .. } => (previous, diff),
            PollOutcome::Initialized(jobs) => {
                debug!(watcher = %self.id, jobs = jobs.len(), "media jobs initialized");
                return Ok(());
            }
            PollOutcome::Unchanged(_) => return Ok(()),
        };

        // A new job that reports no status yet is not a transition
        let changes: Vec<JobStatusChange> = diff
            .additions
            .into_iter()
            .chain(diff.modifications)
            .filter(|job| previous.get(&job.id).and_then(|o| o.status.as_ref()) != job.status.as_ref())
            .map(|job| JobStatusChange {
                job_id: job.id.clone(),
                old: previous
                    .get(&job.id)
                    .cloned()
                    .unwrap_or_else(|| MediaJob::with_status(&job.id, UNKNOWN_JOB_STATUS)),
                current: job,
            })
            .collect();

        if changes.is_empty() {
            return Ok(());
        }
        debug!(watcher = %self.id, changes = changes.len(), "media job status changed");

        let mut failures = TickFailures::default();
        failures.record(self.fire(changes).await)?;
        failures.finish()
    }
}
