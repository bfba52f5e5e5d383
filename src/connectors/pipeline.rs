use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::validate_pipeline_id;
use super::TickFailures;
use crate::constants::PIPELINES_KEY;
use crate::EventHandler;
use crate::EventRegistry;
use crate::KvStore;
use crate::Pollable;
use crate::ResourceState;
use crate::Result;
use crate::ScopedStore;
use crate::Snapshot;

pub(crate) const PIPELINE_WATCHER_KIND: &str = "PipelineWatcher";

/// Status reported for a job the previous tick did not know about
pub const NEW_JOB_STATUS: &str = "New";

const ACTIVE_STATUSES: [&str; 2] = ["Submitted", "Progressing"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEventOptions {
    pub pipeline_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: String,
    pub status: String,
}

impl ResourceState for PipelineJob {
    fn same_as(
        &self,
        other: &Self,
    ) -> bool {
        self.status == other.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJobUpdate {
    pub job_id: String,
    pub current: PipelineJob,
    pub old: PipelineJob,
}

/// pipeline id -> that pipeline's jobs
pub type PipelineSet = BTreeMap<String, Snapshot<PipelineJob>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PipelineJobLister: Send + Sync + 'static {
    async fn list_jobs_by_pipeline(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineJob>>;
}

/// Reports status transitions of transcoding jobs, per watched pipeline
pub struct PipelineWatcher {
    id: String,
    lister: Arc<dyn PipelineJobLister>,
    store: ScopedStore,
    events: EventRegistry<PipelineEventOptions, PipelineJobUpdate>,
}

impl Debug for PipelineWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PipelineWatcher")
            .field("id", &self.id)
            .field("store", &self.store)
            .field("events", &self.events)
            .finish()
    }
}

impl PipelineWatcher {
    pub fn new(
        id: impl Into<String>,
        lister: Arc<dyn PipelineJobLister>,
        store: Arc<dyn KvStore>,
        namespace: &str,
    ) -> Result<Arc<Self>> {
        let id = id.into();
        let store = ScopedStore::new(store, namespace, PIPELINE_WATCHER_KIND).with_descriptor(&id)?;
        Ok(Arc::new(Self {
            events: EventRegistry::new(PIPELINE_WATCHER_KIND, id.clone()),
            id,
            lister,
            store,
        }))
    }

    pub fn on(
        &self,
        options: PipelineEventOptions,
        handler: Arc<dyn EventHandler<PipelineJobUpdate>>,
        id: Option<String>,
    ) -> Result<String> {
        validate_pipeline_id(&options.pipeline_id)?;
        self.events.add_event(options, handler, id)
    }

    pub fn remove_event(
        &self,
        id: &str,
    ) -> bool {
        self.events.remove_event(id)
    }

    async fn list_pipeline(
        &self,
        pipeline_id: String,
    ) -> Result<(String, Snapshot<PipelineJob>)> {
        let jobs = self.lister.list_jobs_by_pipeline(&pipeline_id).await?;
        Ok((pipeline_id, jobs.into_iter().map(|j| (j.id.clone(), j)).collect()))
    }
}

/// Jobs worth reporting for one pipeline.
///
/// Without a previous listing only jobs still in flight are reported.
pub fn pipeline_updates(
    old: Option<&Snapshot<PipelineJob>>,
    current: &Snapshot<PipelineJob>,
) -> Vec<PipelineJobUpdate> {
    current
        .values()
        .filter(|job| match old {
            Some(old) => old.get(&job.id).map(|o| o.status.as_str()) != Some(job.status.as_str()),
            None => ACTIVE_STATUSES.contains(&job.status.as_str()),
        })
        .map(|job| PipelineJobUpdate {
            job_id: job.id.clone(),
            current: job.clone(),
            old: old.and_then(|o| o.get(&job.id)).cloned().unwrap_or_else(|| PipelineJob {
                id: job.id.clone(),
                status: NEW_JOB_STATUS.to_string(),
            }),
        })
        .collect()
}

#[async_trait]
impl Pollable for PipelineWatcher {
    fn name(&self) -> String {
        format!("{}:{}", PIPELINE_WATCHER_KIND, self.id)
    }

    async fn on_poll(&self) -> Result<()> {
        let ids = self.events.map_events(|o| o.pipeline_id.clone());
        let listings = try_join_all(ids.into_iter().map(|id| self.list_pipeline(id))).await?;
        let fresh: PipelineSet = listings.into_iter().collect();

        let (old, new) = self.store.update_typed(PIPELINES_KEY, None, |_| Ok(fresh.clone()))?;

        let mut failures = TickFailures::default();
        for (pipeline_id, jobs) in &new {
            let previous = old.as_ref().and_then(|o| o.get(pipeline_id));
            let updates = pipeline_updates(previous, jobs);
            if updates.is_empty() {
                continue;
            }
            debug!(watcher = %self.id, pipeline_id = %pipeline_id, updates = updates.len(), "pipeline jobs changed");
            failures.record(
                self.events
                    .fire(|o| &o.pipeline_id == pipeline_id, &updates)
                    .await,
            )?;
        }
        failures.finish()
    }
}
