use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::RuntimeBuilder;
use crate::BucketWatcher;
use crate::KvStore;
use crate::MediaJobLister;
use crate::MediaJobWatcher;
use crate::MessageQueueClient;
use crate::MessageQueueWatcher;
use crate::ObjectLister;
use crate::PipelineJobLister;
use crate::PipelineWatcher;
use crate::PollScheduler;
use crate::Pollable;
use crate::QueueDispatcher;
use crate::RemoteInvoker;
use crate::Result;
use crate::Settings;
use crate::SystemError;
use crate::TimeoutInvoker;

/// Owns everything that must outlive individual watchers and dispatchers.
///
/// Dropping the runtime cancels every timer; [`Runtime::shutdown`] also waits
/// for ticks in flight and flushes the store.
pub struct Runtime {
    settings: Settings,
    store: Arc<dyn KvStore>,
    scheduler: PollScheduler,
    dispatchers: DashMap<String, Arc<QueueDispatcher>>,
    shutdown: CancellationToken,
}

impl Debug for Runtime {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.settings)
            .field("scheduler", &self.scheduler)
            .field("dispatchers", &self.dispatchers.len())
            .finish()
    }
}

impl Runtime {
    pub fn builder(settings: Settings) -> RuntimeBuilder {
        RuntimeBuilder::new(settings)
    }

    pub(super) fn new(
        settings: Settings,
        store: Arc<dyn KvStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scheduler: PollScheduler::new(settings.poller.clone(), shutdown.child_token()),
            settings,
            store,
            dispatchers: DashMap::new(),
            shutdown,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    pub fn namespace(&self) -> &str {
        &self.settings.storage.namespace
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(SystemError::ShutDown.into());
        }
        Ok(())
    }

    // ====================================================================
    // Watchers

    /// Ticks `watcher` at the configured interval; returns its timer name.
    ///
    /// Fails when a different watcher already runs under the same name.
    pub fn watch(
        &self,
        watcher: Arc<dyn Pollable>,
    ) -> Result<String> {
        self.ensure_running()?;
        self.scheduler.schedule(watcher)
    }

    pub fn unwatch(
        &self,
        name: &str,
    ) -> bool {
        self.scheduler.stop(name)
    }

    pub fn is_watching(
        &self,
        name: &str,
    ) -> bool {
        self.scheduler.is_scheduled(name)
    }

    pub fn bucket_watcher(
        &self,
        id: &str,
        bucket: &str,
        lister: Arc<dyn ObjectLister>,
    ) -> Result<Arc<BucketWatcher>> {
        let watcher = BucketWatcher::new(id, bucket, lister, self.store(), self.namespace())?;
        self.watch(watcher.clone())?;
        Ok(watcher)
    }

    pub fn pipeline_watcher(
        &self,
        id: &str,
        lister: Arc<dyn PipelineJobLister>,
    ) -> Result<Arc<PipelineWatcher>> {
        let watcher = PipelineWatcher::new(id, lister, self.store(), self.namespace())?;
        self.watch(watcher.clone())?;
        Ok(watcher)
    }

    pub fn media_job_watcher(
        &self,
        id: &str,
        lister: Arc<dyn MediaJobLister>,
    ) -> Result<Arc<MediaJobWatcher>> {
        let watcher = MediaJobWatcher::new(id, lister, self.store(), self.namespace())?;
        self.watch(watcher.clone())?;
        Ok(watcher)
    }

    pub fn message_queue_watcher(
        &self,
        id: &str,
        client: Arc<dyn MessageQueueClient>,
    ) -> Result<Arc<MessageQueueWatcher>> {
        let watcher = MessageQueueWatcher::new(id, client);
        self.watch(watcher.clone())?;
        Ok(watcher)
    }

    // ====================================================================
    // Dispatchers

    /// Returns the dispatcher registered under `id`, creating it on first use.
    ///
    /// Calls through `invoker` are bounded by `dispatcher.invoke_timeout_ms`.
    /// A dispatcher created earlier keeps its original invoker.
    pub fn dispatcher(
        &self,
        id: &str,
        invoker: Arc<dyn RemoteInvoker>,
    ) -> Result<Arc<QueueDispatcher>> {
        self.ensure_running()?;
        if let Some(existing) = self.dispatchers.get(id) {
            return Ok(existing.clone());
        }

        let timeout = Duration::from_millis(self.settings.dispatcher.invoke_timeout_ms);
        let dispatcher = QueueDispatcher::new(
            id,
            self.store(),
            self.namespace(),
            Arc::new(TimeoutInvoker::new(invoker, timeout)),
            self.settings.dispatcher.clone(),
            self.shutdown.child_token(),
        )?;

        Ok(self
            .dispatchers
            .entry(id.to_string())
            .or_insert(dispatcher)
            .clone())
    }

    // ====================================================================
    // Lifecycle

    /// Stops every timer and dispatcher, waits for in-flight ticks and
    /// flushes the store. Invocations already issued still complete.
    pub async fn shutdown(&self) {
        info!("runtime shutting down");
        self.shutdown.cancel();
        self.scheduler.stop_all().await;
        for dispatcher in self.dispatchers.iter() {
            dispatcher.shutdown();
        }
        if let Err(e) = self.store.flush() {
            warn!("store flush on shutdown failed: {:?}", e);
        }
    }
}
