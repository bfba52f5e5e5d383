use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use nanoid::nanoid;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::interpret_response;
use super::ClaimedJob;
use super::Queue;
use super::QueueSet;
use super::RemoteInvoker;
use super::Resolution;
use crate::constants::QUEUES_KEY;
use crate::constants::QUEUE_CONCURRENCY_LIMIT;
use crate::constants::QUEUE_ID_LEN;
use crate::metrics::ACTIVE_INVOCATIONS;
use crate::metrics::QUEUES_COMPLETED;
use crate::metrics::REMOTE_INVOCATIONS;
use crate::validate_target_name;
use crate::DispatcherConfig;
use crate::Error;
use crate::EventHandler;
use crate::EventRegistry;
use crate::KvStore;
use crate::Result;
use crate::ScopedStore;
use crate::SystemError;
use crate::ValidationError;

pub(crate) const DISPATCHER_KIND: &str = "QueueDispatcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatcherEventType {
    QueueComplete,
}

impl FromStr for DispatcherEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "QueueComplete" => Ok(DispatcherEventType::QueueComplete),
            other => Err(ValidationError::InvalidEventType(other.to_string()).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherEventOptions {
    pub event_type: DispatcherEventType,
}

/// Terminal state of a queue, fired once when its last payload completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueCompleteEvent {
    pub queue_id: String,
    pub target: String,
    pub payloads: Vec<Value>,
    /// One entry per payload, in payload order
    pub resolutions: Vec<Resolution>,
}

impl From<Queue> for QueueCompleteEvent {
    fn from(queue: Queue) -> Self {
        Self {
            resolutions: queue
                .resolutions
                .into_iter()
                .map(|r| r.unwrap_or_else(|| Resolution::Failure("unresolved".to_string())))
                .collect(),
            queue_id: queue.id,
            target: queue.target,
            payloads: queue.payloads,
        }
    }
}

/// Result of one invocation waiting to be written into its queue
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JobOutcome {
    pub queue_id: String,
    pub index: usize,
    pub resolution: Resolution,
}

/// Writes `outcome` into its queue. Returns `false` when nothing changed.
pub(crate) fn record_outcome(
    queues: &mut QueueSet,
    outcome: &JobOutcome,
) -> bool {
    let Some(queue) = queues.get_mut(&outcome.queue_id) else {
        warn!(queue_id = %outcome.queue_id, index = outcome.index, "queue no longer tracked, job result discarded");
        return false;
    };

    if !queue.on_job_done(outcome.index, outcome.resolution.clone()) {
        warn!(
            queue_id = %outcome.queue_id,
            index = outcome.index,
            status = ?queue.statuses.get(outcome.index),
            "job is not running, result discarded"
        );
        return false;
    }
    true
}

/// Fans batches of payloads out to a remote target under a concurrency ceiling.
///
/// All queue state lives in one persisted record mutated only through atomic
/// store updates: drain cycles may run redundantly and concurrently, a payload
/// is never claimed twice, and each queue fires exactly one
/// [`QueueCompleteEvent`].
pub struct QueueDispatcher {
    id: String,
    store: ScopedStore,
    invoker: Arc<dyn RemoteInvoker>,
    events: EventRegistry<DispatcherEventOptions, QueueCompleteEvent>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
    /// Results whose write kept failing; applied by the next drain cycle
    unrecorded: Mutex<Vec<JobOutcome>>,
}

impl Debug for QueueDispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("id", &self.id)
            .field("store", &self.store)
            .field("events", &self.events)
            .field("unrecorded", &self.unrecorded.lock().len())
            .finish()
    }
}

impl QueueDispatcher {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn KvStore>,
        namespace: &str,
        invoker: Arc<dyn RemoteInvoker>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>> {
        let id = id.into();
        let store = ScopedStore::new(store, namespace, DISPATCHER_KIND).with_descriptor(&id)?;
        Ok(Arc::new(Self {
            events: EventRegistry::new(DISPATCHER_KIND, id.clone()),
            id,
            store,
            invoker,
            config,
            shutdown,
            unrecorded: Mutex::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // ====================================================================
    // Subscriptions

    pub fn on(
        &self,
        options: DispatcherEventOptions,
        handler: Arc<dyn EventHandler<QueueCompleteEvent>>,
        id: Option<String>,
    ) -> Result<String> {
        self.events.add_event(options, handler, id)
    }

    /// [`QueueDispatcher::on`] with the event type given as a string
    pub fn on_event_type(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler<QueueCompleteEvent>>,
        id: Option<String>,
    ) -> Result<String> {
        let event_type = event_type.parse()?;
        self.on(DispatcherEventOptions { event_type }, handler, id)
    }

    pub fn remove_event(
        &self,
        id: &str,
    ) -> bool {
        self.events.remove_event(id)
    }

    // ====================================================================
    // Invocation

    /// Persists a new queue and schedules a drain cycle without waiting on it.
    ///
    /// `max_concurrent` defaults to `dispatcher.default_max_concurrent` and must
    /// be within `1..=100`; a value above the payload count is clamped down.
    pub async fn enqueue(
        self: &Arc<Self>,
        target: &str,
        payloads: Vec<Value>,
        max_concurrent: Option<usize>,
    ) -> Result<String> {
        if self.shutdown.is_cancelled() {
            return Err(SystemError::ShutDown.into());
        }
        validate_target_name(target)?;

        let requested = max_concurrent.unwrap_or(self.config.default_max_concurrent);
        if requested == 0 || requested > QUEUE_CONCURRENCY_LIMIT {
            return Err(ValidationError::InvalidConcurrency {
                value: requested,
                limit: QUEUE_CONCURRENCY_LIMIT,
            }
            .into());
        }

        let queue = Queue::new(nanoid!(QUEUE_ID_LEN), target, payloads, requested);
        let queue_id = queue.id.clone();
        info!(
            dispatcher = %self.id,
            queue_id = %queue_id,
            function = %target,
            payloads = queue.len(),
            ceiling = queue.max_concurrent,
            "queue created"
        );

        self.store
            .update_typed(QUEUES_KEY, Some(QueueSet::new()), |queues| {
                let mut queues = queues.unwrap_or_default();
                queues.insert(queue_id.clone(), queue.clone());
                Ok(queues)
            })?;

        self.schedule_drain();
        Ok(queue_id)
    }

    /// Single-payload flavour of [`QueueDispatcher::enqueue`]
    pub async fn enqueue_one(
        self: &Arc<Self>,
        target: &str,
        payload: Value,
        max_concurrent: Option<usize>,
    ) -> Result<String> {
        self.enqueue(target, vec![payload], max_concurrent).await
    }

    /// Invokes `target` once and interprets the reply.
    pub async fn invoke(
        &self,
        target: &str,
        payload: &Value,
    ) -> Result<Value> {
        validate_target_name(target)?;
        let response = self.invoker.invoke(target, payload).await?;
        let value = interpret_response(target, &response)?;
        Ok(value)
    }

    /// Queues still tracked by this dispatcher
    pub fn pending_queues(&self) -> Result<Vec<Queue>> {
        let queues: Option<QueueSet> = self.store.get_typed(QUEUES_KEY)?;
        Ok(queues.unwrap_or_default().into_values().collect())
    }

    /// Stops scheduling drain cycles. In-flight invocations still complete.
    pub fn shutdown(&self) {
        info!(dispatcher = %self.id, "dispatcher shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ====================================================================
    // Drain cycle

    fn schedule_drain(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            trace!(dispatcher = %self.id, "drain skipped after shutdown");
            return;
        }
        let this = self.clone();
        tokio::spawn(async move { this.drain_until_recorded().await });
    }

    /// Drains once. While parked results are waiting and the drain keeps
    /// failing, retries with backoff so their queues still complete.
    async fn drain_until_recorded(self: Arc<Self>) {
        let mut attempt = 0;
        loop {
            let Err(e) = self.drain().await else {
                return;
            };
            error!(dispatcher = %self.id, "drain cycle failed: {:?}", e);

            if self.unrecorded.lock().is_empty() || attempt >= self.config.record_max_retries {
                return;
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = sleep(self.config.record_backoff(attempt)) => {}
            }
            attempt += 1;
        }
    }

    /// Runs one drain cycle and returns the number of payloads it claimed.
    ///
    /// Completed queues are removed and pending payloads claimed in the same
    /// atomic update. Safe to call at any time; with nothing to claim or
    /// complete it is a no-op.
    pub async fn drain(self: &Arc<Self>) -> Result<usize> {
        let claim = !self.shutdown.is_cancelled();
        let parked: Vec<JobOutcome> = self.unrecorded.lock().clone();
        let mut jobs: Vec<ClaimedJob> = Vec::new();
        let mut completed: Vec<Queue> = Vec::new();

        self.store
            .update_typed(QUEUES_KEY, Some(QueueSet::new()), |queues| {
                // The store may retry this closure
                jobs.clear();
                completed.clear();

                let mut queues = queues.unwrap_or_default();
                for outcome in &parked {
                    record_outcome(&mut queues, outcome);
                }
                let done: Vec<String> = queues
                    .values()
                    .filter(|q| q.is_complete())
                    .map(|q| q.id.clone())
                    .collect();
                for id in done {
                    if let Some(queue) = queues.remove(&id) {
                        completed.push(queue);
                    }
                }

                if claim {
                    for queue in queues.values_mut() {
                        jobs.extend(queue.claim_all());
                    }
                }
                Ok(queues)
            })?;

        if !parked.is_empty() {
            self.unrecorded.lock().retain(|o| !parked.contains(o));
            info!(dispatcher = %self.id, applied = parked.len(), "parked job results recorded");
        }

        let claimed = jobs.len();
        if claimed > 0 {
            debug!(dispatcher = %self.id, claimed, "jobs claimed");
        }
        for job in jobs {
            let this = self.clone();
            tokio::spawn(async move { this.run_job(job).await });
        }

        if !completed.is_empty() {
            self.fire_completed(completed).await;
        }

        Ok(claimed)
    }

    async fn fire_completed(
        &self,
        completed: Vec<Queue>,
    ) {
        QUEUES_COMPLETED.inc_by(completed.len() as u64);
        let events: Vec<QueueCompleteEvent> = completed
            .into_iter()
            .inspect(|q| info!(dispatcher = %self.id, queue_id = %q.id, "queue complete"))
            .map(QueueCompleteEvent::from)
            .collect();

        if let Err(e) = self
            .events
            .fire(|o| o.event_type == DispatcherEventType::QueueComplete, &events)
            .await
        {
            warn!(dispatcher = %self.id, "queue completion handlers failed: {}", e);
        }
    }

    async fn run_job(
        self: Arc<Self>,
        job: ClaimedJob,
    ) {
        trace!(queue_id = %job.queue_id, index = job.index, function = %job.target, "starting job");

        ACTIVE_INVOCATIONS.inc();
        let result = match self.invoker.invoke(&job.target, &job.payload).await {
            Ok(response) => interpret_response(&job.target, &response).map_err(Error::from),
            Err(e) => Err(e),
        };
        ACTIVE_INVOCATIONS.dec();
        let resolution = Resolution::from(result);

        let label = if resolution.is_success() { "success" } else { "failure" };
        REMOTE_INVOCATIONS.with_label_values(&[label]).inc();
        if let Resolution::Failure(detail) = &resolution {
            debug!(queue_id = %job.queue_id, index = job.index, "job failed: {}", detail);
        }

        let outcome = JobOutcome {
            queue_id: job.queue_id,
            index: job.index,
            resolution,
        };
        if let Err(e) = self.record(&outcome).await {
            error!(
                queue_id = %outcome.queue_id,
                index = outcome.index,
                "failed to record job result, parking it for the next drain: {:?}",
                e
            );
            self.unrecorded.lock().push(outcome);
        }

        self.schedule_drain();
    }

    /// Writes one job result, retrying failed store updates with backoff
    async fn record(
        &self,
        outcome: &JobOutcome,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            let result = self.store.update_typed(QUEUES_KEY, Some(QueueSet::new()), |queues| {
                let mut queues = queues.unwrap_or_default();
                record_outcome(&mut queues, outcome);
                Ok(queues)
            });

            match result {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.config.record_max_retries => {
                    let backoff = self.config.record_backoff(attempt);
                    warn!(
                        queue_id = %outcome.queue_id,
                        index = outcome.index,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "job result write failed, retrying: {:?}",
                        e
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
