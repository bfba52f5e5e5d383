use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Pollable;
use crate::metrics::POLL_FAILURES;
use crate::metrics::POLL_TICKS;
use crate::Error;
use crate::PollerConfig;
use crate::Result;
use crate::ValidationError;

struct Timer {
    watcher: Arc<dyn Pollable>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

fn same_watcher(
    a: &Arc<dyn Pollable>,
    b: &Arc<dyn Pollable>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Drives one timer task per watcher.
///
/// Timers never wait on each other: a slow tick delays only the watcher it
/// belongs to. Stopping a timer prevents future ticks but lets a tick that is
/// already running finish.
pub struct PollScheduler {
    config: PollerConfig,
    shutdown: CancellationToken,
    timers: DashMap<String, Timer>,
}

impl Debug for PollScheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("config", &self.config)
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl PollScheduler {
    pub fn new(
        config: PollerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            shutdown,
            timers: DashMap::new(),
        }
    }

    /// Schedules `watcher` at the configured interval
    pub fn schedule(
        &self,
        watcher: Arc<dyn Pollable>,
    ) -> Result<String> {
        self.schedule_every(watcher, self.config.interval())
    }

    /// Schedules `watcher` every `interval` and returns its timer name.
    ///
    /// Scheduling the same watcher again keeps its running timer. A different
    /// watcher reporting a name that is already scheduled is rejected.
    pub fn schedule_every(
        &self,
        watcher: Arc<dyn Pollable>,
        interval: Duration,
    ) -> Result<String> {
        let name = watcher.name();

        match self.timers.entry(name.clone()) {
            Entry::Occupied(existing) => {
                if !same_watcher(&existing.get().watcher, &watcher) {
                    warn!(watcher = %name, "another watcher already runs under this name");
                    return Err(ValidationError::DuplicateWatcher(name).into());
                }
            }
            Entry::Vacant(slot) => {
                let token = self.shutdown.child_token();
                let start = if self.config.tick_on_start {
                    Instant::now()
                } else {
                    Instant::now() + interval
                };

                info!(watcher = %name, interval_ms = interval.as_millis() as u64, "watcher scheduled");
                let handle = tokio::spawn(run_timer(watcher.clone(), start, interval, token.clone()));
                slot.insert(Timer { watcher, token, handle });
            }
        }

        Ok(name)
    }

    pub fn is_scheduled(
        &self,
        name: &str,
    ) -> bool {
        self.timers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Cancels future ticks of `name`; returns whether it was scheduled
    pub fn stop(
        &self,
        name: &str,
    ) -> bool {
        match self.timers.remove(name) {
            Some((_, timer)) => {
                timer.token.cancel();
                debug!(watcher = %name, "watcher stopped");
                true
            }
            None => false,
        }
    }

    /// Stops every timer and waits for in-flight ticks to finish
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.timers.iter().map(|t| t.key().clone()).collect();
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            if let Some((_, timer)) = self.timers.remove(&name) {
                timer.token.cancel();
                handles.push(timer.handle);
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("poll timer task failed: {:?}", e);
            }
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for timer in self.timers.iter() {
            timer.token.cancel();
        }
    }
}

/// Runs a single tick of `watcher`, counting and logging the outcome.
///
/// The error is returned so a host driving ticks by hand can escalate it.
pub async fn poll_once(watcher: &dyn Pollable) -> Result<()> {
    let name = watcher.name();
    POLL_TICKS.with_label_values(&[name.as_str()]).inc();
    trace!(watcher = %name, "poll tick");

    let result = watcher.on_poll().await;
    match &result {
        Ok(()) => {}
        // Fetch and snapshot succeeded; the registry already counted these
        Err(Error::Handler(e)) => {
            debug!(watcher = %name, failures = e.failures.len(), "poll tick delivered with handler failures");
        }
        Err(e) => {
            POLL_FAILURES.with_label_values(&[name.as_str()]).inc();
            warn!(watcher = %name, "poll tick failed: {:?}", e);
        }
    }
    result
}

async fn run_timer(
    watcher: Arc<dyn Pollable>,
    start: Instant,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(watcher = %watcher.name(), "poll timer cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }

        // Outside the select so cancellation never interrupts a running tick
        let _ = poll_once(watcher.as_ref()).await;
    }
}
