use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::constants::QUEUE_CONCURRENCY_LIMIT;
use crate::Result;

/// Every in-flight queue of one dispatcher, keyed by queue id
pub type QueueSet = BTreeMap<String, Queue>;

/// Per-payload progress; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
}

/// Outcome of one payload's invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Resolution {
    Success(Value),
    Failure(String),
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        matches!(self, Resolution::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

impl From<Result<Value>> for Resolution {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(v) => Resolution::Success(v),
            Err(e) => Resolution::Failure(e.to_string()),
        }
    }
}

/// One payload claimed by a drain cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub queue_id: String,
    pub target: String,
    pub index: usize,
    pub payload: Value,
}

/// One dispatch batch.
///
/// Invariants: `active <= max_concurrent <= QUEUE_CONCURRENCY_LIMIT`,
/// `complete <= payloads.len()`, and each status goes
/// `Pending -> Running -> Complete` exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub target: String,
    pub payloads: Vec<Value>,
    pub active: usize,
    pub complete: usize,
    pub statuses: Vec<JobStatus>,
    pub resolutions: Vec<Option<Resolution>>,
    /// Effective ceiling: `min(payloads.len(), requested, QUEUE_CONCURRENCY_LIMIT)`
    pub max_concurrent: usize,
}

impl Queue {
    pub fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        payloads: Vec<Value>,
        max_concurrent: usize,
    ) -> Self {
        let len = payloads.len();
        Self {
            id: id.into(),
            target: target.into(),
            active: 0,
            complete: 0,
            statuses: vec![JobStatus::Pending; len],
            resolutions: vec![None; len],
            max_concurrent: len.min(max_concurrent).min(QUEUE_CONCURRENCY_LIMIT),
            payloads,
        }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.complete == self.payloads.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.active < self.max_concurrent
    }

    /// Claims the first pending payload if a slot is free
    pub fn next_job(&mut self) -> Option<ClaimedJob> {
        if self.is_complete() || !self.has_capacity() {
            return None;
        }

        let index = self.statuses.iter().position(|s| *s == JobStatus::Pending)?;
        self.statuses[index] = JobStatus::Running;
        self.active += 1;

        Some(ClaimedJob {
            queue_id: self.id.clone(),
            target: self.target.clone(),
            index,
            payload: self.payloads[index].clone(),
        })
    }

    /// Claims pending payloads until the ceiling is reached
    pub fn claim_all(&mut self) -> Vec<ClaimedJob> {
        std::iter::from_fn(|| self.next_job()).collect()
    }

    /// Records the outcome of a running payload.
    ///
    /// Returns `false` and changes nothing when the payload is not running.
    pub fn on_job_done(
        &mut self,
        index: usize,
        resolution: Resolution,
    ) -> bool {
        if self.statuses.get(index) != Some(&JobStatus::Running) {
            return false;
        }

        self.statuses[index] = JobStatus::Complete;
        self.resolutions[index] = Some(resolution);
        self.complete += 1;
        self.active -= 1;
        true
    }
}
