use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;

use crate::InvokeResponse;
use crate::RemoteInvoker;
use crate::Result;

/// Fake remote target.
///
/// A payload `{"fail": true}` gets an inner status 500, every other payload
/// gets status 200 with a body echoing it. Tracks how many calls were in
/// flight at once.
pub struct ScriptedInvoker {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedInvoker {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        target: &str,
        payload: &Value,
    ) -> Result<InvokeResponse> {
        self.calls.lock().push((target.to_string(), payload.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let body = if payload.get("fail").and_then(Value::as_bool) == Some(true) {
            json!({"statusCode": 500, "errorMessage": "boom"})
        } else {
            json!({"statusCode": 200, "body": json!({"echo": payload}).to_string()})
        };
        Ok(InvokeResponse::ok(body.to_string()))
    }
}
