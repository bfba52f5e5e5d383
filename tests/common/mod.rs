use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use d_poll::EventHandler;
use d_poll::InvokeResponse;
use d_poll::RemoteInvoker;
use d_poll::Result;
use d_poll::Runtime;
use d_poll::Settings;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn runtime() -> Runtime {
    let mut settings = Settings::default();
    settings.poller.interval_ms = 20;
    settings.poller.tick_on_start = true;
    settings.dispatcher.invoke_timeout_ms = 2_000;
    Runtime::builder(settings).build().expect("runtime should build")
}

/// Remote function stand-in: `{"fail": true}` fails with inner status 500,
/// everything else echoes the payload back in the body.
pub struct EchoFunction {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl EchoFunction {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteInvoker for EchoFunction {
    async fn invoke(
        &self,
        _target: &str,
        payload: &Value,
    ) -> Result<InvokeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = if payload.get("fail").and_then(Value::as_bool) == Some(true) {
            json!({"statusCode": 500, "errorMessage": "function crashed"})
        } else {
            json!({"statusCode": 200, "body": json!({"echo": payload}).to_string()})
        };
        Ok(InvokeResponse::ok(reply.to_string()))
    }
}

/// Forwards events into a channel
pub struct Forward<E> {
    tx: mpsc::UnboundedSender<E>,
}

pub fn forward<E: Clone + Send + Sync + 'static>() -> (Arc<Forward<E>>, mpsc::UnboundedReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Forward { tx }), rx)
}

#[async_trait]
impl<E: Clone + Send + Sync + 'static> EventHandler<E> for Forward<E> {
    async fn handle(
        &self,
        event: &E,
    ) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| d_poll::Error::Fatal("receiver dropped".to_string()))
    }
}
