use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Error;
use crate::EventHandler;
use crate::Result;

type FailWhen<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Records every event it receives, optionally failing on some of them
pub struct RecordingHandler<E> {
    events: Mutex<Vec<E>>,
    fail_when: Option<FailWhen<E>>,
}

impl<E: Clone + Send + Sync + 'static> RecordingHandler<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            fail_when: None,
        })
    }

    pub fn failing_on(f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            fail_when: Some(Box::new(f)),
        })
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl<E: Clone + Send + Sync + 'static> EventHandler<E> for RecordingHandler<E> {
    async fn handle(
        &self,
        event: &E,
    ) -> Result<()> {
        if let Some(fail_when) = &self.fail_when {
            if fail_when(event) {
                return Err(Error::Fatal("handler rejected event".to_string()));
            }
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards every event into a channel so tests can await deliveries
pub struct ChannelHandler<E> {
    tx: tokio::sync::mpsc::UnboundedSender<E>,
}

impl<E: Clone + Send + Sync + 'static> ChannelHandler<E> {
    pub fn new() -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl<E: Clone + Send + Sync + 'static> EventHandler<E> for ChannelHandler<E> {
    async fn handle(
        &self,
        event: &E,
    ) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| Error::Fatal("receiver dropped".to_string()))
    }
}
