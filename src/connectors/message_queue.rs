use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use super::TickFailures;
use crate::EventHandler;
use crate::EventRegistry;
use crate::Pollable;
use crate::Result;
use crate::ValidationError;

pub(crate) const MESSAGE_QUEUE_WATCHER_KIND: &str = "MessageQueueWatcher";

fn default_delete_after_receive() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQueueEventOptions {
    pub queue_url: String,
    #[serde(default = "default_delete_after_receive")]
    pub delete_after_receive: bool,
}

impl MessageQueueEventOptions {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            delete_after_receive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageQueueClient: Send + Sync + 'static {
    async fn receive_messages(
        &self,
        queue_url: &str,
    ) -> Result<Vec<QueueMessage>>;

    async fn delete_messages(
        &self,
        queue_url: &str,
        messages: &[QueueMessage],
    ) -> Result<()>;
}

/// Delivers messages received from remote queues.
///
/// No snapshot is kept: a received message is the event.
pub struct MessageQueueWatcher {
    id: String,
    client: Arc<dyn MessageQueueClient>,
    events: EventRegistry<MessageQueueEventOptions, QueueMessage>,
}

impl Debug for MessageQueueWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MessageQueueWatcher")
            .field("id", &self.id)
            .field("events", &self.events)
            .finish()
    }
}

impl MessageQueueWatcher {
    pub fn new(
        id: impl Into<String>,
        client: Arc<dyn MessageQueueClient>,
    ) -> Arc<Self> {
        let id = id.into();
        Arc::new(Self {
            events: EventRegistry::new(MESSAGE_QUEUE_WATCHER_KIND, id.clone()),
            id,
            client,
        })
    }

    /// Subscribes to one queue. The default id is
    /// `message-queue/<queue_url>/<watcher id>`.
    pub fn on(
        &self,
        options: MessageQueueEventOptions,
        handler: Arc<dyn EventHandler<QueueMessage>>,
        id: Option<String>,
    ) -> Result<String> {
        if options.queue_url.trim().is_empty() {
            return Err(ValidationError::InvalidDescriptor("queue url is empty".to_string()).into());
        }
        let id = id.unwrap_or_else(|| format!("message-queue/{}/{}", options.queue_url, self.id));
        self.events.add_event(options, handler, Some(id))
    }

    pub fn remove_event(
        &self,
        id: &str,
    ) -> bool {
        self.events.remove_event(id)
    }

    /// Distinct queue urls, acknowledging when any subscriber asks for it
    fn watched_queues(&self) -> BTreeMap<String, bool> {
        let mut queues = BTreeMap::new();
        for (url, delete) in self
            .events
            .map_events(|o| (o.queue_url.clone(), o.delete_after_receive))
        {
            *queues.entry(url).or_insert(false) |= delete;
        }
        queues
    }
}

#[async_trait]
impl Pollable for MessageQueueWatcher {
    fn name(&self) -> String {
        format!("{}:{}", MESSAGE_QUEUE_WATCHER_KIND, self.id)
    }

    async fn on_poll(&self) -> Result<()> {
        let mut failures = TickFailures::default();

        for (queue_url, delete_after_receive) in self.watched_queues() {
            let messages = match self.client.receive_messages(&queue_url).await {
                Ok(messages) => messages,
                Err(e) => {
                    failures.fetch_failed(&queue_url, e);
                    continue;
                }
            };
            if messages.is_empty() {
                trace!(watcher = %self.id, queue_url = %queue_url, "no new message");
                continue;
            }
            debug!(watcher = %self.id, queue_url = %queue_url, received = messages.len(), "messages received");

            // Undeleted messages come back on a later receive
            if delete_after_receive {
                if let Err(e) = self.client.delete_messages(&queue_url, &messages).await {
                    failures.fetch_failed(&queue_url, e);
                    continue;
                }
            }
            failures.record(self.events.fire(|o| o.queue_url == queue_url, &messages).await)?;
        }
        failures.finish()
    }
}
