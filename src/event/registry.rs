use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::EventHandler;
use crate::hash::descriptor_digest;
use crate::metrics::EVENTS_FIRED;
use crate::metrics::HANDLER_FAILURES;
use crate::HandlerError;
use crate::HandlerFailure;
use crate::Result;

/// A registered (descriptor, handler) pair
pub struct Subscription<D, E> {
    pub id: String,
    pub descriptor: D,
    handler: Arc<dyn EventHandler<E>>,
}

impl<D: Debug, E> Debug for Subscription<D, E> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Active subscriptions of one watcher or dispatcher.
///
/// The registry lives exactly as long as its owner. `kind` and `owner_id` take
/// part in generated subscription ids so two owners never share an id.
pub struct EventRegistry<D, E> {
    kind: String,
    owner_id: String,
    subscriptions: DashMap<String, Arc<Subscription<D, E>>>,
}

impl<D, E> Debug for EventRegistry<D, E> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("kind", &self.kind)
            .field("owner_id", &self.owner_id)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl<D, E> EventRegistry<D, E>
where
    D: Serialize + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(
        kind: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            owner_id: owner_id.into(),
            subscriptions: DashMap::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Registers `handler` and returns the subscription id.
    ///
    /// Without an explicit id, the id is `<kind>:<digest(descriptor)>:<owner>`,
    /// so subscribing twice with the same descriptor yields the same id. An id
    /// that is already registered keeps its original subscription.
    pub fn add_event(
        &self,
        descriptor: D,
        handler: Arc<dyn EventHandler<E>>,
        id: Option<String>,
    ) -> Result<String> {
        let id = match id {
            Some(id) => id,
            None => format!(
                "{}:{}:{}",
                self.kind,
                descriptor_digest(&descriptor)?,
                self.owner_id
            ),
        };

        self.subscriptions.entry(id.clone()).or_insert_with(|| {
            debug!(subscription_id = %id, kind = %self.kind, "subscription added");
            Arc::new(Subscription {
                id: id.clone(),
                descriptor,
                handler,
            })
        });

        Ok(id)
    }

    /// Returns whether a subscription was removed; unknown ids are a no-op
    pub fn remove_event(
        &self,
        id: &str,
    ) -> bool {
        let removed = self.subscriptions.remove(id).is_some();
        if removed {
            debug!(subscription_id = %id, kind = %self.kind, "subscription removed");
        }
        removed
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.subscriptions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clear(&self) {
        self.subscriptions.clear();
    }

    /// Distinct values of `f` over every active descriptor
    pub fn map_events<T, F>(
        &self,
        f: F,
    ) -> BTreeSet<T>
    where
        T: Ord,
        F: Fn(&D) -> T,
    {
        self.subscriptions.iter().map(|s| f(&s.descriptor)).collect()
    }

    /// Delivers `payloads` to every subscription matching `predicate`.
    ///
    /// Returns the number of matching subscriptions. Each subscription receives
    /// the payloads sequentially; a failing handler stops its own loop without
    /// affecting the others, and all failures are reported together.
    pub async fn fire<P>(
        &self,
        predicate: P,
        payloads: &[E],
    ) -> Result<usize>
    where
        P: Fn(&D) -> bool,
    {
        // Snapshot matches first: no map guard may be held across an await
        let matched: Vec<Arc<Subscription<D, E>>> = self
            .subscriptions
            .iter()
            .filter(|s| predicate(&s.descriptor))
            .map(|s| s.value().clone())
            .collect();

        if matched.is_empty() || payloads.is_empty() {
            trace!(kind = %self.kind, matched = matched.len(), "nothing to deliver");
            return Ok(matched.len());
        }

        let deliveries = matched.iter().map(|sub| self.deliver(sub, payloads));
        let failures: Vec<HandlerFailure> = join_all(deliveries).await.into_iter().flatten().collect();

        if failures.is_empty() {
            Ok(matched.len())
        } else {
            Err(HandlerError { failures }.into())
        }
    }

    async fn deliver(
        &self,
        sub: &Subscription<D, E>,
        payloads: &[E],
    ) -> Option<HandlerFailure> {
        for (index, payload) in payloads.iter().enumerate() {
            EVENTS_FIRED.with_label_values(&[self.kind.as_str()]).inc();
            if let Err(e) = sub.handler.handle(payload).await {
                warn!(
                    subscription_id = %sub.id,
                    kind = %self.kind,
                    index,
                    remaining = payloads.len() - index - 1,
                    "handler failed: {:?}",
                    e
                );
                HANDLER_FAILURES.with_label_values(&[self.kind.as_str()]).inc();
                return Some(HandlerFailure {
                    subscription_id: sub.id.clone(),
                    message: e.to_string(),
                });
            }
        }
        None
    }
}
