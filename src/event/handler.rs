use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// Receives the payloads fired to one subscription.
///
/// Payloads are delivered in order and never concurrently to the same
/// subscription. Returning an error stops delivery of the remaining payloads
/// of the current batch to this subscription only.
#[async_trait]
pub trait EventHandler<E>: Send + Sync + 'static
where
    E: Send + Sync + 'static,
{
    async fn handle(
        &self,
        event: &E,
    ) -> Result<()>;
}

/// Adapts an async closure into an [`EventHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<E, F, Fut> EventHandler<E> for FnHandler<F>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        event: &E,
    ) -> Result<()> {
        (self.0)(event.clone()).await
    }
}

/// ```ignore
/// let handler = handler_fn(|ev: ObjectEvent| async move {
///     println!("{ev:?}");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F>(f: F) -> Arc<FnHandler<F>> {
    Arc::new(FnHandler(f))
}
