//! Resource watchers built on the poll-and-snapshot protocol, plus the
//! validators their descriptors rely on.
mod media_jobs;
mod message_queue;
mod object_store;
mod pipeline;
mod validate;

pub use media_jobs::*;
pub use message_queue::*;
pub use object_store::*;
pub use pipeline::*;
pub use validate::*;

#[cfg(test)]
mod object_store_test;

use tracing::warn;

use crate::Error;
use crate::HandlerError;
use crate::HandlerFailure;
use crate::Result;

/// Failures gathered over the several `fire` calls of one tick.
///
/// A failing subscription must not keep later categories from being fired,
/// and a watcher polling several sources keeps going past one that fails to
/// fetch. Everything is reported once the tick is done.
#[derive(Debug, Default)]
pub(crate) struct TickFailures {
    failures: Vec<HandlerFailure>,
    fetch_errors: Vec<(String, Error)>,
}

impl TickFailures {
    pub(crate) fn record(
        &mut self,
        fired: Result<usize>,
    ) -> Result<()> {
        match fired {
            Ok(_) => Ok(()),
            Err(Error::Handler(e)) => {
                self.failures.extend(e.failures);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Remembers that fetching `source` failed this tick
    pub(crate) fn fetch_failed(
        &mut self,
        source: &str,
        error: Error,
    ) {
        warn!(source, "fetch failed, continuing with the next source: {:?}", error);
        self.fetch_errors.push((source.to_string(), error));
    }

    /// Fetch errors win over handler failures: the first one is returned and
    /// the rest are only logged.
    pub(crate) fn finish(self) -> Result<()> {
        let mut fetch_errors = self.fetch_errors.into_iter();
        if let Some((_, first)) = fetch_errors.next() {
            for (source, e) in fetch_errors {
                warn!(source = %source, "additional fetch failure this tick: {:?}", e);
            }
            if !self.failures.is_empty() {
                let handlers = HandlerError {
                    failures: self.failures,
                };
                warn!("handler failures this tick: {}", handlers);
            }
            return Err(first);
        }

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(HandlerError {
                failures: self.failures,
            }
            .into())
        }
    }
}
