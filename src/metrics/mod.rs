use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

use crate::Error;
use crate::Result;


lazy_static! {
    pub static ref POLL_TICKS: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_ticks", "Number of poll ticks run per watcher"),
        &["watcher"]
    )
    .expect("metric can not be created");

    pub static ref POLL_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_failures", "Number of poll ticks aborted by an error"),
        &["watcher"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_FIRED: IntCounterVec = IntCounterVec::new(
        Opts::new("events_fired", "Handler invocations issued by fire"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref HANDLER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("handler_failures", "Subscriptions whose delivery loop stopped on an error"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref REMOTE_INVOCATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("remote_invocations", "Remote invocations by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref QUEUES_COMPLETED: IntCounter =
        IntCounter::new("queues_completed", "Dispatch queues that reached completion")
            .expect("metric can not be created");

    pub static ref ACTIVE_INVOCATIONS: IntGauge =
        IntGauge::new("active_invocations", "Remote invocations currently in flight")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers every collector of this crate into `registry`
pub fn register_custom_metrics(registry: &Registry) -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(POLL_TICKS.clone()),
        Box::new(POLL_FAILURES.clone()),
        Box::new(EVENTS_FIRED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(REMOTE_INVOCATIONS.clone()),
        Box::new(QUEUES_COMPLETED.clone()),
        Box::new(ACTIVE_INVOCATIONS.clone()),
    ];

    for c in collectors {
        registry
            .register(c)
            .map_err(|e| Error::Fatal(format!("collector can not be registered: {e}")))?;
    }
    Ok(())
}

/// Renders `registry` in the prometheus text exposition format
pub fn gather_text(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| Error::Fatal(format!("could not encode metrics: {e}")))?;
    String::from_utf8(buffer).map_err(|e| Error::Fatal(format!("metrics are not utf8: {e}")))
}
