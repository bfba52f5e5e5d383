use std::time::Duration;

use d_poll::DispatcherEventOptions;
use d_poll::DispatcherEventType;
use d_poll::QueueCompleteEvent;
use d_poll::Resolution;
use futures::future::join_all;
use serde_json::json;
use tokio::time::timeout;

use crate::common::forward;
use crate::common::runtime;
use crate::common::EchoFunction;
use crate::common::RECV_TIMEOUT;
use crate::enable_logger;

fn completion_options() -> DispatcherEventOptions {
    DispatcherEventOptions {
        event_type: DispatcherEventType::QueueComplete,
    }
}

#[tokio::test]
async fn test_failed_payload_is_recorded_in_order() {
    enable_logger();
    let runtime = runtime();
    let function = EchoFunction::new(Duration::from_millis(5));
    let dispatcher = runtime.dispatcher("scenario-b", function.clone()).unwrap();
    let (handler, mut rx) = forward::<QueueCompleteEvent>();
    dispatcher.on(completion_options(), handler, None).unwrap();

    let queue_id = dispatcher
        .enqueue(
            "resize",
            vec![json!({"n": 1}), json!({"fail": true}), json!({"n": 3})],
            Some(2),
        )
        .await
        .unwrap();

    let event = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.queue_id, queue_id);
    assert_eq!(event.resolutions.len(), 3);
    assert_eq!(event.resolutions[0], Resolution::Success(json!({"echo": {"n": 1}})));
    assert!(event.resolutions[1].is_failure());
    assert_eq!(event.resolutions[2], Resolution::Success(json!({"echo": {"n": 3}})));
    assert!(function.max_in_flight() <= 2);

    // Exactly one completion event
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert!(dispatcher.pending_queues().unwrap().is_empty());
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_empty_queue_completes_immediately() {
    let runtime = runtime();
    let dispatcher = runtime
        .dispatcher("scenario-c", EchoFunction::new(Duration::ZERO))
        .unwrap();
    let (handler, mut rx) = forward::<QueueCompleteEvent>();
    dispatcher.on(completion_options(), handler, None).unwrap();

    dispatcher.enqueue("resize", vec![], Some(5)).await.unwrap();

    let event = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert!(event.payloads.is_empty());
    assert!(event.resolutions.is_empty());
}

#[tokio::test]
async fn test_ceiling_holds_across_a_large_batch() {
    let runtime = runtime();
    let function = EchoFunction::new(Duration::from_millis(2));
    let dispatcher = runtime.dispatcher("ceiling", function.clone()).unwrap();
    let (handler, mut rx) = forward::<QueueCompleteEvent>();
    dispatcher.on(completion_options(), handler, None).unwrap();

    let payloads = (0..60).map(|n| json!({"n": n})).collect();
    dispatcher.enqueue("resize", payloads, Some(7)).await.unwrap();

    let event = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.resolutions.len(), 60);
    assert!(event.resolutions.iter().all(Resolution::is_success));
    assert_eq!(function.calls(), 60);
    assert!(function.max_in_flight() <= 7, "saw {} in flight", function.max_in_flight());
}

#[tokio::test]
async fn test_redundant_drains_never_duplicate_work() {
    let runtime = runtime();
    let function = EchoFunction::new(Duration::from_millis(3));
    let dispatcher = runtime.dispatcher("at-most-once", function.clone()).unwrap();
    let (handler, mut rx) = forward::<QueueCompleteEvent>();
    dispatcher.on(completion_options(), handler, None).unwrap();

    let payloads = (0..20).map(|n| json!({"n": n})).collect();
    let queue_id = dispatcher.enqueue("resize", payloads, Some(4)).await.unwrap();
    join_all((0..16).map(|_| dispatcher.drain())).await;

    let event = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.queue_id, queue_id);

    for _ in 0..8 {
        dispatcher.drain().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(function.calls(), 20);
}

#[tokio::test]
async fn test_direct_invoke_interprets_the_reply() {
    let runtime = runtime();
    let dispatcher = runtime
        .dispatcher("direct", EchoFunction::new(Duration::ZERO))
        .unwrap();

    let value = dispatcher.invoke("resize", &json!({"n": 9})).await.unwrap();
    assert_eq!(value, json!({"echo": {"n": 9}}));

    assert!(dispatcher.invoke("resize", &json!({"fail": true})).await.is_err());
    assert!(dispatcher.invoke("bad name", &json!({})).await.is_err());
}
