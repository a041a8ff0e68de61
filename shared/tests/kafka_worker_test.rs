// ============================================================================
// Kafka Worker Integration Tests
// ============================================================================
//
// Exercises publish, consumer sessions and the worker lifecycle against the
// in-memory broker. The live broker test at the bottom is ignored unless a
// Kafka cluster is available:
//
// Run with: KAFKA_BROKERS=localhost:9092 cargo test --test kafka_worker_test -- --ignored
//
// ============================================================================


use async_trait::async_trait;
use fiber_common::kafka::{
    BrokerConfig, BrokerError, ConsumerConnection, HandlerFailure, HandlerResult, InboundMessage,
    KafkaClient, MemoryBroker, MessageHandler, Processed, SessionEvent, WorkerState,
    WorkerSummary,
};
use fiber_common::push::SendPushNotificationMessage;
use serial_test::serial;
use std::collections::BTreeMap;
use std::time::Duration;
use test_utils::{memory_client, wait_until};
use tokio::sync::mpsc;

async fn next_message(
    session: &mut fiber_common::kafka::ConsumerSession,
) -> InboundMessage {
    match tokio::time::timeout(Duration::from_secs(1), session.next_event()).await {
        Ok(Some(SessionEvent::Message(message))) => message,
        other => panic!("expected a message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_returns_partition_and_offset() {
    let (broker, client) = memory_client(&["orders"]);

    let first = client.publish("orders", "m1").await.unwrap();
    let second = client.publish("orders", "m2").await.unwrap();

    assert_eq!(first.partition, 0);
    assert_eq!(second.partition, 0);
    assert!(first.offset >= 0);
    assert_eq!(second.offset, first.offset + 1);
    assert_eq!(broker.records("orders"), vec![b"m1".to_vec(), b"m2".to_vec()]);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_operations_before_setup_fail_without_network() {
    let broker = MemoryBroker::new();
    broker.create_topic("orders");
    let client = KafkaClient::with_transport(broker.clone());

    assert_eq!(
        client.publish("orders", "m1").await,
        Err(BrokerError::NotInitialized)
    );
    assert!(matches!(
        client.open_session("orders").await,
        Err(BrokerError::NotInitialized)
    ));

    let worker = client.worker("orders", |_: &InboundMessage| -> HandlerResult { Ok(Processed) });
    assert_eq!(worker.run().await, Err(BrokerError::NotInitialized));

    assert_eq!(broker.connect_attempts(), 0);
}

#[tokio::test]
async fn test_producer_connection_released_on_failure() {
    let (broker, client) = memory_client(&["orders"]);
    broker.fail_next_publishes(5);

    for _ in 0..5 {
        let result = client.publish("orders", "m").await;
        assert!(matches!(result, Err(BrokerError::Publish { .. })));
    }

    assert_eq!(broker.connect_attempts(), 5);
    assert_eq!(broker.open_connections(), 0);

    // Retry budget exhausted on the broker side, next publish goes through
    assert!(client.publish("orders", "m").await.is_ok());
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_unreachable_broker_fails_publish_and_open() {
    let (broker, client) = memory_client(&["orders"]);
    broker.set_reachable(false);

    assert!(matches!(
        client.publish("orders", "m").await,
        Err(BrokerError::Connection(_))
    ));
    assert!(matches!(
        client.open_session("orders").await,
        Err(BrokerError::Connection(_))
    ));
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_session_only_receives_messages_published_after_open() {
    let (broker, client) = memory_client(&["orders"]);

    client.publish("orders", "m1").await.unwrap();
    let (mut connection, mut session) = client.open_session("orders").await.unwrap();
    client.publish("orders", "m2").await.unwrap();

    let message = next_message(&mut session).await;
    assert_eq!(message.payload, b"m2".to_vec());
    assert_eq!(message.offset, 1);
    assert_eq!(message.topic, "orders");

    // m1 never shows up
    assert!(
        tokio::time::timeout(Duration::from_millis(50), session.next_event())
            .await
            .is_err()
    );

    session.close().await.unwrap();
    connection.close().await.unwrap();

    // Closing twice is harmless
    session.close().await.unwrap();
    connection.close().await.unwrap();
    assert!(session.is_closed());
    assert!(connection.is_closed());
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_publish_json_roundtrip() {
    let (_broker, client) = memory_client(&["push"]);
    let (mut connection, mut session) = client.open_session("push").await.unwrap();

    let request = SendPushNotificationMessage {
        tokens: vec!["device-1".to_string()],
        title: "Hi".to_string(),
        body: "There".to_string(),
        data: BTreeMap::new(),
    };
    client.publish_json("push", &request).await.unwrap();

    let message = next_message(&mut session).await;
    let decoded: SendPushNotificationMessage = message.decode_json().unwrap();
    assert_eq!(decoded, request);

    session.close().await.unwrap();
    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_worker_continues_after_handler_failure() {
    let (broker, client) = memory_client(&["orders"]);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let handler = move |message: &InboundMessage| -> HandlerResult {
        let _ = seen_tx.send(message.offset);
        if message.payload == b"bad" {
            Err(HandlerFailure::msg("cannot process"))
        } else {
            Ok(Processed)
        }
    };

    let worker = client.worker("orders", handler);
    let shutdown = worker.shutdown_token();
    let stats = worker.stats();
    let running = tokio::spawn(worker.run());

    wait_until("worker to run", || stats.state() == WorkerState::Running).await;

    client.publish("orders", "bad").await.unwrap();
    client.publish("orders", "good").await.unwrap();

    assert_eq!(seen_rx.recv().await, Some(0));
    assert_eq!(seen_rx.recv().await, Some(1));
    wait_until("both dispatches to finish", || {
        stats.messages_dispatched() == 2 && stats.handler_failures() == 1
    })
    .await;

    shutdown.cancel();
    let summary = running.await.unwrap().unwrap();

    assert_eq!(
        summary,
        WorkerSummary {
            messages_dispatched: 2,
            handler_failures: 1,
            consumer_errors: 0,
        }
    );
    assert_eq!(stats.state(), WorkerState::Stopped);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.subscriber_count("orders"), 0);
}

#[tokio::test]
async fn test_consumer_errors_are_logged_and_loop_continues() {
    let (broker, client) = memory_client(&["orders"]);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let worker = client.worker("orders", move |message: &InboundMessage| -> HandlerResult {
        let _ = seen_tx.send(message.payload.clone());
        Ok(Processed)
    });
    let shutdown = worker.shutdown_token();
    let stats = worker.stats();
    let running = tokio::spawn(worker.run());

    wait_until("worker to run", || stats.state() == WorkerState::Running).await;

    broker.inject_error("orders", "leader not available");
    client.publish("orders", "m1").await.unwrap();
    broker.inject_error("orders", "request timed out");
    client.publish("orders", "m2").await.unwrap();
    broker.inject_error("orders", "leader not available");

    wait_until("all events to be handled", || {
        stats.consumer_errors() == 3 && stats.messages_dispatched() == 2
    })
    .await;

    shutdown.cancel();
    let summary = running.await.unwrap().unwrap();

    assert_eq!(summary.consumer_errors, 3);
    assert_eq!(summary.messages_dispatched, 2);
    assert_eq!(summary.handler_failures, 0);
    assert_eq!(seen_rx.recv().await, Some(b"m1".to_vec()));
    assert_eq!(seen_rx.recv().await, Some(b"m2".to_vec()));
}

#[tokio::test]
async fn test_worker_fails_to_start_on_missing_topic() {
    let (broker, client) = memory_client(&[]);

    let worker = client.worker("missing", |_: &InboundMessage| -> HandlerResult { Ok(Processed) });
    let stats = worker.stats();

    let result = worker.run().await;
    assert!(matches!(result, Err(BrokerError::Connection(_))));
    assert_eq!(stats.state(), WorkerState::Starting);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_worker_stops_when_cancelled_before_any_message() {
    let (broker, client) = memory_client(&["orders"]);

    let worker = client.worker("orders", |_: &InboundMessage| -> HandlerResult { Ok(Processed) });
    let shutdown = worker.shutdown_token();
    let stats = worker.stats();
    let running = tokio::spawn(worker.run());

    wait_until("worker to run", || stats.state() == WorkerState::Running).await;
    assert_eq!(broker.open_connections(), 1);

    shutdown.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("worker must stop")
        .unwrap()
        .unwrap();

    assert_eq!(summary, WorkerSummary::default());
    assert_eq!(stats.state(), WorkerState::Stopped);
    assert_eq!(broker.open_connections(), 0);
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_sigterm_stops_running_worker() {
    let (broker, client) = memory_client(&["orders"]);

    let worker = client
        .worker("orders", |_: &InboundMessage| -> HandlerResult { Ok(Processed) })
        .handle_signals(true);
    let stats = worker.stats();
    let running = tokio::spawn(worker.run());

    wait_until("worker to run", || stats.state() == WorkerState::Running).await;

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("kill must be available");
    assert!(status.success());

    let summary = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("worker must stop on SIGTERM")
        .unwrap()
        .unwrap();

    assert_eq!(summary, WorkerSummary::default());
    assert_eq!(stats.state(), WorkerState::Stopped);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.subscriber_count("orders"), 0);
}

#[tokio::test]
async fn test_panicking_handler_releases_connection() {
    let (broker, client) = memory_client(&["orders"]);

    let worker = client.worker("orders", |_: &InboundMessage| -> HandlerResult {
        panic!("handler bug");
    });
    let stats = worker.stats();
    let running = tokio::spawn(worker.run());

    wait_until("worker to run", || stats.state() == WorkerState::Running).await;
    client.publish("orders", "m1").await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("worker must stop after the loop panics")
        .unwrap();

    assert!(matches!(result, Err(BrokerError::Worker(_))));
    assert_eq!(stats.state(), WorkerState::Stopped);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.subscriber_count("orders"), 0);
}

struct SlowFirstMessage {
    seen: mpsc::UnboundedSender<i64>,
}

#[async_trait]
impl MessageHandler for SlowFirstMessage {
    async fn handle(&self, message: &InboundMessage) -> HandlerResult {
        if message.offset == 0 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let _ = self.seen.send(message.offset);
        Ok(Processed)
    }
}

#[tokio::test]
async fn test_handler_timeout_lets_loop_continue() {
    let (_broker, client) = memory_client(&["orders"]);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let worker = client
        .worker("orders", SlowFirstMessage { seen: seen_tx })
        .handler_timeout(Duration::from_millis(50));
    let shutdown = worker.shutdown_token();
    let stats = worker.stats();
    let running = tokio::spawn(worker.run());

    wait_until("worker to run", || stats.state() == WorkerState::Running).await;
    client.publish("orders", "slow").await.unwrap();
    client.publish("orders", "fast").await.unwrap();

    assert_eq!(seen_rx.recv().await, Some(1));
    wait_until("second dispatch to finish", || stats.messages_dispatched() == 2).await;

    shutdown.cancel();
    let summary = running.await.unwrap().unwrap();
    assert_eq!(summary.handler_failures, 1);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_live_broker_newest_offset_semantics() {
    let brokers = std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    let topic = std::env::var("KAFKA_TEST_TOPIC").unwrap_or_else(|_| "fiber-test".to_string());

    let client = KafkaClient::new();
    client
        .setup(BrokerConfig::new(fiber_config::parse_broker_list(&brokers)).unwrap())
        .unwrap();

    client.publish(&topic, "before-open").await.unwrap();
    let (mut connection, mut session) = client.open_session(&topic).await.unwrap();

    // Give the assignment time to resolve the end offset
    tokio::time::sleep(Duration::from_secs(2)).await;
    let delivery = client.publish(&topic, "after-open").await.unwrap();

    let message = match tokio::time::timeout(Duration::from_secs(10), session.next_event()).await {
        Ok(Some(SessionEvent::Message(message))) => message,
        other => panic!("expected a message, got {:?}", other),
    };
    assert_eq!(message.payload, b"after-open".to_vec());
    assert_eq!(message.offset, delivery.offset);

    session.close().await.unwrap();
    connection.close().await.unwrap();
}
