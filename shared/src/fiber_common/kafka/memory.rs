//! In-process broker for tests and local development.
//!
//! Every topic has a single partition (0). Connections are counted so that
//! callers can check that producers and consumers are released.

use async_trait::async_trait;
use fiber_error::BrokerError;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::config::BrokerConfig;
use super::transport::{ConsumerConnection, EventStream, ProducerConnection, Transport};
use super::types::{Delivery, InboundMessage, OutboundMessage, StartOffset, DEFAULT_PARTITION};

type Subscriber = mpsc::UnboundedSender<Result<InboundMessage, BrokerError>>;

#[derive(Default)]
struct TopicLog {
    records: Vec<OutboundMessage>,
    subscribers: Vec<(u64, Subscriber)>,
}

impl TopicLog {
    fn inbound(&self, topic: &str, offset: usize) -> InboundMessage {
        let record = &self.records[offset];
        InboundMessage {
            topic: topic.to_string(),
            partition: DEFAULT_PARTITION,
            offset: offset as i64,
            key: record.key.clone(),
            payload: record.payload.clone(),
            timestamp: None,
        }
    }

    fn broadcast(&mut self, event: Result<InboundMessage, BrokerError>) {
        self.subscribers.retain(|(_, s)| s.send(event.clone()).is_ok());
    }
}

struct BrokerState {
    reachable: bool,
    failing_publishes: usize,
    next_subscriber: u64,
    topics: HashMap<String, TopicLog>,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicUsize,
    open_connections: AtomicUsize,
}

/// Shared handle to an in-memory broker
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    counters: Arc<Counters>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                reachable: true,
                failing_publishes: 0,
                next_subscriber: 0,
                topics: HashMap::new(),
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        // A poisoned lock only means a test panicked while holding it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_topic(&self, topic: &str) {
        self.state().topics.entry(topic.to_string()).or_default();
    }

    /// Simulates the broker going away (or coming back)
    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// The next `count` publishes are rejected after reaching the broker
    pub fn fail_next_publishes(&self, count: usize) {
        self.state().failing_publishes = count;
    }

    /// Reports a broker error to every session subscribed to `topic`
    pub fn inject_error(&self, topic: &str, reason: &str) {
        if let Some(log) = self.state().topics.get_mut(topic) {
            log.broadcast(Err(BrokerError::Consumption(reason.to_string())));
        }
    }

    /// Payloads stored on `topic`, in offset order
    pub fn records(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state()
            .topics
            .get(topic)
            .map(|log| log.records.iter().map(|r| r.payload.clone()).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state()
            .topics
            .get_mut(topic)
            .map(|log| {
                log.subscribers.retain(|(_, s)| !s.is_closed());
                log.subscribers.len()
            })
            .unwrap_or(0)
    }

    /// Number of producer/consumer connections ever requested
    pub fn connect_attempts(&self) -> usize {
        self.counters.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.counters.open_connections.load(Ordering::SeqCst)
    }

    fn open_connection(&self) -> Result<(), BrokerError> {
        self.counters.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.state().reachable {
            return Err(BrokerError::Connection("broker unreachable".to_string()));
        }
        self.counters.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_connection(&self) {
        self.counters.open_connections.fetch_sub(1, Ordering::SeqCst);
    }

    fn append(&self, message: &OutboundMessage) -> Result<Delivery, BrokerError> {
        let mut state = self.state();
        let publish_error = |reason: &str| BrokerError::Publish {
            topic: message.topic.clone(),
            reason: reason.to_string(),
        };

        if !state.reachable {
            return Err(publish_error("broker unreachable"));
        }
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(publish_error("not enough in-sync replicas"));
        }

        let log = state
            .topics
            .get_mut(&message.topic)
            .ok_or_else(|| publish_error("unknown topic or partition"))?;

        log.records.push(message.clone());
        let offset = log.records.len() - 1;
        let inbound = log.inbound(&message.topic, offset);
        log.broadcast(Ok(inbound));

        Ok(Delivery {
            partition: DEFAULT_PARTITION,
            offset: offset as i64,
        })
    }

    fn subscribe(
        &self,
        topic: &str,
        partition: i32,
        offset: StartOffset,
    ) -> Result<(u64, mpsc::UnboundedReceiver<Result<InboundMessage, BrokerError>>), BrokerError>
    {
        let mut state = self.state();
        let id = state.next_subscriber;
        if !state.reachable {
            return Err(BrokerError::Connection("broker unreachable".to_string()));
        }
        if partition != DEFAULT_PARTITION {
            return Err(BrokerError::Connection(format!(
                "topic({})/partition({}) not found",
                topic, partition
            )));
        }
        let log = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::Connection(format!("topic({}) not found", topic)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        if offset == StartOffset::Oldest {
            for index in 0..log.records.len() {
                let _ = tx.send(Ok(log.inbound(topic, index)));
            }
        }
        log.subscribers.push((id, tx));
        state.next_subscriber += 1;
        Ok((id, rx))
    }

    /// Drops the sender side so the subscription's stream ends
    fn unsubscribe(&self, topic: &str, id: u64) {
        if let Some(log) = self.state().topics.get_mut(topic) {
            log.subscribers.retain(|(sid, _)| *sid != id);
        }
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    type Producer = MemoryProducer;
    type Consumer = MemoryConsumer;

    async fn connect_producer(&self, _config: &BrokerConfig) -> Result<MemoryProducer, BrokerError> {
        self.open_connection()?;
        Ok(MemoryProducer {
            broker: self.clone(),
            closed: false,
        })
    }

    async fn connect_consumer(&self, _config: &BrokerConfig) -> Result<MemoryConsumer, BrokerError> {
        self.open_connection()?;
        Ok(MemoryConsumer {
            broker: self.clone(),
            subscriptions: Vec::new(),
            closed: false,
        })
    }
}

pub struct MemoryProducer {
    broker: MemoryBroker,
    closed: bool,
}

#[async_trait]
impl ProducerConnection for MemoryProducer {
    async fn send(&mut self, message: &OutboundMessage) -> Result<Delivery, BrokerError> {
        if self.closed {
            return Err(BrokerError::Connection("producer connection is closed".to_string()));
        }
        self.broker.append(message)
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.broker.release_connection();
        }
        Ok(())
    }
}

pub struct MemoryConsumer {
    broker: MemoryBroker,
    subscriptions: Vec<(String, u64)>,
    closed: bool,
}

#[async_trait]
impl ConsumerConnection for MemoryConsumer {
    async fn consume_partition(
        &mut self,
        topic: &str,
        partition: i32,
        offset: StartOffset,
    ) -> Result<EventStream, BrokerError> {
        if self.closed {
            return Err(BrokerError::Connection("consumer connection is closed".to_string()));
        }
        let (id, rx) = self.broker.subscribe(topic, partition, offset)?;
        self.subscriptions.push((topic.to_string(), id));
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(events))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            for (topic, id) in self.subscriptions.drain(..) {
                self.broker.unsubscribe(&topic, id);
            }
            self.broker.release_connection();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
