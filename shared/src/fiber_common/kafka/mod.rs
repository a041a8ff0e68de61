// Kafka module: producer/consumer lifecycle and per-topic workers
//
// Publishing opens a producer connection per message and always releases it.
// Consuming binds a session to partition 0 of a topic, starting from the
// newest offset, and a worker drives that session until shutdown.

pub mod client;
pub mod config;
pub mod memory;
pub mod rdkafka_transport;
pub mod session;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use client::KafkaClient;
pub use config::{create_client_config, BrokerConfig};
pub use fiber_error::BrokerError;
pub use memory::MemoryBroker;
pub use rdkafka_transport::RdKafkaTransport;
pub use session::{ConsumerSession, SessionEvent};
pub use transport::{ConsumerConnection, EventStream, ProducerConnection, Transport};
pub use types::{Delivery, InboundMessage, OutboundMessage, StartOffset, DEFAULT_PARTITION};
pub use worker::{
    HandlerFailure, HandlerResult, KafkaWorker, MessageHandler, Processed, WorkerState,
    WorkerStats, WorkerSummary,
};
