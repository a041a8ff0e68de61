use fiber_error::{AppResult, BrokerError};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use super::config::BrokerConfig;
use super::rdkafka_transport::RdKafkaTransport;
use super::session::ConsumerSession;
use super::transport::{ConsumerConnection, ProducerConnection, Transport};
use super::types::{Delivery, OutboundMessage, StartOffset, DEFAULT_PARTITION};
use super::worker::{KafkaWorker, MessageHandler};

/// Entry point of the Kafka integration.
///
/// The broker configuration is installed once with [`KafkaClient::setup`];
/// every producer and consumer created afterwards reads it. Clones share the
/// same configuration and transport.
pub struct KafkaClient<T: Transport = RdKafkaTransport> {
    transport: Arc<T>,
    config: Arc<OnceLock<Arc<BrokerConfig>>>,
}

impl<T: Transport> Clone for KafkaClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
        }
    }
}

impl KafkaClient<RdKafkaTransport> {
    pub fn new() -> Self {
        Self::with_transport(RdKafkaTransport)
    }
}

impl Default for KafkaClient<RdKafkaTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> KafkaClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(OnceLock::new()),
        }
    }

    /// Installs the broker configuration. Can only succeed once.
    pub fn setup(&self, config: BrokerConfig) -> Result<(), BrokerError> {
        let brokers = config.bootstrap_servers();
        self.config
            .set(Arc::new(config))
            .map_err(|_| BrokerError::AlreadyInitialized)?;

        info!(brokers = %brokers, "KAFKA:: Client configured");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config.get().is_some()
    }

    pub fn config(&self) -> Result<Arc<BrokerConfig>, BrokerError> {
        self.config.get().cloned().ok_or(BrokerError::NotInitialized)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Publishes `payload` on `topic` and waits for the broker acknowledgment.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Delivery, BrokerError> {
        self.send(OutboundMessage::new(topic, payload)).await
    }

    /// Publishes the JSON encoding of `value` on `topic`.
    pub async fn publish_json<V: Serialize>(&self, topic: &str, value: &V) -> AppResult<Delivery> {
        let message = OutboundMessage::json(topic, value)?;
        Ok(self.send(message).await?)
    }

    /// Publishes one message over a dedicated producer connection.
    ///
    /// The connection is closed before returning, whether the send succeeded
    /// or not. Broker errors are returned unchanged and are not logged here.
    pub async fn send(&self, message: OutboundMessage) -> Result<Delivery, BrokerError> {
        let config = self.config()?;
        if message.topic.trim().is_empty() {
            return Err(BrokerError::InvalidTopic);
        }

        let mut producer = self.transport.connect_producer(&config).await?;
        let result = producer.send(&message).await;

        if let Err(e) = producer.close().await {
            warn!(
                error = %e,
                topic = %message.topic,
                "KAFKA:: Failed to release producer connection"
            );
        }

        let delivery = result?;
        info!(
            topic = %message.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "KAFKA:: Message published"
        );
        Ok(delivery)
    }

    /// Opens a session on partition 0 of `topic`, starting at the newest
    /// offset. Messages published before this call are never delivered.
    pub async fn open_session(
        &self,
        topic: &str,
    ) -> Result<(T::Consumer, ConsumerSession), BrokerError> {
        self.open_session_from(topic, StartOffset::Newest).await
    }

    pub async fn open_session_from(
        &self,
        topic: &str,
        offset: StartOffset,
    ) -> Result<(T::Consumer, ConsumerSession), BrokerError> {
        let config = self.config()?;
        if topic.trim().is_empty() {
            return Err(BrokerError::InvalidTopic);
        }

        let mut connection = self.transport.connect_consumer(&config).await?;
        let events = match connection
            .consume_partition(topic, DEFAULT_PARTITION, offset)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(error = %close_err, topic = %topic, "KAFKA:: Failed to release consumer connection");
                }
                return Err(e);
            }
        };

        let session = ConsumerSession::start(
            topic,
            DEFAULT_PARTITION,
            events,
            config.settings().session_buffer,
        );
        Ok((connection, session))
    }

    /// Builds a worker for `topic`. Nothing is opened until it runs.
    pub fn worker<H>(&self, topic: impl Into<String>, handler: H) -> KafkaWorker<T>
    where
        H: MessageHandler + 'static,
    {
        KafkaWorker::new(self.clone(), topic.into(), Arc::new(handler))
    }

    /// Consumes `topic` with `handler` until SIGINT/SIGTERM, then releases
    /// the session and connection.
    pub async fn add_worker<H>(
        &self,
        topic: impl Into<String>,
        handler: H,
    ) -> Result<super::worker::WorkerSummary, BrokerError>
    where
        H: MessageHandler + 'static,
    {
        self.worker(topic, handler).handle_signals(true).run().await
    }
}
