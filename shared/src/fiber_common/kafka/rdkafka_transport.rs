use async_trait::async_trait;
use fiber_error::BrokerError;
use futures_util::stream;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::config::{create_consumer_config, create_producer_config, BrokerConfig};
use super::transport::{ConsumerConnection, EventStream, ProducerConnection, Transport};
use super::types::{Delivery, InboundMessage, OutboundMessage, StartOffset};

/// Transport backed by librdkafka
#[derive(Debug, Clone, Copy, Default)]
pub struct RdKafkaTransport;

#[async_trait]
impl Transport for RdKafkaTransport {
    type Producer = RdKafkaProducer;
    type Consumer = RdKafkaConsumer;

    async fn connect_producer(&self, config: &BrokerConfig) -> Result<RdKafkaProducer, BrokerError> {
        let producer: FutureProducer = create_producer_config(config)
            .create()
            .map_err(|e| BrokerError::Connection(format!("failed to create producer: {}", e)))?;

        Ok(RdKafkaProducer {
            producer: Some(producer),
            delivery_timeout: config.delivery_timeout(),
        })
    }

    async fn connect_consumer(&self, config: &BrokerConfig) -> Result<RdKafkaConsumer, BrokerError> {
        // Partitions are assigned explicitly, the group id only has to be unique
        let group_id = format!(
            "{}-{}",
            config.settings().consumer_group_prefix,
            Uuid::new_v4()
        );

        let consumer: StreamConsumer = create_consumer_config(config, &group_id)
            .create()
            .map_err(|e| BrokerError::Connection(format!("failed to create consumer: {}", e)))?;

        Ok(RdKafkaConsumer {
            consumer: Some(Arc::new(consumer)),
            metadata_timeout: config.metadata_timeout(),
        })
    }
}

pub struct RdKafkaProducer {
    producer: Option<FutureProducer>,
    delivery_timeout: Duration,
}

#[async_trait]
impl ProducerConnection for RdKafkaProducer {
    async fn send(&mut self, message: &OutboundMessage) -> Result<Delivery, BrokerError> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| BrokerError::Connection("producer connection is closed".to_string()))?;

        let mut record =
            FutureRecord::<[u8], [u8]>::to(&message.topic).payload(message.payload.as_slice());
        if let Some(key) = &message.key {
            record = record.key(key.as_slice());
        }

        match producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
        {
            Ok((partition, offset)) => Ok(Delivery { partition, offset }),
            Err((kafka_err, _)) => Err(BrokerError::Publish {
                topic: message.topic.clone(),
                reason: kafka_err.to_string(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };

        let timeout = self.delivery_timeout;
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| BrokerError::Shutdown {
                resource: "producer connection",
                reason: e.to_string(),
            })?
            .map_err(|e| BrokerError::Shutdown {
                resource: "producer connection",
                reason: e.to_string(),
            })
    }
}

pub struct RdKafkaConsumer {
    consumer: Option<Arc<StreamConsumer>>,
    metadata_timeout: Duration,
}

#[async_trait]
impl ConsumerConnection for RdKafkaConsumer {
    async fn consume_partition(
        &mut self,
        topic: &str,
        partition: i32,
        offset: StartOffset,
    ) -> Result<EventStream, BrokerError> {
        let consumer = self
            .consumer
            .clone()
            .ok_or_else(|| BrokerError::Connection("consumer connection is closed".to_string()))?;

        // fetch_metadata blocks on the network
        let lookup = Arc::clone(&consumer);
        let lookup_topic = topic.to_string();
        let timeout = self.metadata_timeout;
        tokio::task::spawn_blocking(move || {
            ensure_partition(&lookup, &lookup_topic, partition, timeout)
        })
        .await
        .map_err(|e| BrokerError::Connection(e.to_string()))??;

        let start = match offset {
            StartOffset::Newest => Offset::End,
            StartOffset::Oldest => Offset::Beginning,
        };
        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, partition, start)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        consumer
            .assign(&assignment)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        debug!(topic = %topic, partition = partition, "Partition assigned");

        let events = stream::unfold(consumer, |consumer| async move {
            let event = match consumer.recv().await {
                Ok(message) => Ok(detach(&message)),
                Err(e) => Err(BrokerError::Consumption(e.to_string())),
            };
            Some((event, consumer))
        });

        Ok(Box::pin(events))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unassign().map_err(|e| BrokerError::Shutdown {
                resource: "consumer connection",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.consumer.is_none()
    }
}

fn ensure_partition(
    consumer: &StreamConsumer,
    topic: &str,
    partition: i32,
    timeout: Duration,
) -> Result<(), BrokerError> {
    let metadata = consumer
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| BrokerError::Connection(e.to_string()))?;

    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| BrokerError::Connection(format!("topic({}) not found", topic)))?;

    if let Some(err) = topic_metadata.error() {
        return Err(BrokerError::Connection(format!(
            "topic({}) unavailable: {:?}",
            topic, err
        )));
    }

    if !topic_metadata.partitions().iter().any(|p| p.id() == partition) {
        return Err(BrokerError::Connection(format!(
            "topic({})/partition({}) not found",
            topic, partition
        )));
    }

    Ok(())
}

fn detach(message: &BorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp: message.timestamp().to_millis(),
    }
}
