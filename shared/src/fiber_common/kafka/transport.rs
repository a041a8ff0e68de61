use async_trait::async_trait;
use fiber_error::BrokerError;
use futures_util::stream::BoxStream;

use super::config::BrokerConfig;
use super::types::{Delivery, InboundMessage, OutboundMessage, StartOffset};

/// Events produced by a partition subscription, in broker order
pub type EventStream = BoxStream<'static, Result<InboundMessage, BrokerError>>;

/// Connection factory for a broker wire protocol
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Producer: ProducerConnection;
    type Consumer: ConsumerConnection;

    async fn connect_producer(&self, config: &BrokerConfig) -> Result<Self::Producer, BrokerError>;

    async fn connect_consumer(&self, config: &BrokerConfig) -> Result<Self::Consumer, BrokerError>;
}

/// A producer connection. Sends block until the broker acknowledges.
#[async_trait]
pub trait ProducerConnection: Send {
    async fn send(&mut self, message: &OutboundMessage) -> Result<Delivery, BrokerError>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// A consumer connection able to subscribe to single partitions
#[async_trait]
pub trait ConsumerConnection: Send + 'static {
    /// Subscribes to `topic`/`partition` starting at `offset`.
    ///
    /// Fails immediately when the broker cannot be reached or the partition
    /// does not exist.
    async fn consume_partition(
        &mut self,
        topic: &str,
        partition: i32,
        offset: StartOffset,
    ) -> Result<EventStream, BrokerError>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), BrokerError>;

    fn is_closed(&self) -> bool;
}
