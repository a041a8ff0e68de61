use fiber_error::BrokerError;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::transport::EventStream;
use super::types::InboundMessage;

/// One event observed on a consumer session
#[derive(Debug)]
pub enum SessionEvent {
    Message(InboundMessage),
    Error(BrokerError),
}

/// Live subscription to one topic/partition.
///
/// A pump task drains the transport's event stream into two bounded
/// buffers, one for messages and one for broker errors. Both are open until
/// the session is closed or the underlying stream ends.
pub struct ConsumerSession {
    topic: String,
    partition: i32,
    messages: Option<mpsc::Receiver<InboundMessage>>,
    errors: Option<mpsc::Receiver<BrokerError>>,
    shutdown: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl ConsumerSession {
    /// Starts pumping `events`. Must be called inside a tokio runtime.
    pub fn start(topic: impl Into<String>, partition: i32, events: EventStream, buffer: usize) -> Self {
        let topic = topic.into();
        let (message_tx, message_rx) = mpsc::channel(buffer);
        let (error_tx, error_rx) = mpsc::channel(buffer);
        let shutdown = CancellationToken::new();

        let pump = tokio::spawn(pump_events(
            topic.clone(),
            events,
            message_tx,
            error_tx,
            shutdown.clone(),
        ));

        Self {
            topic,
            partition,
            messages: Some(message_rx),
            errors: Some(error_rx),
            shutdown,
            pump: Some(pump),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Waits for the next message or broker error.
    ///
    /// No ordering is guaranteed between the two sources when both are
    /// ready. Returns `None` once both are exhausted or the session is
    /// closed. Cancel safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let (messages, errors) = match (self.messages.as_mut(), self.errors.as_mut()) {
            (Some(messages), Some(errors)) => (messages, errors),
            _ => return None,
        };

        tokio::select! {
            Some(error) = errors.recv() => Some(SessionEvent::Error(error)),
            Some(message) = messages.recv() => Some(SessionEvent::Message(message)),
            else => None,
        }
    }

    /// Stops the pump and drops both buffers. Idempotent.
    pub async fn close(&mut self) -> Result<(), BrokerError> {
        self.shutdown.cancel();
        self.messages.take();
        self.errors.take();

        if let Some(pump) = self.pump.take() {
            pump.await.map_err(|e| BrokerError::Shutdown {
                resource: "consumer session",
                reason: e.to_string(),
            })?;
            debug!(topic = %self.topic, "Consumer session closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.pump.is_none()
    }
}

impl Drop for ConsumerSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn pump_events(
    topic: String,
    mut events: EventStream,
    messages: mpsc::Sender<InboundMessage>,
    errors: mpsc::Sender<BrokerError>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };

        let forwarded = match event {
            Some(Ok(message)) => forward(&messages, message, &shutdown).await,
            Some(Err(error)) => forward(&errors, error, &shutdown).await,
            None => {
                debug!(topic = %topic, "Consumer event stream ended");
                break;
            }
        };

        if !forwarded {
            break;
        }
    }
}

/// Returns false when the session is shutting down or the receiver is gone.
async fn forward<T>(tx: &mpsc::Sender<T>, item: T, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
