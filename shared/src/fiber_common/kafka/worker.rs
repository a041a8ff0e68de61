// ============================================================================
// Kafka Worker - per-topic consumption loop
// ============================================================================
//
// Lifecycle: STARTING -> RUNNING -> DRAINING -> STOPPED
//
// - STARTING: open a consumer session on partition 0 (newest offset).
//   Failure is returned to the caller, the worker never runs.
// - RUNNING: one task waits on broker errors, inbound messages and the
//   shutdown token. Handlers run to completion before the next wait.
//   Handler failures and broker errors are logged, never fatal.
// - DRAINING: the shutdown token fired (SIGINT/SIGTERM or explicit cancel).
// - STOPPED: the session, then the connection, are closed. A failing close
//   is the result of the run.
//
// ============================================================================

use async_trait::async_trait;
use fiber_error::BrokerError;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::client::KafkaClient;
use crate::ShutdownSignals;
use super::session::{ConsumerSession, SessionEvent};
use super::transport::{ConsumerConnection, Transport};
use super::types::InboundMessage;

/// Successful outcome of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processed;

/// Failure reported by a handler for one message
#[derive(Debug, thiserror::Error)]
#[error("{0:#}")]
pub struct HandlerFailure(#[from] anyhow::Error);

impl HandlerFailure {
    pub fn msg<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self(anyhow::Error::msg(message))
    }
}

pub type HandlerResult = Result<Processed, HandlerFailure>;

/// Per-message processing supplied by the caller.
///
/// The message is only borrowed for the duration of the call. Failures are
/// logged by the worker; the message is not retried.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> HandlerResult;
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(&InboundMessage) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, message: &InboundMessage) -> HandlerResult {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

/// Counters of a worker, readable while it runs
#[derive(Debug, Default)]
pub struct WorkerStats {
    state: AtomicU8,
    messages_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    consumer_errors: AtomicU64,
}

impl WorkerStats {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Handler invocations, successful or not
    pub fn messages_dispatched(&self) -> u64 {
        self.messages_dispatched.load(Ordering::SeqCst)
    }

    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::SeqCst)
    }

    pub fn consumer_errors(&self) -> u64 {
        self.consumer_errors.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            messages_dispatched: self.messages_dispatched(),
            handler_failures: self.handler_failures(),
            consumer_errors: self.consumer_errors(),
        }
    }
}

/// Final counters of a stopped worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub messages_dispatched: u64,
    pub handler_failures: u64,
    pub consumer_errors: u64,
}

#[derive(Debug, Clone, Default)]
struct WorkerOptions {
    handle_signals: bool,
    handler_timeout: Option<Duration>,
}

const LOG_PREFIX: &str = "KAFKA_WORKER";

/// Consumer loop bound to one topic. Build it with [`KafkaClient::worker`].
pub struct KafkaWorker<T: Transport> {
    client: KafkaClient<T>,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    options: WorkerOptions,
    shutdown: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl<T: Transport> KafkaWorker<T> {
    pub(crate) fn new(client: KafkaClient<T>, topic: String, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            client,
            topic,
            handler,
            options: WorkerOptions::default(),
            shutdown: CancellationToken::new(),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Stop on SIGINT/SIGTERM (Ctrl-C on non-unix platforms)
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.options.handle_signals = enabled;
        self
    }

    /// Fail a handler invocation that runs longer than `timeout`
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.options.handler_timeout = Some(timeout);
        self
    }

    /// Use an externally owned token to stop the worker
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Cancelling the returned token stops the worker
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Runs the worker until the shutdown token fires, then closes the
    /// session and the connection.
    pub async fn run(self) -> Result<WorkerSummary, BrokerError> {
        self.stats.set_state(WorkerState::Starting);

        // Armed before RUNNING so an interrupt is never missed once running
        let signals = if self.options.handle_signals {
            let signals = ShutdownSignals::install().map_err(|e| {
                BrokerError::Worker(format!("failed to install signal handlers: {}", e))
            })?;
            Some(signals)
        } else {
            None
        };

        let (mut connection, session) = self.client.open_session(&self.topic).await?;
        info!(topic = %self.topic, "{}:: Consumer started listening on topic({})", LOG_PREFIX, self.topic);

        self.stats.set_state(WorkerState::Running);
        if let Some(signals) = signals {
            spawn_signal_listener(signals, self.shutdown.clone());
        }

        let event_loop = tokio::spawn(run_event_loop(
            session,
            Arc::clone(&self.handler),
            self.shutdown.clone(),
            Arc::clone(&self.stats),
            self.options.handler_timeout,
        ));
        let joined = event_loop.await;

        // Stops the signal listener when the loop ended on its own
        self.shutdown.cancel();
        self.stats.set_state(WorkerState::Draining);

        let result = match joined {
            Ok(mut session) => close_in_order(&mut session, &mut connection).await,
            Err(e) => {
                error!(topic = %self.topic, error = %e, "{}:: Event loop aborted", LOG_PREFIX);
                // The session was dropped with the task, which stops its pump
                if let Err(close_err) = connection.close().await {
                    warn!(
                        topic = %self.topic,
                        error = %close_err,
                        "{}:: Failed to release consumer connection",
                        LOG_PREFIX
                    );
                }
                Err(BrokerError::Worker(e.to_string()))
            }
        };

        self.stats.set_state(WorkerState::Stopped);
        result?;

        let summary = self.stats.summary();
        info!(
            topic = %self.topic,
            dispatched = summary.messages_dispatched,
            handler_failures = summary.handler_failures,
            consumer_errors = summary.consumer_errors,
            "{}:: Consumer stopped",
            LOG_PREFIX
        );
        Ok(summary)
    }
}

async fn close_in_order<C: ConsumerConnection>(
    session: &mut ConsumerSession,
    connection: &mut C,
) -> Result<(), BrokerError> {
    let session_closed = session.close().await;
    let connection_closed = connection.close().await;
    session_closed.and(connection_closed)
}

fn spawn_signal_listener(mut signals: ShutdownSignals, shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = signals.recv() => {
                info!("{}:: Interrupt detected", LOG_PREFIX);
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });
}

async fn run_event_loop(
    mut session: ConsumerSession,
    handler: Arc<dyn MessageHandler>,
    shutdown: CancellationToken,
    stats: Arc<WorkerStats>,
    handler_timeout: Option<Duration>,
) -> ConsumerSession {
    let topic = session.topic().to_string();
    let mut streams_open = true;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = session.next_event(), if streams_open => match event {
                Some(SessionEvent::Error(err)) => {
                    stats.consumer_errors.fetch_add(1, Ordering::SeqCst);
                    error!(topic = %topic, error = %err, "{}:: Consumer error", LOG_PREFIX);
                }
                Some(SessionEvent::Message(message)) => {
                    dispatch(handler.as_ref(), message, &stats, handler_timeout).await;
                }
                None => {
                    warn!(topic = %topic, "{}:: Session streams closed, waiting for shutdown", LOG_PREFIX);
                    streams_open = false;
                }
            },
        }
    }

    stats.set_state(WorkerState::Draining);
    session
}

async fn dispatch(
    handler: &dyn MessageHandler,
    message: InboundMessage,
    stats: &WorkerStats,
    handler_timeout: Option<Duration>,
) {
    info!(
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        "{}:: Message received on topic({})",
        LOG_PREFIX,
        message.topic
    );
    stats.messages_dispatched.fetch_add(1, Ordering::SeqCst);

    let outcome = match handler_timeout {
        Some(limit) => tokio::time::timeout(limit, handler.handle(&message))
            .await
            .unwrap_or_else(|_| {
                Err(HandlerFailure::msg(format!(
                    "handler timed out after {:?}",
                    limit
                )))
            }),
        None => handler.handle(&message).await,
    };

    if let Err(failure) = outcome {
        stats.handler_failures.fetch_add(1, Ordering::SeqCst);
        error!(
            topic = %message.topic,
            offset = message.offset,
            error = %failure,
            "{}:: Error while consuming message",
            LOG_PREFIX
        );
    }
}
