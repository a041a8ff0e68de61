use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Errors raised by the message-queue integration
///
/// Configuration, connection, publish and shutdown errors are fatal to the
/// call that produced them. Consumption errors are reported by an open
/// session and never stop a worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    // ===== Configuration Errors =====
    #[error("kafka client isn't initialized yet")]
    NotInitialized,

    #[error("kafka client is already initialized")]
    AlreadyInitialized,

    #[error("invalid broker configuration: {0}")]
    InvalidConfig(String),

    #[error("topic name must not be empty")]
    InvalidTopic,

    // ===== Connection Errors =====
    #[error("failed to connect to kafka: {0}")]
    Connection(String),

    // ===== Publish Errors =====
    #[error("failed to publish message on topic({topic}): {reason}")]
    Publish { topic: String, reason: String },

    // ===== Consumption Errors =====
    #[error("consumer error: {0}")]
    Consumption(String),

    // ===== Shutdown Errors =====
    #[error("failed to close {resource}: {reason}")]
    Shutdown {
        resource: &'static str,
        reason: String,
    },

    #[error("worker event loop failed: {0}")]
    Worker(String),
}

impl BrokerError {
    /// Whether the error stops the operation that raised it.
    ///
    /// Only consumption errors are contained by the worker loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BrokerError::Consumption(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BrokerError::NotInitialized
                | BrokerError::AlreadyInitialized
                | BrokerError::InvalidConfig(_)
                | BrokerError::InvalidTopic
        )
    }
}

/// Errors raised by the push gateway integration
#[derive(Error, Debug)]
pub enum PushError {
    #[error("push client not initialized: {0}")]
    NotConfigured(String),

    #[error("failed to send push notifications: {0}")]
    Send(String),

    #[error("some notifications failed: {failed}/{total}")]
    Partial { failed: usize, total: usize },
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Kafka error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Push error: {0}")]
    Push(#[from] PushError),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Broker(e) if e.is_configuration() => "KAFKA_CONFIG_ERROR",
            AppError::Broker(BrokerError::Connection(_)) => "KAFKA_CONNECTION_ERROR",
            AppError::Broker(BrokerError::Publish { .. }) => "KAFKA_PUBLISH_ERROR",
            AppError::Broker(BrokerError::Shutdown { .. }) => "KAFKA_SHUTDOWN_ERROR",
            AppError::Broker(_) => "KAFKA_ERROR",
            AppError::Push(PushError::Partial { .. }) => "PUSH_PARTIAL_FAILURE",
            AppError::Push(_) => "PUSH_ERROR",
            #[cfg(feature = "redis")]
            AppError::Redis(_) => "REDIS_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }
}
