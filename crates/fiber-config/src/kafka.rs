// ============================================================================
// Kafka Configuration
// ============================================================================

/// Kafka connection and client settings
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Broker addresses, in the order they were configured
    pub brokers: Vec<String>,
    /// Client id reported to the brokers
    pub client_id: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    // producer-specific settings (acks and retries are fixed by the client)
    pub producer_delivery_timeout_ms: u64,
    // consumer-specific settings
    /// Prefix for the throwaway group id each partition consumer gets
    pub consumer_group_prefix: String,
    /// Timeout for the metadata lookup done when a session is opened
    pub metadata_timeout_ms: u64,
    /// Capacity of the message and error buffers of a consumer session
    pub session_buffer: usize,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "fiber-common".to_string(),
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            producer_delivery_timeout_ms: 30_000,
            consumer_group_prefix: "fiber-worker".to_string(),
            metadata_timeout_ms: 10_000,
            session_buffer: 256,
        }
    }
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brokers: std::env::var("KAFKA_BROKERS")
                .map(|raw| parse_broker_list(&raw))
                .unwrap_or(defaults.brokers),
            client_id: std::env::var("KAFKA_CLIENT_ID").unwrap_or(defaults.client_id),
            ssl_enabled: std::env::var("KAFKA_SSL_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            producer_delivery_timeout_ms: std::env::var("KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(defaults.producer_delivery_timeout_ms),
            consumer_group_prefix: std::env::var("KAFKA_CONSUMER_GROUP_PREFIX")
                .unwrap_or(defaults.consumer_group_prefix),
            metadata_timeout_ms: std::env::var("KAFKA_METADATA_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(defaults.metadata_timeout_ms),
            session_buffer: std::env::var("KAFKA_SESSION_BUFFER")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(defaults.session_buffer),
        }
    }
}

/// Splits a comma-separated broker list, dropping blank entries.
pub fn parse_broker_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
