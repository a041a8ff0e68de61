use fiber_config::KafkaConfig;
use fiber_error::BrokerError;
use rdkafka::config::ClientConfig;
use std::time::Duration;
use tracing::info;

/// Validated broker configuration shared by all producers and consumers of a
/// client.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    settings: KafkaConfig,
}

impl BrokerConfig {
    /// Configuration with default client settings for the given brokers.
    pub fn new<I, S>(brokers: I) -> Result<Self, BrokerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_settings(KafkaConfig {
            brokers: brokers.into_iter().map(Into::into).collect(),
            ..KafkaConfig::default()
        })
    }

    /// Validates settings loaded from the environment.
    pub fn from_settings(settings: KafkaConfig) -> Result<Self, BrokerError> {
        if settings.brokers.is_empty() {
            return Err(BrokerError::InvalidConfig(
                "at least one broker address is required".to_string(),
            ));
        }
        if let Some(blank) = settings.brokers.iter().position(|b| b.trim().is_empty()) {
            return Err(BrokerError::InvalidConfig(format!(
                "broker address #{} is blank",
                blank
            )));
        }
        if settings.session_buffer == 0 {
            return Err(BrokerError::InvalidConfig(
                "session buffer must be greater than zero".to_string(),
            ));
        }
        Ok(Self { settings })
    }

    pub fn brokers(&self) -> &[String] {
        &self.settings.brokers
    }

    /// Brokers joined the way librdkafka expects them
    pub fn bootstrap_servers(&self) -> String {
        self.settings.brokers.join(",")
    }

    pub fn settings(&self) -> &KafkaConfig {
        &self.settings
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.producer_delivery_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.metadata_timeout_ms)
    }
}

/// Creates the `rdkafka` client configuration common to producers and
/// consumers: bootstrap servers, client id and TLS/SASL settings.
pub fn create_client_config(config: &BrokerConfig) -> ClientConfig {
    let settings = config.settings();

    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("client.id", &settings.client_id);

    // Default to plaintext if SSL is not explicitly enabled and no SASL.
    client_config.set("security.protocol", "plaintext");

    if settings.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &settings.sasl_mechanism,
        &settings.sasl_username,
        &settings.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password)
            .set(
                "security.protocol",
                if settings.ssl_enabled {
                    "sasl_ssl"
                } else {
                    "sasl_plaintext"
                },
            );
    }

    client_config
}

/// Every publish waits for all in-sync replicas
pub const PRODUCER_ACKS: &str = "all";
/// Transport-level retry budget for a single publish
pub const PRODUCER_RETRIES: u32 = 5;

/// Producer settings: wait for all in-sync replicas, bounded retries,
/// delivery reports for every message. Acks and retries are not
/// configurable.
pub fn create_producer_config(config: &BrokerConfig) -> ClientConfig {
    let settings = config.settings();
    let mut client_config = create_client_config(config);
    client_config
        .set("acks", PRODUCER_ACKS)
        .set("retries", PRODUCER_RETRIES.to_string())
        .set(
            "message.timeout.ms",
            settings.producer_delivery_timeout_ms.to_string(),
        )
        .set("delivery.report.only.error", "false");
    client_config
}

/// Consumer settings for a single assigned partition: no group offsets are
/// committed and errors are surfaced to the caller.
pub fn create_consumer_config(config: &BrokerConfig, group_id: &str) -> ClientConfig {
    let mut client_config = create_client_config(config);
    client_config
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "latest")
        .set("enable.partition.eof", "false");
    client_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_broker_list() {
        let result = BrokerConfig::new(Vec::<String>::new());
        assert!(matches!(result, Err(BrokerError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_blank_broker() {
        let result = BrokerConfig::new(["kafka1:9092", "  "]);
        assert!(matches!(result, Err(BrokerError::InvalidConfig(_))));
    }

    #[test]
    fn test_bootstrap_servers_keep_order() {
        let config = BrokerConfig::new(["kafka2:9092", "kafka1:9092"]).unwrap();
        assert_eq!(config.bootstrap_servers(), "kafka2:9092,kafka1:9092");
    }

    #[test]
    fn test_producer_config_requires_all_acks_and_five_retries() {
        let config = BrokerConfig::from_settings(KafkaConfig {
            brokers: vec!["localhost:9092".to_string()],
            producer_delivery_timeout_ms: 1_000,
            ..KafkaConfig::default()
        })
        .unwrap();
        let client_config = create_producer_config(&config);
        assert_eq!(client_config.get("acks"), Some("all"));
        assert_eq!(client_config.get("retries"), Some("5"));
        assert_eq!(client_config.get("message.timeout.ms"), Some("1000"));
        assert_eq!(
            client_config.get("bootstrap.servers"),
            Some("localhost:9092")
        );
    }

    #[test]
    fn test_sasl_over_ssl() {
        let config = BrokerConfig::from_settings(KafkaConfig {
            ssl_enabled: true,
            sasl_mechanism: Some("PLAIN".to_string()),
            sasl_username: Some("user".to_string()),
            sasl_password: Some("pass".to_string()),
            ..KafkaConfig::default()
        })
        .unwrap();
        let client_config = create_consumer_config(&config, "group");
        assert_eq!(client_config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client_config.get("group.id"), Some("group"));
        assert_eq!(client_config.get("enable.auto.commit"), Some("false"));
    }
}
