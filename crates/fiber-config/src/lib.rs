// ============================================================================
// Fiber Config - Centralized configuration management
// ============================================================================
//
// Loads the settings of the Kafka, Redis and push integrations from
// environment variables (and a local .env file when present).
//
// ============================================================================

mod kafka;
mod push;
mod redis;
mod worker;

pub use kafka::{parse_broker_list, KafkaConfig};
pub use push::{PushConfig, DEFAULT_FCM_ENDPOINT};
pub use redis::RedisConfig;
pub use worker::WorkerConfig;

use anyhow::Result;

/// Main configuration structure
#[derive(Clone, Debug)]
pub struct Config {
    pub rust_log: String,

    // Sub-configurations
    pub kafka: KafkaConfig,
    pub redis: RedisConfig,
    pub push: PushConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let kafka = KafkaConfig::from_env();
        if kafka.brokers.is_empty() {
            anyhow::bail!("KAFKA_BROKERS must list at least one broker address");
        }

        Ok(Self {
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            kafka,
            redis: RedisConfig::from_env(),
            push: PushConfig::from_env()?,
            worker: WorkerConfig::from_env(),
        })
    }
}
