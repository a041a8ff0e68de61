// Push Worker - Kafka to FCM bridge
// ============================================================================
//
// Consumes SendPushNotificationMessage requests from a Kafka topic and sends
// them to devices through Firebase Cloud Messaging.
//
// Flow:
// 1. Worker opens a session on partition 0 of WORKER_TOPIC (newest offset)
// 2. Each message is decoded as JSON
// 3. If the message carries a key and Redis is enabled, the key is checked
//    against push:sent:{key} so a republished request is not sent twice
// 4. The request is shaped (silent or normal) and sent to every token
// 5. Failures are logged and the worker moves on to the next message
//
// SIGINT/SIGTERM stop the worker; the session and connection are closed
// before the process exits.
//
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use fiber_common::kafka::{
    BrokerConfig, HandlerFailure, HandlerResult, InboundMessage, KafkaClient, MessageHandler,
    Processed,
};
use fiber_common::push::{send_to_tokens, FcmClient, SendPushNotificationMessage};
use fiber_config::Config;
use fiber_redis::RedisClient;
use tracing::{debug, info, warn};

/// How long a sent request key is remembered
const SENT_KEY_TTL_SECS: u64 = 24 * 60 * 60;

struct PushHandler {
    fcm: FcmClient,
    cache: Option<RedisClient>,
    silent: bool,
}

impl PushHandler {
    fn sent_key(message: &InboundMessage) -> Option<String> {
        let key = message.key.as_ref()?;
        Some(format!("push:sent:{}", String::from_utf8_lossy(key)))
    }

    async fn already_sent(&self, key: &str) -> bool {
        let Some(mut cache) = self.cache.clone() else {
            return false;
        };
        match cache.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                // Cache is an optimisation only, send anyway
                warn!(error = %e, key = %key, "Failed to check sent marker");
                false
            }
        }
    }

    async fn mark_sent(&self, key: &str) {
        if let Some(mut cache) = self.cache.clone() {
            if let Err(e) = cache.set_ex(key, 1, SENT_KEY_TTL_SECS).await {
                warn!(error = %e, key = %key, "Failed to store sent marker");
            }
        }
    }
}

#[async_trait]
impl MessageHandler for PushHandler {
    async fn handle(&self, message: &InboundMessage) -> HandlerResult {
        let request: SendPushNotificationMessage = message
            .decode_json()
            .context("invalid push notification payload")?;

        let sent_key = Self::sent_key(message);
        if let Some(key) = &sent_key {
            if self.already_sent(key).await {
                debug!(key = %key, offset = message.offset, "Push request already sent, skipping");
                return Ok(Processed);
            }
        }

        let tokens = request.tokens.len();
        send_to_tokens(&self.fcm, request, self.silent)
            .await
            .map_err(|e| HandlerFailure::from(anyhow::Error::new(e)))?;

        if let Some(key) = &sent_key {
            self.mark_sent(key).await;
        }

        info!(offset = message.offset, tokens = tokens, "Push request processed");
        Ok(Processed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    fiber_common::init_tracing(&config.rust_log);

    info!("=== Push Worker Starting ===");
    info!("Kafka Brokers: {}", config.kafka.brokers.join(","));
    info!("Worker Topic: {}", config.worker.topic);
    info!("Silent Push: {}", config.worker.silent_push);

    let client = KafkaClient::new();
    client
        .setup(BrokerConfig::from_settings(config.kafka.clone())?)
        .context("Failed to install broker config")?;

    let cache = if config.redis.enabled {
        info!("Connecting to Redis at: {}", config.redis.url_for_logging());
        let cache = RedisClient::connect(
            &config.redis.url,
            config.redis.username.as_deref(),
            config.redis.password.as_deref(),
        )
        .await
        .context("Failed to connect to Redis")?;
        Some(cache)
    } else {
        info!("Redis disabled - duplicate push requests are not filtered");
        None
    };

    let fcm = FcmClient::new(config.push.clone()).context("Failed to create FCM client")?;

    let handler = PushHandler {
        fcm,
        cache,
        silent: config.worker.silent_push,
    };

    let mut worker = client
        .worker(config.worker.topic.clone(), handler)
        .handle_signals(true);
    if let Some(limit) = config.worker.handler_timeout() {
        worker = worker.handler_timeout(limit);
    }

    let summary = worker.run().await?;
    info!(
        dispatched = summary.messages_dispatched,
        handler_failures = summary.handler_failures,
        consumer_errors = summary.consumer_errors,
        "=== Push Worker Stopped ==="
    );
    Ok(())
}
