use async_trait::async_trait;
use fiber_config::PushConfig;
use fiber_error::PushError;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{
    AndroidConfig, ApnsConfig, BatchResponse, MulticastMessage, Notification, SendResponse,
};

/// FCM accepts at most this many tokens per multicast
pub const MAX_MULTICAST_TOKENS: usize = 500;

/// A push gateway able to fan one message out to many device tokens
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_each(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError>;
}

/// FCM HTTP v1 client
#[derive(Clone)]
pub struct FcmClient {
    http_client: reqwest::Client,
    config: PushConfig,
}

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "is_empty_map")]
    data: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<&'a Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android: Option<&'a AndroidConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    apns: Option<&'a ApnsConfig>,
}

fn is_empty_map(map: &&BTreeMap<String, String>) -> bool {
    map.is_empty()
}

#[derive(Deserialize)]
struct FcmResponse {
    name: String,
}

impl FcmClient {
    pub fn new(config: PushConfig) -> Result<Self, PushError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PushError::NotConfigured(format!("failed to create HTTP client: {}", e)))?;

        if config.enabled {
            info!(project_id = %config.project_id, "FCM client initialized");
        } else {
            info!("Push notifications are disabled - FCM client will skip sends");
        }

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project_id
        )
    }

    /// Posts one message, returning the message name assigned by FCM
    async fn post_message(&self, url: &str, request: &FcmRequest<'_>) -> Result<String, String> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, body));
        }

        response
            .json::<FcmResponse>()
            .await
            .map(|r| r.name)
            .map_err(|e| e.to_string())
    }

    async fn send_one(&self, url: &str, message: &MulticastMessage, token: &str) -> SendResponse {
        let request = FcmRequest {
            message: FcmMessage {
                token,
                data: &message.data,
                notification: message.notification.as_ref(),
                android: message.android.as_ref(),
                apns: message.apns.as_ref(),
            },
        };

        let outcome = self.post_message(url, &request).await;

        match outcome {
            Ok(message_id) => SendResponse {
                token: token.to_string(),
                message_id: Some(message_id),
                error: None,
            },
            Err(error) => {
                debug!(error = %error, "FCM rejected notification");
                SendResponse {
                    token: token.to_string(),
                    message_id: None,
                    error: Some(error),
                }
            }
        }
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send_each(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError> {
        if message.tokens.is_empty() {
            return Err(PushError::Send("tokens must not be empty".to_string()));
        }
        if message.tokens.len() > MAX_MULTICAST_TOKENS {
            return Err(PushError::Send(format!(
                "at most {} tokens are allowed, got {}",
                MAX_MULTICAST_TOKENS,
                message.tokens.len()
            )));
        }

        if !self.config.enabled {
            debug!(tokens = message.tokens.len(), "Push disabled - skipping notification send");
            return Ok(BatchResponse::default());
        }

        let url = self.send_url();
        let responses = join_all(
            message
                .tokens
                .iter()
                .map(|token| self.send_one(&url, message, token)),
        )
        .await;

        Ok(BatchResponse::from_responses(responses))
    }
}
