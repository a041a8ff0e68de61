use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Push request carried over Kafka
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPushNotificationMessage {
    pub tokens: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AndroidPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidConfig {
    pub priority: AndroidPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApnsConfig {
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ApnsPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aps {
    /// 1 wakes the app in the background without showing anything
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
}

/// One notification addressed to many device tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub data: BTreeMap<String, String>,
    pub notification: Option<Notification>,
    pub android: Option<AndroidConfig>,
    pub apns: Option<ApnsConfig>,
}

impl MulticastMessage {
    /// Shapes a push request.
    ///
    /// Silent pushes are data-only with `content-available` set and low
    /// priority on both platforms. Normal pushes carry the title/body and
    /// are delivered with high priority.
    pub fn from_request(request: SendPushNotificationMessage, silent: bool) -> Self {
        let SendPushNotificationMessage {
            tokens,
            title,
            body,
            mut data,
        } = request;

        if silent {
            data.insert("content-available".to_string(), "1".to_string());
            Self {
                tokens,
                data,
                notification: None,
                android: Some(AndroidConfig {
                    priority: AndroidPriority::Normal,
                }),
                apns: Some(ApnsConfig {
                    headers: BTreeMap::from([("apns-priority".to_string(), "5".to_string())]),
                    payload: Some(ApnsPayload {
                        aps: Aps {
                            content_available: Some(1),
                        },
                    }),
                }),
            }
        } else {
            Self {
                tokens,
                data,
                notification: Some(Notification { title, body }),
                android: Some(AndroidConfig {
                    priority: AndroidPriority::High,
                }),
                apns: Some(ApnsConfig {
                    headers: BTreeMap::from([("apns-priority".to_string(), "10".to_string())]),
                    payload: None,
                }),
            }
        }
    }
}

/// Outcome for a single token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub token: String,
    /// Message name assigned by the gateway on success
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a multicast send, one response per token in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.is_success()).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}
