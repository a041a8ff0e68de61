// ============================================================================
// Push Gateway Configuration
// ============================================================================

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

/// Firebase Cloud Messaging (HTTP v1) settings
#[derive(Clone, Debug)]
pub struct PushConfig {
    /// Whether push sending is enabled (false = log and skip)
    pub enabled: bool,
    /// Firebase project id
    pub project_id: String,
    /// OAuth2 bearer token for the FCM API
    pub access_token: String,
    /// Base URL of the FCM API
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: String::new(),
            access_token: String::new(),
            endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl PushConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let enabled = std::env::var("PUSH_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let project_id = std::env::var("FCM_PROJECT_ID").unwrap_or_default();
        let access_token = std::env::var("FCM_ACCESS_TOKEN").unwrap_or_default();

        if enabled && (project_id.is_empty() || access_token.is_empty()) {
            anyhow::bail!("FCM_PROJECT_ID and FCM_ACCESS_TOKEN are required when PUSH_ENABLED=true");
        }

        Ok(Self {
            enabled,
            project_id,
            access_token,
            endpoint: std::env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_FCM_ENDPOINT.to_string()),
            request_timeout_secs: std::env::var("FCM_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        })
    }
}
