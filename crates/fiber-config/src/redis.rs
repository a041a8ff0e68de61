// ============================================================================
// Redis Configuration
// ============================================================================

/// Cache connection settings
#[derive(Clone, Debug, Default)]
pub struct RedisConfig {
    /// Whether the cache should be connected at startup
    pub enabled: bool,
    /// Address of the Redis server ("host:port" or a redis:// URL)
    pub url: String,
    /// ACL username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
}

impl RedisConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: std::env::var("REDIS_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "127.0.0.1:6379".to_string()),
            username: std::env::var("REDIS_USERNAME").ok().filter(|s| !s.is_empty()),
            password: std::env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
        }
    }

    /// URL safe for logging (credentials masked)
    pub fn url_for_logging(&self) -> String {
        if let Some(at_pos) = self.url.find('@') {
            let protocol_end = self.url.find("://").map(|p| p + 3).unwrap_or(0);
            format!("{}***{}", &self.url[..protocol_end], &self.url[at_pos..])
        } else {
            self.url.clone()
        }
    }
}
