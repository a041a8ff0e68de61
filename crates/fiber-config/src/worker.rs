// ============================================================================
// Worker Configuration
// ============================================================================

/// Settings of the push worker process
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Topic carrying push notification requests
    pub topic: String,
    /// Send data-only (silent) notifications
    pub silent_push: bool,
    /// Optional per-message handler timeout (0 = none)
    pub handler_timeout_ms: u64,
}

impl WorkerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            topic: std::env::var("WORKER_TOPIC")
                .unwrap_or_else(|_| "push-notifications".to_string()),
            silent_push: std::env::var("WORKER_SILENT_PUSH")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            handler_timeout_ms: std::env::var("WORKER_HANDLER_TIMEOUT_MS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
        }
    }

    pub fn handler_timeout(&self) -> Option<std::time::Duration> {
        (self.handler_timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(self.handler_timeout_ms))
    }
}
