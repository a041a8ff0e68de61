use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use fiber_error::{AppError, AppResult, BrokerError, PushError};

pub mod kafka;
pub mod push;

/// Installs the global tracing subscriber (EnvFilter + fmt layer).
///
/// Binaries call this once at startup; libraries never do.
pub fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Interrupt handlers used for graceful shutdown.
///
/// Handlers are armed by `install`; a signal delivered any time after it
/// returns is observed by `recv`.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Installs SIGINT and SIGTERM handlers (Ctrl-C only on non-unix platforms).
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Waits for the next interrupt.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => info!("SIGINT received, initiating graceful shutdown..."),
                _ = self.terminate.recv() => info!("SIGTERM received, initiating graceful shutdown..."),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received, initiating graceful shutdown...");
        }
    }
}
