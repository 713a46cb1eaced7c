//! Logging setup and a registry observer that traces change events.

use model::{ConductorConfig, RegistryEvent, RegistryObserver};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry initialization failed: {reason}")]
    InitializationFailed { reason: String },
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Filter from `RUST_LOG`, falling back to the configured log level.
pub fn env_filter(config: &ConductorConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global tracing subscriber. Fails if one is already installed.
pub fn init_logging(config: &ConductorConfig) -> TelemetryResult<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(config))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        TelemetryError::InitializationFailed {
            reason: format!("Failed to set tracing subscriber: {}", e),
        }
    })
}

/// Logs every registry event at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct EventTracer;

impl RegistryObserver for EventTracer {
    fn notify(&self, event: &RegistryEvent) {
        match event {
            RegistryEvent::EnvironmentsRemoved {
                source,
                environments,
            } => debug!(%source, removed = environments.len(), "environments removed"),
            RegistryEvent::EnvironmentsAdded {
                source,
                environments,
            } => debug!(%source, added = environments.len(), "environments added"),
            other => debug!(event = ?other, "registry event"),
        }
    }
}
