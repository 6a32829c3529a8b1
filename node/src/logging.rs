//! Structured logging initialisation.
//!
//! [`LogFormat::Human`] writes readable lines for development,
//! [`LogFormat::Json`] newline-delimited JSON for log aggregation.
//!
//! `RUST_LOG` overrides the caller-supplied `level` (e.g. `"info"`,
//! `"debug,shelter_node=trace"`).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Install the global tracing subscriber.
///
/// The embedding binary calls this once at startup, before
/// [`ShelterNode::start`](crate::ShelterNode::start), with
/// `config.log_format()?` and `&config.log_level`. Fails if a global
/// subscriber is already set.
pub fn init_logging(format: LogFormat, level: &str) -> Result<(), NodeError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
    };
    result.map_err(|e| NodeError::Config(format!("logging already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShelterConfig;

    // Only test in this binary that installs the global subscriber.
    #[test]
    fn config_drives_logging_setup_once() {
        let config = ShelterConfig::default();
        let format = config.log_format().unwrap();
        assert_eq!(format, LogFormat::Human);

        init_logging(format, &config.log_level).unwrap();
        tracing::info!(level = %config.log_level, "logging ready");
        assert!(matches!(
            init_logging(LogFormat::Json, "debug"),
            Err(NodeError::Config(_))
        ));
    }
}
