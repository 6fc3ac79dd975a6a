//! Tracing setup
//!
//! `RUST_LOG` wins when set; otherwise the crate logs at the configured
//! level and dependencies at `info`. `json` output suits log collectors on
//! scheduled runs, `text` suits terminals.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{LifecycleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LifecycleError::InvalidConfig(format!(
                "LOG_FORMAT must be text or json, got {:?}",
                other
            ))),
        }
    }
}

/// Default filter directive for a level
pub fn default_directive(log_level: &str) -> String {
    format!("fsx_lifecycle={},info", log_level)
}

/// Install the global subscriber
pub fn init(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
    }
}
