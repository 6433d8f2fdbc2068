//! Tracing subscriber setup

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// `RUST_LOG` wins when set; otherwise our crate and tower_http log at `level`
pub fn default_filter(level: &str) -> String {
    format!("image_previewer={level},tower_http={level}")
}

pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init()
            .map_err(|err| anyhow!(err))?,
        LogFormat::Text => registry
            .with(fmt::layer())
            .try_init()
            .map_err(|err| anyhow!(err))?,
    }

    Ok(())
}
