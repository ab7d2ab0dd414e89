// Structured logging setup

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize JSON structured logging. The level comes from
/// `RUST_LOG` when set, falling back to the configured level.
///
/// Call once at process startup, before the dispatcher starts.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent_failure() {
        // First initialization in the test process may succeed or may
        // find a subscriber already installed by another test; either
        // way the second call must report the conflict, not panic.
        let _ = init_logging("info");
        assert!(init_logging("debug").is_err());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let result = EnvFilter::try_new("foo=bar=baz");
        assert!(result.is_err());
    }
}
