// Subscriber setup for binaries and tests embedding the client.

use powerflex_api::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber at `level`.
///
/// `RUST_LOG` wins over the configured level when set. Calling this a
/// second time is a no-op, so tests may call it freely.
pub fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Like [`init_logging`], emitting one JSON object per event.
pub fn init_json_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_logging(LogLevel::Debug);
        init_logging(LogLevel::Trace);
        init_json_logging(LogLevel::Info);
        init_json_logging(LogLevel::Error);
        tracing::debug!("still logging after repeated init");
    }
}
