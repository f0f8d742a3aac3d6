//! Structured logging bootstrap, gated on XAIFORGE_ENABLE_LOGGING

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber once when `XAIFORGE_ENABLE_LOGGING=1`.
/// `XAIFORGE_LOG_LEVEL` picks the default level and `XAIFORGE_LOG_FORMAT=json`
/// switches to JSON output.
pub fn configure_from_env() {
    static INIT: Once = Once::new();
    if std::env::var("XAIFORGE_ENABLE_LOGGING").as_deref() != Ok("1") {
        return;
    }
    INIT.call_once(|| {
        let level = std::env::var("XAIFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()));
        let format = std::env::var("XAIFORGE_LOG_FORMAT").unwrap_or_default();
        if format.eq_ignore_ascii_case("json") {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    });
}
