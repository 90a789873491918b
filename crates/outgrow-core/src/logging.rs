//! Subscriber setup for binaries. The library itself only emits events.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "OUTGROW_LOG";

const DEFAULT_FILTER: &str = "outgrow=info";

static INIT: Once = Once::new();

/// Install a stderr subscriber filtered by `OUTGROW_LOG`. Later calls are
/// no-ops, as is the first one if another subscriber is already set.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
