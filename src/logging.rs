//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "REPAIRLOOP_LOG";

/// Initialize the process-wide subscriber.
///
/// Reads [`LOG_ENV`] (e.g. `REPAIRLOOP_LOG=repairloop::mining=debug`) and
/// falls back to `repairloop=info`. Logs go to stderr so JSON printed on
/// stdout by the CLI stays machine-readable. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("repairloop=info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}
