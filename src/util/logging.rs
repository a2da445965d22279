//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; binaries and tests decide where
//! they go. `LUMEN_LOG` overrides the filter (same syntax as `RUST_LOG`).

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "LUMEN_LOG";

/// Install a global fmt subscriber.
///
/// `default_filter` is used when `LUMEN_LOG` is unset or invalid. Returns
/// false if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}

/// Install a Chrome trace-event writer when `LUMEN_TRACE=1`.
///
/// The returned guard flushes `trace.json` on drop.
#[cfg(feature = "chrome-trace")]
pub fn init_chrome_tracing() -> Option<tracing_chrome::FlushGuard> {
    if std::env::var("LUMEN_TRACE").ok().as_deref() != Some("1") {
        return None;
    }

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file("trace.json")
        .build();

    let subscriber = tracing_subscriber::registry().with(chrome_layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }

    Some(guard)
}
