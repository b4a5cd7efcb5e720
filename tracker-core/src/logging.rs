//! Logging setup.
//!
//! Filter selection:
//! - `RUST_LOG` if set
//! - otherwise `info`, or `info,tracker_core=debug` with `TRACKER_DEBUG=1`

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directive used when `TRACKER_DEBUG=1`.
const DEBUG_DIRECTIVE: &str = "info,tracker_core=debug";

/// Install a stdout subscriber. Returns `false` if one was already set.
pub fn init() -> bool {
    let debug_logging = std::env::var("TRACKER_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_logging)));

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    let installed = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(debug_logging, "tracker logging initialized");
    }
    installed
}

fn default_directive(debug_logging: bool) -> &'static str {
    if debug_logging {
        DEBUG_DIRECTIVE
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "info,tracker_core=debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        assert!(!init());
    }
}
