//! Tracing configuration for test output.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing for tests.
///
/// Safe to call from every test; only the first call installs the
/// subscriber. Uses `RUST_LOG` if set, otherwise `info` with debug output
/// from the client crate.
pub fn init_test_tracing() {
    init_with(|| {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,tweets_twitter=debug,tweets_streaming=debug"))
    });
}

/// Initialize tracing with a specific filter.
pub fn init_test_tracing_with_filter(filter: &str) {
    init_with(|| EnvFilter::new(filter));
}

/// Initialize silent tracing, for tests that trigger errors on purpose.
pub fn init_test_tracing_silent() {
    init_with(|| EnvFilter::new("off"));
}

fn init_with(filter: impl FnOnce() -> EnvFilter) {
    INIT.call_once(|| {
        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_ansi(true)
                    .compact(),
            )
            .try_init();
    });
}
