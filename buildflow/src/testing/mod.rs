//! Test doubles and helpers for exercising the orchestration contract.

mod fake;

pub use fake::FakeCluster;

use std::sync::Once;

/// Initializes tracing output for tests, once per process.
///
/// Honors `RUST_LOG`; defaults to silence.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
