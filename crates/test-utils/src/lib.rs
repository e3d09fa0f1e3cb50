//! Shared helpers for transmirror's integration tests: a config builder,
//! fakes for the transformer and process seams, and tracing setup.

pub mod builders;
pub mod fake_launcher;
pub mod fake_transformer;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

pub use builders::MirrorConfigBuilder;
pub use fake_launcher::FakeLauncher;
pub use fake_transformer::FakeTransformer;

/// Upper bound for any single awaited step in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness, so it only shows up for
/// failing tests (or with `--nocapture`). `RUST_LOG` overrides the `info`
/// default.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step timed out after {TEST_TIMEOUT:?}"),
    }
}
