//! Shared fixtures for sandcastle's integration tests: scripted engines and
//! hosts, state builders, and test logging.

pub mod builders;
pub mod fake_engine;
pub mod fake_host;

use std::sync::Once;
use std::time::Duration;

use sandcastle::logging::LOG_ENV_VAR;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Install a per-test tracing subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows for failing tests
/// or with `--nocapture`. The filter comes from `SANDCASTLE_LOG`, then
/// `RUST_LOG`, then `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Bound on how long a single awaited step of a test may take.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `f`, panicking if it takes longer than [`STEP_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(STEP_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("test step timed out after {STEP_TIMEOUT:?}"))
}
