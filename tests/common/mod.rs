#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sandcastle::config::ExecutionConfig;
use sandcastle::exec::{EngineState, ExecutionController};
use sandcastle_test_utils::builders::fast_execution_config;
use sandcastle_test_utils::fake_engine::FakeLauncher;

pub use sandcastle_test_utils::{init_tracing, with_timeout};

/// Controller over a fresh fake launcher with short deadlines.
pub fn fake_controller() -> (Arc<ExecutionController>, Arc<FakeLauncher>) {
    fake_controller_with(fast_execution_config())
}

pub fn fake_controller_with(
    config: ExecutionConfig,
) -> (Arc<ExecutionController>, Arc<FakeLauncher>) {
    init_tracing();
    let launcher = FakeLauncher::new();
    let controller = Arc::new(ExecutionController::new(launcher.clone(), &config));
    (controller, launcher)
}

/// Yield until the controller reports `state`.
pub async fn wait_for_state(controller: &ExecutionController, state: EngineState) {
    while controller.state() != state {
        tokio::task::yield_now().await;
    }
}

/// Shared string an output sink can append to.
pub fn capture() -> (Arc<Mutex<String>>, impl Fn(&str) + Send + Sync + 'static) {
    let buf = Arc::new(Mutex::new(String::new()));
    let sink_buf = Arc::clone(&buf);
    let sink = move |chunk: &str| sink_buf.lock().unwrap().push_str(chunk);
    (buf, sink)
}
