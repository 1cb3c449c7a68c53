use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

/// Receives human-readable progress notes ("Analyzing ID…", fallback notices).
///
/// Implementations must return quickly and must not block.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, message: &str);
}

pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage(&self, _message: &str) {}
}

pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_stage(&self, message: &str) {
        info!("🎬 {}", message);
    }
}

/// Collects notes so an HTTP response can return them; also mirrors them to tracing.
#[derive(Clone, Default)]
pub struct StageLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl StageLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl StageObserver for StageLog {
    fn on_stage(&self, message: &str) {
        TracingObserver.on_stage(message);
        self.lines.lock().push(message.to_string());
    }
}

/// Forwards to the observer, swallowing any panic so reporting never alters control flow.
pub(crate) fn emit(observer: &dyn StageObserver, message: &str) {
    if catch_unwind(AssertUnwindSafe(|| observer.on_stage(message))).is_err() {
        warn!("stage observer panicked on '{}'", message);
    }
}
