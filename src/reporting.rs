use tracing::error;

/// Sink for unexpected errors, injected wherever internal failures are handled
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, method: &str, path: &str, message: &str);
}

/// Reports errors to the log
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, method: &str, path: &str, message: &str) {
        error!("[http] error: {} {}: {}", method, path, message);
    }
}

/// Keeps reported errors in memory so tests can inspect them
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl RecordingReporter {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ErrorReporter for RecordingReporter {
    fn report(&self, method: &str, path: &str, message: &str) {
        self.reports
            .lock()
            .unwrap()
            .push(format!("{} {}: {}", method, path, message));
    }
}
