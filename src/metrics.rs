//! In-process request metrics, rendered in the Prometheus text format.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const REQUEST_COUNT: &str = "dicom_deidentifier_http_request_count";
pub const REQUEST_SECONDS: &str = "dicom_deidentifier_http_request_seconds";
pub const ERROR_COUNT: &str = "dicomdeidentifier_http_error_count";

#[derive(Default)]
struct RequestStats {
    count: AtomicU64,
    micros: AtomicU64,
}

/// Request counters keyed by (method, route) and error counters keyed by error code
#[derive(Clone, Default)]
pub struct Metrics {
    requests: Arc<DashMap<(String, String), RequestStats>>,
    errors: Arc<DashMap<String, AtomicU64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, method: &str, path: &str, elapsed: Duration) {
        let stats = self
            .requests
            .entry((method.to_string(), path.to_string()))
            .or_default();
        stats.count.fetch_add(1, Ordering::Relaxed);
        stats
            .micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self, code: &str) {
        self.errors
            .entry(code.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self, method: &str, path: &str) -> u64 {
        self.requests
            .get(&(method.to_string(), path.to_string()))
            .map(|s| s.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn error_count(&self, code: &str) -> u64 {
        self.errors
            .get(code)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render every series in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut requests: Vec<(String, String, u64, u64)> = self
            .requests
            .iter()
            .map(|entry| {
                let (method, path) = entry.key();
                (
                    method.clone(),
                    path.clone(),
                    entry.count.load(Ordering::Relaxed),
                    entry.micros.load(Ordering::Relaxed),
                )
            })
            .collect();
        requests.sort();

        let mut errors: Vec<(String, u64)> = self
            .errors
            .iter()
            .map(|entry| (entry.key().clone(), entry.load(Ordering::Relaxed)))
            .collect();
        errors.sort();

        let mut out = String::new();
        let _ = writeln!(out, "# HELP {} Total number of requests by route", REQUEST_COUNT);
        let _ = writeln!(out, "# TYPE {} counter", REQUEST_COUNT);
        for (method, path, count, _) in &requests {
            let _ = writeln!(
                out,
                "{}{{method=\"{}\",path=\"{}\"}} {}",
                REQUEST_COUNT, method, path, count
            );
        }

        let _ = writeln!(out, "# HELP {} Total time spent serving requests by route", REQUEST_SECONDS);
        let _ = writeln!(out, "# TYPE {} counter", REQUEST_SECONDS);
        for (method, path, _, micros) in &requests {
            let _ = writeln!(
                out,
                "{}{{method=\"{}\",path=\"{}\"}} {:.6}",
                REQUEST_SECONDS,
                method,
                path,
                *micros as f64 / 1_000_000.0
            );
        }

        let _ = writeln!(out, "# HELP {} Total number of errors by error code", ERROR_COUNT);
        let _ = writeln!(out, "# TYPE {} counter", ERROR_COUNT);
        for (code, count) in &errors {
            let _ = writeln!(out, "{}{{code=\"{}\"}} {}", ERROR_COUNT, code, count);
        }

        out
    }
}
