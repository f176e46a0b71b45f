use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Gate and auth counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub requests: Arc<AtomicU64>,
    pub rate_limited: Arc<AtomicU64>,
    pub unauthorized: Arc<AtomicU64>,
    pub csrf_rejected: Arc<AtomicU64>,
    pub registrations: Arc<AtomicU64>,
    pub logins: Arc<AtomicU64>,
    pub failed_logins: Arc<AtomicU64>,
    pub submissions: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(AtomicU64::new(0)),
            rate_limited: Arc::new(AtomicU64::new(0)),
            unauthorized: Arc::new(AtomicU64::new(0)),
            csrf_rejected: Arc::new(AtomicU64::new(0)),
            registrations: Arc::new(AtomicU64::new(0)),
            logins: Arc::new(AtomicU64::new(0)),
            failed_logins: Arc::new(AtomicU64::new(0)),
            submissions: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_csrf_rejected(&self) {
        self.csrf_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_registrations(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_logins(&self) {
        self.failed_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submissions(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            csrf_rejected: self.csrf_rejected.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            logins: self.logins.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub rate_limited: u64,
    pub unauthorized: u64,
    pub csrf_rejected: u64,
    pub registrations: u64,
    pub logins: u64,
    pub failed_logins: u64,
    pub submissions: u64,
    pub uptime_seconds: u64,
}
