use serde::Serialize;
use std::sync::Mutex;

use crate::solver::ResolverKind;

#[derive(Debug, Default)]
struct Tallies {
    submitted: u64,
    completed: u64,
    failed: u64,
    clearance_requests: u64,
    turnstile_requests: u64,
    avg_processing_time_ms: f64,
}

/// Running counters maintained by the scheduler.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    inner: Mutex<Tallies>,
}

/// Point-in-time view served by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub queued: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub clearance_requests: u64,
    pub turnstile_requests: u64,
    pub avg_processing_time_ms: f64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self, kind: ResolverKind) {
        let mut t = self.inner.lock().unwrap();
        t.submitted += 1;
        match kind {
            ResolverKind::Clearance => t.clearance_requests += 1,
            ResolverKind::Turnstile => t.turnstile_requests += 1,
        }
    }

    /// Record a finished request. `success` means a successful resolution;
    /// domain failures and infrastructure errors both count as failed.
    pub fn record_finished(&self, success: bool, processing_time_ms: u64) {
        let mut t = self.inner.lock().unwrap();
        if success {
            t.completed += 1;
        } else {
            t.failed += 1;
        }
        let n = (t.completed + t.failed) as f64;
        t.avg_processing_time_ms =
            (t.avg_processing_time_ms * (n - 1.0) + processing_time_ms as f64) / n;
    }

    pub fn snapshot(&self, running: bool, queued: usize) -> StatsSnapshot {
        let t = self.inner.lock().unwrap();
        StatsSnapshot {
            running,
            queued,
            submitted: t.submitted,
            completed: t.completed,
            failed: t.failed,
            clearance_requests: t.clearance_requests,
            turnstile_requests: t.turnstile_requests,
            avg_processing_time_ms: t.avg_processing_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_over_mixed_outcomes() {
        let stats = SchedulerStats::new();
        stats.record_submitted(ResolverKind::Clearance);
        stats.record_submitted(ResolverKind::Turnstile);
        stats.record_submitted(ResolverKind::Clearance);
        stats.record_finished(true, 100);
        stats.record_finished(false, 300);
        stats.record_finished(true, 200);

        let snap = stats.snapshot(true, 0);
        assert_eq!(snap.submitted, 3);
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.clearance_requests, 2);
        assert_eq!(snap.turnstile_requests, 1);
        assert!((snap.avg_processing_time_ms - 200.0).abs() < f64::EPSILON);
    }
}
