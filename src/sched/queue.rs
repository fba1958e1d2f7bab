use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::sched::envelope::Envelope;

/// Request priority. Higher variants are served first; ties fall back to
/// arrival order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Shared priority queue the workers pull from. `Notify` wakes one sleeping
/// worker per push; a stored permit covers the race where the push lands
/// before the worker starts waiting.
pub struct DispatchQueue {
    heap: Mutex<BinaryHeap<Envelope>>,
    notify: Notify,
    seq: AtomicU64,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn push(&self, mut envelope: Envelope) {
        envelope.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().unwrap().push(envelope);
        self.notify.notify_one();
    }

    /// Pop the highest-priority envelope, waiting up to `wait` for one to
    /// arrive. Returns `None` on timeout so callers can re-check shutdown.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<Envelope> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            // Arm the wakeup before checking the heap so a concurrent push
            // cannot slip between the check and the wait.
            let notified = self.notify.notified();
            if let Some(envelope) = self.heap.lock().unwrap().pop() {
                return Some(envelope);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().unwrap().is_empty()
    }

    /// Wake every waiting worker, used at shutdown.
    pub fn notify_waiters(&self) {
        self.notify.notify_waiters();
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{ResolverKind, SolveParams};
    use tokio::sync::oneshot;

    fn envelope(priority: Priority, url: &str) -> Envelope {
        let (tx, _rx) = oneshot::channel();
        Envelope::new(
            ResolverKind::Clearance,
            url.to_string(),
            priority,
            Duration::from_secs(30),
            SolveParams::default(),
            tx,
        )
    }

    #[test]
    fn priority_variants_order_low_to_critical() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[tokio::test]
    async fn higher_priority_pops_first() {
        let queue = DispatchQueue::new();
        queue.push(envelope(Priority::Low, "low"));
        queue.push(envelope(Priority::Critical, "critical"));
        queue.push(envelope(Priority::Normal, "normal"));
        queue.push(envelope(Priority::High, "high"));

        let order: Vec<String> = [0; 4]
            .iter()
            .map(|_| queue.heap.lock().unwrap().pop().unwrap().url)
            .collect();
        assert_eq!(order, ["critical", "high", "normal", "low"]);
    }

    #[tokio::test]
    async fn arrival_order_breaks_ties() {
        let queue = DispatchQueue::new();
        queue.push(envelope(Priority::Normal, "first"));
        queue.push(envelope(Priority::Normal, "second"));
        queue.push(envelope(Priority::Normal, "third"));

        assert_eq!(queue.pop_timeout(Duration::from_secs(1)).await.unwrap().url, "first");
        assert_eq!(queue.pop_timeout(Duration::from_secs(1)).await.unwrap().url, "second");
        assert_eq!(queue.pop_timeout(Duration::from_secs(1)).await.unwrap().url, "third");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_times_out_with_none() {
        let queue = DispatchQueue::new();
        assert!(queue.pop_timeout(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let queue = DispatchQueue::new();
        queue.push(envelope(Priority::Normal, "early"));
        let popped = queue.pop_timeout(Duration::from_millis(10)).await;
        assert_eq!(popped.unwrap().url, "early");
    }
}
