use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::error::SolveError;
use crate::sched::envelope::Envelope;
use crate::sched::queue::{DispatchQueue, Priority};
use crate::sched::stats::{SchedulerStats, StatsSnapshot};
use crate::solver::cookies::important_cookies;
use crate::solver::{ChallengeResolver, Resolution, ResolverKind, SolveParams};

/// Extra time a submitter waits past the request timeout before giving up on
/// the result channel. Covers queueing delay and the worker's final
/// bookkeeping for a request that used its whole budget.
const RESULT_GRACE: Duration = Duration::from_secs(10);

/// How long an idle worker parks on the queue before re-checking shutdown.
const DEQUEUE_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub worker_count: usize,
    pub max_concurrent: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            worker_count: 5,
            max_concurrent: 10,
        }
    }
}

/// One resolver plus the lock that serializes requests onto its browser
/// session. Workers of either kind contend on the gate, never on the session.
struct ResolverSlot {
    resolver: Box<dyn ChallengeResolver>,
    gate: Mutex<()>,
}

impl ResolverSlot {
    fn new(resolver: Box<dyn ChallengeResolver>) -> Self {
        Self {
            resolver,
            gate: Mutex::new(()),
        }
    }
}

struct Core {
    queue: DispatchQueue,
    clearance: ResolverSlot,
    turnstile: ResolverSlot,
    admission: Semaphore,
    running: AtomicBool,
    stats: SchedulerStats,
}

impl Core {
    fn slot(&self, kind: ResolverKind) -> &ResolverSlot {
        match kind {
            ResolverKind::Clearance => &self.clearance,
            ResolverKind::Turnstile => &self.turnstile,
        }
    }
}

/// Owns the worker pool and both resolver sessions. Requests enter through
/// [`Scheduler::submit`] and come back over a oneshot; a caller that stops
/// waiting abandons its result but never cancels the in-flight work.
pub struct Scheduler {
    core: Arc<Core>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    opts: SchedulerOptions,
}

impl Scheduler {
    pub fn new(
        clearance: Box<dyn ChallengeResolver>,
        turnstile: Box<dyn ChallengeResolver>,
        opts: SchedulerOptions,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                queue: DispatchQueue::new(),
                clearance: ResolverSlot::new(clearance),
                turnstile: ResolverSlot::new(turnstile),
                admission: Semaphore::new(opts.max_concurrent.max(1)),
                running: AtomicBool::new(false),
                stats: SchedulerStats::new(),
            }),
            workers: std::sync::Mutex::new(Vec::new()),
            opts,
        }
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Bring up both resolver sessions and spawn the worker pool. If the
    /// second session fails to start, the first is torn down again.
    pub async fn start(&self) -> Result<(), SolveError> {
        if self.core.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return Ok(());
        }

        if let Err(e) = self.core.clearance.resolver.start().await {
            self.core.running.store(false, Ordering::SeqCst);
            return Err(SolveError::Startup(format!("clearance resolver: {}", e)));
        }
        if let Err(e) = self.core.turnstile.resolver.start().await {
            self.core.clearance.resolver.stop().await;
            self.core.running.store(false, Ordering::SeqCst);
            return Err(SolveError::Startup(format!("turnstile resolver: {}", e)));
        }

        // No point running more workers than admission allows.
        let pool = self.opts.worker_count.min(self.opts.max_concurrent).max(1);
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..pool {
            let core = Arc::clone(&self.core);
            workers.push(tokio::spawn(worker_loop(core, worker_id)));
        }
        info!("scheduler started with {} workers", pool);
        Ok(())
    }

    /// Stop accepting work, wind down the workers, and close both sessions.
    /// Idempotent.
    pub async fn stop(&self) {
        if !self.core.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.core.queue.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in handles {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("worker task panicked during shutdown: {}", e);
                }
            }
        }

        self.core.clearance.resolver.stop().await;
        self.core.turnstile.resolver.stop().await;
        info!("scheduler stopped");
    }

    /// Enqueue a request and wait for its result. The wait is bounded by the
    /// request timeout plus a fixed grace; exceeding it returns
    /// [`SolveError::SchedulerTimeout`] while the work itself keeps running
    /// to completion.
    pub async fn submit(
        &self,
        kind: ResolverKind,
        url: String,
        priority: Priority,
        timeout: Duration,
        params: SolveParams,
    ) -> Result<Resolution, SolveError> {
        if !self.is_running() {
            return Err(SolveError::NotRunning);
        }

        let (tx, rx) = oneshot::channel();
        let envelope = Envelope::new(kind, url, priority, timeout, params, tx);
        debug!(
            "submitting {} request {} at {:?} priority",
            kind, envelope.id, priority
        );
        self.core.stats.record_submitted(kind);
        self.core.queue.push(envelope);

        let wait = timeout + RESULT_GRACE;
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SolveError::ResultChannelClosed),
            Err(_) => Err(SolveError::SchedulerTimeout(wait)),
        }
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot(self.is_running(), self.core.queue.len())
    }
}

async fn worker_loop(core: Arc<Core>, worker_id: usize) {
    debug!("worker {} started", worker_id);
    while core.running.load(Ordering::SeqCst) {
        let Some(envelope) = core.queue.pop_timeout(DEQUEUE_WAIT).await else {
            continue;
        };

        let Ok(_permit) = core.admission.acquire().await else {
            break;
        };

        let slot = core.slot(envelope.kind);
        // Only one request at a time touches a given browser session.
        let _gate = slot.gate.lock().await;

        let req = crate::solver::ResolveRequest {
            id: envelope.id,
            url: envelope.url.clone(),
            timeout: envelope.timeout,
            params: envelope.params.clone(),
        };
        let started = std::time::Instant::now();
        let mut result = slot.resolver.resolve(&req).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = slot.resolver.reset().await {
            debug!("session reset failed after request {}: {}", envelope.id, e);
        }

        let success = match &mut result {
            Ok(res) => {
                res.processing_time_ms = elapsed_ms;
                res.worker = Some(worker_id);
                res.important_cookies = important_cookies(&res.all_cookies);
                res.success
            }
            Err(e) => {
                warn!("request {} failed: {}", envelope.id, e);
                false
            }
        };
        core.stats.record_finished(success, elapsed_ms);

        let id = envelope.id;
        if envelope.complete(result).is_err() {
            debug!("caller stopped waiting for request {}", id);
        }
    }
    debug!("worker {} exiting", worker_id);
}
