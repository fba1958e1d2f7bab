//! End-to-end scheduler behavior against a scripted resolver pair.

use async_trait::async_trait;
use tokio_test::assert_ok;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cleargate::core::error::SolveError;
use cleargate::sched::{Priority, Scheduler, SchedulerOptions};
use cleargate::solver::{
    ChallengeResolver, Resolution, ResolveRequest, ResolverKind, SolveParams,
};

/// Scripted resolver: succeeds after an optional delay, records service
/// order, and tracks how many resolutions overlap in time.
struct MockResolver {
    kind: ResolverKind,
    delay: Duration,
    fail: bool,
    order: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockResolver {
    fn new(kind: ResolverKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            fail: false,
            order: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn order_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.order)
    }

    fn max_active_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_active)
    }
}

#[async_trait]
impl ChallengeResolver for MockResolver {
    fn kind(&self) -> ResolverKind {
        self.kind
    }

    async fn start(&self) -> Result<(), SolveError> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn resolve(&self, req: &ResolveRequest) -> Result<Resolution, SolveError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.order.lock().unwrap().push(req.url.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(SolveError::Startup("scripted failure".to_string()));
        }

        let mut res = Resolution::new(self.kind, &req.url, "mock-agent");
        res.success = true;
        Ok(res)
    }

    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn scheduler_with(
    clearance: MockResolver,
    turnstile: MockResolver,
    opts: SchedulerOptions,
) -> Scheduler {
    Scheduler::new(Box::new(clearance), Box::new(turnstile), opts)
}

fn mocks() -> (MockResolver, MockResolver) {
    (
        MockResolver::new(ResolverKind::Clearance),
        MockResolver::new(ResolverKind::Turnstile),
    )
}

async fn submit_simple(
    scheduler: &Scheduler,
    url: &str,
    priority: Priority,
) -> Result<Resolution, SolveError> {
    scheduler
        .submit(
            ResolverKind::Clearance,
            url.to_string(),
            priority,
            Duration::from_secs(30),
            SolveParams::default(),
        )
        .await
}

#[tokio::test]
async fn submit_before_start_is_rejected() {
    let (c, t) = mocks();
    let scheduler = scheduler_with(c, t, SchedulerOptions::default());
    let err = submit_simple(&scheduler, "https://a", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, SolveError::NotRunning));
}

#[tokio::test]
async fn submit_after_stop_is_rejected() {
    let (c, t) = mocks();
    let scheduler = scheduler_with(c, t, SchedulerOptions::default());
    scheduler.start().await.unwrap();
    scheduler.stop().await;
    let err = submit_simple(&scheduler, "https://a", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, SolveError::NotRunning));
}

#[tokio::test]
async fn double_stop_is_a_no_op() {
    let (c, t) = mocks();
    let scheduler = scheduler_with(c, t, SchedulerOptions::default());
    scheduler.start().await.unwrap();
    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn successful_resolution_round_trips() {
    let (c, t) = mocks();
    let scheduler = scheduler_with(c, t, SchedulerOptions::default());
    scheduler.start().await.unwrap();

    let res = tokio_test::assert_ok!(submit_simple(&scheduler, "https://a", Priority::Normal).await);
    assert!(res.success);
    assert_eq!(res.url, "https://a");
    assert!(res.worker.is_some());

    let stats = scheduler.get_stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.clearance_requests, 1);

    scheduler.stop().await;
}

#[tokio::test]
async fn resolver_error_reaches_the_submitter_and_scheduler_survives() {
    let (c, t) = mocks();
    let scheduler = scheduler_with(c.failing(), t, SchedulerOptions::default());
    scheduler.start().await.unwrap();

    let err = submit_simple(&scheduler, "https://a", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, SolveError::Startup(_)));

    // The worker pool keeps serving after a failed request.
    let err2 = submit_simple(&scheduler, "https://b", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err2, SolveError::Startup(_)));

    let stats = scheduler.get_stats();
    assert_eq!(stats.failed, 2);

    scheduler.stop().await;
}

#[tokio::test]
async fn same_kind_requests_never_overlap() {
    let clearance =
        MockResolver::new(ResolverKind::Clearance).with_delay(Duration::from_millis(50));
    let max_active = clearance.max_active_handle();

    let (_, t) = mocks();
    let scheduler = Arc::new(scheduler_with(
        clearance,
        t,
        SchedulerOptions {
            worker_count: 4,
            max_concurrent: 10,
        },
    ));
    scheduler.start().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            submit_simple(&scheduler, &format!("https://req-{}", i), Priority::Normal).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().success);
    }

    // Four workers raced, but the per-session gate kept the browser serial.
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    let stats = scheduler.get_stats();
    assert_eq!(stats.completed, 4);

    scheduler.stop().await;
}

#[tokio::test]
async fn priority_governs_service_order() {
    // One slow first request pins the single worker while the rest queue up.
    let clearance =
        MockResolver::new(ResolverKind::Clearance).with_delay(Duration::from_millis(100));
    let order = clearance.order_log();

    let (_, t) = mocks();
    let scheduler = Arc::new(scheduler_with(
        clearance,
        t,
        SchedulerOptions {
            worker_count: 1,
            max_concurrent: 10,
        },
    ));
    scheduler.start().await.unwrap();

    let first = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { submit_simple(&scheduler, "https://first", Priority::Normal).await })
    };
    // Let the worker pick up the first request before the rest arrive.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut rest = Vec::new();
    for (url, priority) in [
        ("https://low", Priority::Low),
        ("https://high", Priority::High),
        ("https://normal", Priority::Normal),
    ] {
        let scheduler = Arc::clone(&scheduler);
        rest.push(tokio::spawn(async move {
            submit_simple(&scheduler, url, priority).await
        }));
        // Deterministic arrival order.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(first.await.unwrap().unwrap().success);
    for handle in rest {
        assert!(handle.await.unwrap().unwrap().success);
    }

    let served = order.lock().unwrap().clone();
    assert_eq!(
        served,
        vec![
            "https://first".to_string(),
            "https://high".to_string(),
            "https://normal".to_string(),
            "https://low".to_string(),
        ]
    );

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stalled_resolver_times_the_submitter_out() {
    // The resolver sleeps far past the budget; the submitter gives up after
    // timeout plus grace while the work is simply abandoned, not cancelled.
    let clearance =
        MockResolver::new(ResolverKind::Clearance).with_delay(Duration::from_secs(10_000));
    let (_, t) = mocks();
    let scheduler = scheduler_with(clearance, t, SchedulerOptions::default());
    scheduler.start().await.unwrap();

    let err = scheduler
        .submit(
            ResolverKind::Clearance,
            "https://stalled".to_string(),
            Priority::Normal,
            Duration::from_secs(5),
            SolveParams::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SolveError::SchedulerTimeout(_)));

    scheduler.stop().await;
}

#[tokio::test]
async fn kinds_route_to_their_own_resolver() {
    let clearance = MockResolver::new(ResolverKind::Clearance);
    let turnstile = MockResolver::new(ResolverKind::Turnstile);
    let clearance_order = clearance.order_log();
    let turnstile_order = turnstile.order_log();

    let scheduler = scheduler_with(clearance, turnstile, SchedulerOptions::default());
    scheduler.start().await.unwrap();

    scheduler
        .submit(
            ResolverKind::Turnstile,
            "https://widget".to_string(),
            Priority::Normal,
            Duration::from_secs(30),
            SolveParams::default(),
        )
        .await
        .unwrap();
    submit_simple(&scheduler, "https://page", Priority::Normal)
        .await
        .unwrap();

    assert_eq!(*clearance_order.lock().unwrap(), vec!["https://page"]);
    assert_eq!(*turnstile_order.lock().unwrap(), vec!["https://widget"]);

    let stats = scheduler.get_stats();
    assert_eq!(stats.clearance_requests, 1);
    assert_eq!(stats.turnstile_requests, 1);

    scheduler.stop().await;
}
