use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::error::SolveError;
use crate::sched::queue::Priority;
use crate::solver::{Resolution, ResolverKind, SolveParams};

/// A queued request plus its completion channel. The sender is consumed on
/// completion, so a result can only ever be delivered once.
pub struct Envelope {
    pub id: Uuid,
    pub kind: ResolverKind,
    pub url: String,
    pub priority: Priority,
    pub timeout: Duration,
    pub params: SolveParams,
    /// Monotonic sequence number, assigned at enqueue. Breaks priority ties
    /// in arrival order.
    pub(crate) seq: u64,
    tx: oneshot::Sender<Result<Resolution, SolveError>>,
}

impl Envelope {
    pub fn new(
        kind: ResolverKind,
        url: String,
        priority: Priority,
        timeout: Duration,
        params: SolveParams,
        tx: oneshot::Sender<Result<Resolution, SolveError>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            url,
            priority,
            timeout,
            params,
            seq: 0,
            tx,
        }
    }

    /// Deliver the result to whoever submitted this request. Returns `Err`
    /// with the result if the receiver is gone (caller stopped waiting).
    pub fn complete(
        self,
        result: Result<Resolution, SolveError>,
    ) -> Result<(), Result<Resolution, SolveError>> {
        self.tx.send(result)
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    /// Max-heap order: higher priority first, earlier arrival first within a
    /// priority band.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
