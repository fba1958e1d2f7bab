use std::time::Duration;

/// Infrastructure errors surfaced to submitters.
///
/// Domain outcomes (no challenge on the page, widget never yielded a token,
/// sitekey rejected, ...) are **not** errors: they travel as failed
/// [`Resolution`](crate::solver::Resolution)s with a
/// [`FailureKind`](crate::solver::FailureKind). This enum is reserved for the
/// cases where the scheduler or the browser plumbing itself broke down.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    /// A resolver (and its browser session) failed to come up.
    #[error("resolver startup failed: {0}")]
    Startup(String),

    /// `submit()` was called before `start()` or after `stop()`.
    #[error("scheduler is not running")]
    NotRunning,

    /// The caller's wait elapsed (request timeout + result grace). The
    /// request itself is *not* cancelled: any in-flight work runs to
    /// completion and its result is discarded.
    #[error("no result within {}s (request timeout + grace)", .0.as_secs())]
    SchedulerTimeout(Duration),

    /// The completion channel was dropped without a result. Indicates a
    /// worker died mid-request; should not happen in normal operation.
    #[error("result channel closed before a result was delivered")]
    ResultChannelClosed,

    /// CDP / browser-level failure while processing a request.
    #[error(transparent)]
    Browser(#[from] anyhow::Error),
}

impl SolveError {
    /// Stable machine-readable code for API error payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            SolveError::Startup(_) => "STARTUP_ERROR",
            SolveError::NotRunning => "NOT_RUNNING",
            SolveError::SchedulerTimeout(_) => "SCHEDULER_TIMEOUT",
            SolveError::ResultChannelClosed => "RESULT_CHANNEL_CLOSED",
            SolveError::Browser(_) => "BROWSER_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SolveError::NotRunning.error_code(), "NOT_RUNNING");
        assert_eq!(
            SolveError::SchedulerTimeout(Duration::from_secs(40)).error_code(),
            "SCHEDULER_TIMEOUT"
        );
        assert_eq!(
            SolveError::Startup("no browser".into()).error_code(),
            "STARTUP_ERROR"
        );
    }

    #[test]
    fn timeout_message_includes_total_wait() {
        let e = SolveError::SchedulerTimeout(Duration::from_secs(40));
        assert!(e.to_string().contains("40s"));
    }
}
