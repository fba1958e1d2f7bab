//! Clearance resolver: drives a Cloudflare challenge page until the
//! `cf_clearance` cookie appears.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, WidgetProbe};
use crate::core::error::SolveError;
use crate::solver::cookies::{extract_clearance_cookie, important_cookies};
use crate::solver::{
    ChallengeResolver, ChallengeType, FailureKind, Resolution, ResolveRequest, ResolverKind,
};

/// Literal markers Cloudflare embeds in challenge pages, checked in order.
const CHALLENGE_MARKERS: &[(&str, ChallengeType)] = &[
    ("cType: 'non-interactive'", ChallengeType::JavaScript),
    ("cType: 'managed'", ChallengeType::Managed),
    ("cType: 'interactive'", ChallengeType::Interactive),
];

/// Classify the challenge on a page, if any.
pub fn detect_challenge(html: &str) -> Option<ChallengeType> {
    CHALLENGE_MARKERS
        .iter()
        .find(|(marker, _)| html.contains(marker))
        .map(|(_, kind)| *kind)
}

fn challenge_banner(kind: ChallengeType) -> &'static str {
    match kind {
        ChallengeType::JavaScript => "Solving Cloudflare challenge [JavaScript]...",
        ChallengeType::Managed => "Solving Cloudflare challenge [Managed]...",
        ChallengeType::Interactive => "Solving Cloudflare challenge [Interactive]...",
        ChallengeType::Turnstile => "Solving Cloudflare challenge [Turnstile]...",
    }
}

/// How the widget-driving loop ended.
enum LoopExit {
    CookiePresent,
    ChallengeGone,
    TimedOut,
}

pub struct ClearanceSolver<S> {
    session: S,
}

impl<S: BrowserSession> ClearanceSolver<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Poll the challenge widget until a clearance cookie shows up, the
    /// challenge disappears, or the request timeout elapses. DOM races
    /// (detached nodes, re-rendered widgets) are swallowed and retried.
    async fn drive_widget(&self, timeout: Duration) -> Result<LoopExit, SolveError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(LoopExit::TimedOut);
            }

            let cookies = self.session.cookies().await.map_err(SolveError::Browser)?;
            if extract_clearance_cookie(&cookies).is_some() {
                return Ok(LoopExit::CookiePresent);
            }

            let html = self
                .session
                .page_content()
                .await
                .map_err(SolveError::Browser)?;
            if detect_challenge(&html).is_none() {
                return Ok(LoopExit::ChallengeGone);
            }

            // Fresh probe every iteration; cached widget targets go stale
            // as the challenge re-renders.
            match self.session.probe_widget().await {
                Err(e) => {
                    debug!("widget probe failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(WidgetProbe::Missing) | Ok(WidgetProbe::NotRendered) => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Ok(WidgetProbe::Hidden) => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(WidgetProbe::Clickable(target)) => {
                    // Let the widget finish animating in before clicking.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if let Err(e) = self.session.click_widget(&target).await {
                        debug!("widget click failed: {}", e);
                    } else {
                        debug!("challenge widget clicked");
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<S: BrowserSession> ChallengeResolver for ClearanceSolver<S> {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Clearance
    }

    async fn start(&self) -> Result<(), SolveError> {
        self.session
            .start()
            .await
            .map_err(|e| SolveError::Startup(e.to_string()))
    }

    async fn stop(&self) {
        self.session.stop().await;
    }

    async fn resolve(&self, req: &ResolveRequest) -> Result<Resolution, SolveError> {
        let mut result = Resolution::new(ResolverKind::Clearance, &req.url, self.session.user_agent());

        self.session
            .navigate(&req.url)
            .await
            .map_err(SolveError::Browser)?;

        let mut all_cookies = self.session.cookies().await.map_err(SolveError::Browser)?;
        let mut clearance = extract_clearance_cookie(&all_cookies).cloned();

        if clearance.is_none() {
            let html = self
                .session
                .page_content()
                .await
                .map_err(SolveError::Browser)?;

            let Some(challenge_type) = detect_challenge(&html) else {
                return Ok(result.failed(
                    FailureKind::NoChallengeDetected,
                    "no Cloudflare challenge detected and no clearance cookie present",
                ));
            };
            result.challenge_detected = true;
            result.challenge_type = Some(challenge_type);
            info!("{}", challenge_banner(challenge_type));

            // Client-hint metadata keeps the managed check from flagging the
            // session; not having it is survivable.
            if let Err(e) = self.session.apply_user_agent_metadata().await {
                warn!("user agent metadata override failed: {}", e);
            }

            let exit = self.drive_widget(req.timeout).await?;

            all_cookies = self.session.cookies().await.map_err(SolveError::Browser)?;
            clearance = extract_clearance_cookie(&all_cookies).cloned();

            if clearance.is_none() {
                return Ok(match exit {
                    LoopExit::TimedOut => result.failed(
                        FailureKind::ChallengeUnsolved,
                        format!(
                            "could not solve Cloudflare challenge within {}s",
                            req.timeout.as_secs()
                        ),
                    ),
                    LoopExit::ChallengeGone | LoopExit::CookiePresent => result.failed(
                        FailureKind::MissingClearanceCookie,
                        "challenge ended but no clearance cookie was issued",
                    ),
                });
            }
        }

        result.success = true;
        result.important_cookies = important_cookies(&all_cookies);
        result.clearance_cookie = clearance;
        result.all_cookies = all_cookies;
        Ok(result)
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.session.clear_browsing_data().await
    }
}
