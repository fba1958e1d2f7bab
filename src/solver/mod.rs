//! Challenge resolvers.
//!
//! Two resolver kinds sit behind the [`ChallengeResolver`] capability trait:
//! [`clearance`] drives a Cloudflare challenge page until a `cf_clearance`
//! cookie appears, and [`turnstile`] hosts a standalone Turnstile widget and
//! harvests its token. The scheduler treats both uniformly.

pub mod clearance;
pub mod cookies;
pub mod turnstile;

#[cfg(test)]
pub(crate) mod testing;

pub use clearance::ClearanceSolver;
pub use turnstile::TurnstileSolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::browser::BrowserCookie;
use crate::core::error::SolveError;

// ── Resolver identity ────────────────────────────────────────────────────────

/// Which persistent session a request is routed to. One live browser session
/// exists per kind; the scheduler serializes access to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    Clearance,
    Turnstile,
}

impl std::fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverKind::Clearance => write!(f, "clearance"),
            ResolverKind::Turnstile => write!(f, "turnstile"),
        }
    }
}

/// Challenge subtype observed on the target page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    JavaScript,
    Managed,
    Interactive,
    Turnstile,
}

/// Sitekey acquisition mode for the Turnstile resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    #[default]
    AutoDetect,
    Manual,
}

/// Per-request solver parameters (all optional; only the Turnstile resolver
/// reads them).
#[derive(Debug, Clone, Default)]
pub struct SolveParams {
    pub sitekey: Option<String>,
    pub mode: SolverMode,
    pub action: Option<String>,
    pub cdata: Option<String>,
}

// ── Outcomes ─────────────────────────────────────────────────────────────────

/// Domain-level failure categories. These are *results*, not errors: a page
/// without a challenge or a widget that never yields a token is a normal
/// outcome the caller must be able to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No clearance cookie and no challenge marker on the page.
    NoChallengeDetected,
    /// Challenge detected but not solved within the request timeout.
    ChallengeUnsolved,
    /// Challenge disappeared but no `cf_clearance` cookie materialized.
    MissingClearanceCookie,
    /// Auto-detection found no Turnstile sitekey on the page.
    SitekeyNotFound,
    /// Manual sitekey failed shape validation (checked before any navigation).
    InvalidSitekey,
    /// Widget polled to exhaustion without producing a token.
    NoTokenObtained,
}

impl FailureKind {
    /// Stable machine-readable code for API error payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            FailureKind::NoChallengeDetected => "NO_CHALLENGE_DETECTED",
            FailureKind::ChallengeUnsolved => "CHALLENGE_UNSOLVED",
            FailureKind::MissingClearanceCookie => "MISSING_CLEARANCE_COOKIE",
            FailureKind::SitekeyNotFound => "SITEKEY_NOT_FOUND",
            FailureKind::InvalidSitekey => "INVALID_SITEKEY",
            FailureKind::NoTokenObtained => "NO_TOKEN_OBTAINED",
        }
    }
}

/// The outcome of one resolution attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub success: bool,
    pub url: String,
    pub kind: ResolverKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_type: Option<ChallengeType>,
    pub challenge_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clearance_cookie: Option<BrowserCookie>,
    pub all_cookies: Vec<BrowserCookie>,
    /// Flat name → value view of the cookies download tools care about.
    pub important_cookies: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitekey: Option<String>,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Stamped by the scheduler worker after resolution.
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,
}

impl Resolution {
    /// Empty, unsuccessful resolution for `url`; resolvers fill it in.
    pub fn new(kind: ResolverKind, url: &str, user_agent: &str) -> Self {
        Self {
            success: false,
            url: url.to_string(),
            kind,
            challenge_type: None,
            challenge_detected: false,
            clearance_cookie: None,
            all_cookies: Vec::new(),
            important_cookies: HashMap::new(),
            token: None,
            sitekey: None,
            user_agent: user_agent.to_string(),
            failure: None,
            error_message: None,
            processing_time_ms: 0,
            worker: None,
        }
    }

    pub(crate) fn failed(mut self, failure: FailureKind, message: impl Into<String>) -> Self {
        self.success = false;
        self.failure = Some(failure);
        self.error_message = Some(message.into());
        self
    }
}

// ── The resolver trait ───────────────────────────────────────────────────────

/// A request as seen by a resolver (identity plus what to do; priority and
/// queueing are scheduler concerns).
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub id: Uuid,
    pub url: String,
    pub timeout: Duration,
    pub params: SolveParams,
}

/// Capability interface the scheduler drives. One implementation per
/// [`ResolverKind`], each owning a persistent browser session.
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    fn kind(&self) -> ResolverKind;

    /// Bring up the backing browser session. Idempotent.
    async fn start(&self) -> Result<(), SolveError>;

    /// Tear down the backing session. Idempotent.
    async fn stop(&self);

    /// Resolve one request. Domain failures come back as `Ok` resolutions
    /// with a [`FailureKind`]; `Err` is reserved for infrastructure faults.
    async fn resolve(&self, req: &ResolveRequest) -> Result<Resolution, SolveError>;

    /// Best-effort cleanup between requests (cookies, storage, parking page).
    async fn reset(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ResolverKind::Clearance).unwrap(),
            "\"clearance\""
        );
        assert_eq!(
            serde_json::to_string(&ResolverKind::Turnstile).unwrap(),
            "\"turnstile\""
        );
    }

    #[test]
    fn solver_mode_wire_names() {
        let m: SolverMode = serde_json::from_str("\"auto_detect\"").unwrap();
        assert_eq!(m, SolverMode::AutoDetect);
        let m: SolverMode = serde_json::from_str("\"manual\"").unwrap();
        assert_eq!(m, SolverMode::Manual);
    }

    #[test]
    fn failure_codes_are_stable() {
        assert_eq!(
            FailureKind::NoChallengeDetected.error_code(),
            "NO_CHALLENGE_DETECTED"
        );
        assert_eq!(FailureKind::InvalidSitekey.error_code(), "INVALID_SITEKEY");
        assert_eq!(FailureKind::NoTokenObtained.error_code(), "NO_TOKEN_OBTAINED");
    }
}
