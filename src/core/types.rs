//! HTTP API wire types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::browser::BrowserCookie;
use crate::sched::Priority;
use crate::solver::{ChallengeType, Resolution, SolverMode};

/// `POST /scrape`: obtain a `cf_clearance` cookie for a URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    /// Falls back to the configured default when omitted.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub clearance_cookie: Option<BrowserCookie>,
    pub all_cookies: Vec<BrowserCookie>,
    pub important_cookies: HashMap<String, String>,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_type: Option<ChallengeType>,
    pub challenge_detected: bool,
    pub processing_time_ms: u64,
}

impl From<Resolution> for ScrapeResponse {
    fn from(res: Resolution) -> Self {
        Self {
            success: res.success,
            clearance_cookie: res.clearance_cookie,
            all_cookies: res.all_cookies,
            important_cookies: res.important_cookies,
            user_agent: res.user_agent,
            challenge_type: res.challenge_type,
            challenge_detected: res.challenge_detected,
            processing_time_ms: res.processing_time_ms,
        }
    }
}

/// `POST /turnstile`: resolve a Turnstile widget into a token.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnstileRequest {
    pub url: String,
    #[serde(default)]
    pub sitekey: Option<String>,
    #[serde(default)]
    pub mode: SolverMode,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub cdata: Option<String>,
    /// Falls back to the configured default when omitted.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnstileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitekey: Option<String>,
    pub challenge_detected: bool,
    pub mode_used: SolverMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
}

impl TurnstileResponse {
    pub fn from_resolution(res: Resolution, mode_used: SolverMode) -> Self {
        Self {
            success: res.success,
            token: res.token,
            sitekey: res.sitekey,
            challenge_detected: res.challenge_detected,
            mode_used,
            error_message: res.error_message,
            processing_time_ms: res.processing_time_ms,
        }
    }
}

/// Error payload shared by all endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: error_code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub uptime_formatted: String,
}
