//! HTTP surface: health, clearance scraping, Turnstile tokens, and stats.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::error::SolveError;
use crate::core::types::{
    ErrorBody, HealthResponse, ScrapeRequest, ScrapeResponse, TurnstileRequest, TurnstileResponse,
};
use crate::core::AppState;
use crate::solver::{ResolverKind, SolveParams};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/scrape", post(scrape))
        .route("/turnstile", post(turnstile))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Render a duration as at most three coarse-to-fine units, e.g. `2d 3h 5m`.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    if total < 1 {
        return format!("{:.2}s", uptime.as_secs_f64());
    }

    const UNITS: &[(u64, &str)] = &[
        (604_800, "w"),
        (86_400, "d"),
        (3_600, "h"),
        (60, "m"),
        (1, "s"),
    ];

    let mut parts = Vec::new();
    let mut remaining = total;
    for &(span, suffix) in UNITS {
        if parts.len() == 3 {
            break;
        }
        let count = remaining / span;
        if count > 0 {
            parts.push(format!("{}{}", count, suffix));
            remaining %= span;
        }
    }
    parts.join(" ")
}

fn reject_invalid_url(raw: &str) -> Option<Response> {
    match url::Url::parse(raw) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => None,
        Ok(u) => Some(
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(
                    format!("unsupported URL scheme {:?}", u.scheme()),
                    "INVALID_URL",
                )),
            )
                .into_response(),
        ),
        Err(e) => Some(
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(format!("invalid URL: {}", e), "INVALID_URL")),
            )
                .into_response(),
        ),
    }
}

fn error_status(err: &SolveError) -> StatusCode {
    match err {
        SolveError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
        SolveError::SchedulerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: SolveError) -> Response {
    let status = error_status(&err);
    let body = ErrorBody::new(err.to_string(), err.error_code());
    (status, Json(body)).into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.uptime();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.as_secs_f64(),
        uptime_formatted: format_uptime(uptime),
    })
}

async fn scrape(State(state): State<AppState>, Json(req): Json<ScrapeRequest>) -> Response {
    if let Some(rejection) = reject_invalid_url(&req.url) {
        return rejection;
    }
    info!("scrape request for {}", req.url);
    let timeout = req
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config.default_timeout());
    let result = state
        .scheduler
        .submit(
            ResolverKind::Clearance,
            req.url.clone(),
            req.priority,
            timeout,
            SolveParams::default(),
        )
        .await;

    match result {
        Ok(res) if res.success => Json(ScrapeResponse::from(res)).into_response(),
        Ok(res) => {
            let code = res
                .failure
                .map(|f| f.error_code())
                .unwrap_or("RESOLUTION_FAILED");
            let message = res
                .error_message
                .clone()
                .unwrap_or_else(|| "resolution failed".to_string());
            let body = ErrorBody::new(message, code)
                .with_details(serde_json::json!({ "url": res.url }));
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn turnstile(State(state): State<AppState>, Json(req): Json<TurnstileRequest>) -> Response {
    if let Some(rejection) = reject_invalid_url(&req.url) {
        return rejection;
    }
    info!("turnstile request for {} ({:?} mode)", req.url, req.mode);
    let params = SolveParams {
        sitekey: req.sitekey.clone(),
        mode: req.mode,
        action: req.action.clone(),
        cdata: req.cdata.clone(),
    };
    let timeout = req
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config.default_timeout());
    let result = state
        .scheduler
        .submit(
            ResolverKind::Turnstile,
            req.url.clone(),
            req.priority,
            timeout,
            params,
        )
        .await;

    match result {
        // Domain failures ride back in the normal response shape; only
        // infrastructure faults become HTTP errors.
        Ok(res) => Json(TurnstileResponse::from_resolution(res, req.mode)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    Json(state.scheduler.get_stats()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_millis(420)), "0.42s");
        assert_eq!(format_uptime(Duration::from_secs(59)), "59s");
        assert_eq!(format_uptime(Duration::from_secs(61)), "1m 1s");
        assert_eq!(format_uptime(Duration::from_secs(3_661)), "1h 1m 1s");
        // Only the three largest units survive.
        assert_eq!(
            format_uptime(Duration::from_secs(604_800 + 86_400 + 3_600 + 61)),
            "1w 1d 1h"
        );
        assert_eq!(format_uptime(Duration::from_secs(86_400 * 2)), "2d");
    }

    #[test]
    fn url_validation() {
        assert!(reject_invalid_url("https://example.com/path").is_none());
        assert!(reject_invalid_url("http://127.0.0.1:8080").is_none());
        assert!(reject_invalid_url("ftp://example.com").is_some());
        assert!(reject_invalid_url("not a url").is_some());
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            error_status(&SolveError::NotRunning),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_status(&SolveError::SchedulerTimeout(Duration::from_secs(40))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            error_status(&SolveError::Startup("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
