//! Turnstile resolver: renders a minimal host page around the widget and
//! polls the success callback for a token.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::core::error::SolveError;
use crate::solver::{
    ChallengeResolver, ChallengeType, FailureKind, Resolution, ResolveRequest, ResolverKind,
    SolveParams, SolverMode,
};

fn sitekey_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]x[A-Fa-f0-9]{20,22}$").unwrap())
}

fn sitekey_scan() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]x[A-Fa-f0-9]{20,22}").unwrap())
}

/// True when `candidate` matches the Turnstile sitekey shape.
pub fn validate_sitekey(candidate: &str) -> bool {
    sitekey_shape().is_match(candidate)
}

/// Build the page hosting the widget. The success and error callbacks stash
/// their payloads on `window` where the poll loop can read them.
fn render_host_page(sitekey: &str, action: Option<&str>, cdata: Option<&str>) -> String {
    let mut extra = String::new();
    if let Some(action) = action {
        extra.push_str(&format!(" data-action=\"{}\"", action));
    }
    if let Some(cdata) = cdata {
        extra.push_str(&format!(" data-cdata=\"{}\"", cdata));
    }
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Turnstile Solver</title>
    <script src="https://challenges.cloudflare.com/turnstile/v0/api.js" async defer></script>
    <script>
        window.turnstileResult = null;
        window.turnstileError = null;
        function onTurnstileSuccess(token) {{
            window.turnstileResult = token;
        }}
        function onTurnstileError(error) {{
            window.turnstileError = error;
        }}
    </script>
</head>
<body>
    <div id="turnstile-widget" class="cf-turnstile" data-sitekey="{sitekey}"
         data-callback="onTurnstileSuccess" data-error-callback="onTurnstileError"{extra}></div>
</body>
</html>"#
    )
}

pub struct TurnstileSolver<S> {
    session: S,
}

impl<S: BrowserSession> TurnstileSolver<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Pull the sitekey out of the live target page. Widget container
    /// attributes are authoritative; raw HTML scanning is the fallback for
    /// sites that render the widget from script.
    async fn detect_sitekey(&self) -> Result<Option<String>, SolveError> {
        let attrs = self
            .session
            .element_attributes(".cf-turnstile", "data-sitekey")
            .await
            .map_err(SolveError::Browser)?;
        if let Some(key) = attrs.into_iter().find(|k| validate_sitekey(k)) {
            debug!("sitekey found on widget container: {}", key);
            return Ok(Some(key));
        }

        let html = self
            .session
            .page_content()
            .await
            .map_err(SolveError::Browser)?;
        Ok(sitekey_scan()
            .find_iter(&html)
            .map(|m| m.as_str().to_string())
            .find(|k| validate_sitekey(k)))
    }

    /// Poll once per second for the token, clicking the widget between polls
    /// in case it needs an interaction to fire.
    async fn poll_for_token(&self, timeout: Duration) -> Result<Option<String>, SolveError> {
        let attempts = timeout.as_secs().max(1);
        for _ in 0..attempts {
            let result = self
                .session
                .evaluate("window.turnstileResult")
                .await
                .map_err(SolveError::Browser)?;
            if let Some(token) = result.as_str() {
                if !token.is_empty() {
                    return Ok(Some(token.to_string()));
                }
            }

            let error = self
                .session
                .evaluate("window.turnstileError")
                .await
                .map_err(SolveError::Browser)?;
            if !error.is_null() {
                warn!("turnstile widget reported an error: {}", error);
                return Ok(None);
            }

            if let Err(e) = self.session.click_selector("#turnstile-widget").await {
                debug!("widget click failed: {}", e);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(None)
    }

    async fn resolve_sitekey(
        &self,
        url: &str,
        params: &SolveParams,
    ) -> Result<Result<String, Resolution>, SolveError> {
        let base = |ua: &str| Resolution::new(ResolverKind::Turnstile, url, ua);

        match params.mode {
            SolverMode::Manual => {
                // Manual mode validates before touching the browser at all.
                let Some(sitekey) = params.sitekey.as_deref() else {
                    return Ok(Err(base(self.session.user_agent()).failed(
                        FailureKind::InvalidSitekey,
                        "sitekey is required in manual mode",
                    )));
                };
                if !validate_sitekey(sitekey) {
                    return Ok(Err(base(self.session.user_agent()).failed(
                        FailureKind::InvalidSitekey,
                        format!("sitekey {:?} does not match the expected shape", sitekey),
                    )));
                }
                self.session
                    .navigate(url)
                    .await
                    .map_err(SolveError::Browser)?;
                Ok(Ok(sitekey.to_string()))
            }
            SolverMode::AutoDetect => {
                self.session
                    .navigate(url)
                    .await
                    .map_err(SolveError::Browser)?;
                match self.detect_sitekey().await? {
                    Some(key) => Ok(Ok(key)),
                    None => Ok(Err(base(self.session.user_agent()).failed(
                        FailureKind::SitekeyNotFound,
                        "no Turnstile sitekey found on the page",
                    ))),
                }
            }
        }
    }
}

#[async_trait]
impl<S: BrowserSession> ChallengeResolver for TurnstileSolver<S> {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Turnstile
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
        let sitekey = match self.resolve_sitekey(&req.url, &req.params).await? {
            Ok(key) => key,
            Err(failed) => return Ok(failed),
        };

        let mut result = Resolution::new(ResolverKind::Turnstile, &req.url, self.session.user_agent());
        result.sitekey = Some(sitekey.clone());
        result.challenge_detected = true;
        result.challenge_type = Some(ChallengeType::Turnstile);
        info!("solving Turnstile widget with sitekey {}", sitekey);

        // Replacing the document keeps the page URL, so the widget still sees
        // the target origin.
        self.session
            .set_content(&render_host_page(
                &sitekey,
                req.params.action.as_deref(),
                req.params.cdata.as_deref(),
            ))
            .await
            .map_err(SolveError::Browser)?;

        // Give api.js time to load and render the widget.
        tokio::time::sleep(Duration::from_secs(2)).await;

        match self.poll_for_token(req.timeout).await? {
            Some(token) => {
                result.success = true;
                result.token = Some(token);
                Ok(result)
            }
            None => Ok(result.failed(
                FailureKind::NoTokenObtained,
                format!(
                    "no Turnstile token obtained within {}s",
                    req.timeout.as_secs()
                ),
            )),
        }
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.session.clear_browsing_data().await
    }
}
