//! Persistent CDP browser session.
//!
//! One [`CdpSession`] wraps one long-lived Chromium process with a single
//! reused tab. The resolver state machines drive it exclusively through the
//! [`BrowserSession`] trait, which keeps them testable against a scripted
//! fake and keeps all chromiumoxide plumbing in this file.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, GetBoxModelParams, GetDocumentParams, Node,
};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetUserAgentOverrideParams, UserAgentBrandVersion, UserAgentMetadata,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCacheParams, ClearBrowserCookiesParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{chrome_major_version, find_chrome_executable, random_user_agent, BrowserCookie};

// ── Session configuration ────────────────────────────────────────────────────

/// Launch parameters for one persistent browser session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: Option<String>,
    pub headless: bool,
    pub proxy: Option<String>,
    pub http2: bool,
    pub http3: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            headless: true,
            proxy: None,
            http2: true,
            http3: true,
        }
    }
}

// ── Widget probing ───────────────────────────────────────────────────────────

/// Click coordinates resolve against this node on the *current* DOM snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetTarget {
    pub backend_node_id: i64,
}

/// Outcome of a single challenge-widget probe. Each probe takes a fresh DOM
/// snapshot; targets are never cached across poll iterations because the
/// widget re-renders itself while the challenge runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetProbe {
    /// No `<input>` anchor in the document at all.
    Missing,
    /// Anchor present but its host has not attached a shadow root yet.
    NotRendered,
    /// Widget exists but is styled `display: none;`: nothing to click.
    Hidden,
    /// Widget is visible; click this target.
    Clickable(WidgetTarget),
}

// ── The session trait ────────────────────────────────────────────────────────

/// Operations the challenge resolvers need from a browser. Implemented by
/// [`CdpSession`] for real Chromium and by a scripted fake in tests.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self);

    async fn navigate(&self, url: &str) -> Result<()>;
    /// Replace the current document with the given HTML (no navigation).
    async fn set_content(&self, html: &str) -> Result<()>;

    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;
    async fn page_content(&self) -> Result<String>;
    /// Evaluate a script; `undefined` results come back as `Value::Null`.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    /// Values of `attribute` across all elements matching `selector`.
    async fn element_attributes(&self, selector: &str, attribute: &str) -> Result<Vec<String>>;

    async fn probe_widget(&self) -> Result<WidgetProbe>;
    async fn click_widget(&self, target: &WidgetTarget) -> Result<()>;
    async fn click_selector(&self, selector: &str) -> Result<()>;

    /// Emit Sec-CH-UA client-hint metadata consistent with the session UA.
    async fn apply_user_agent_metadata(&self) -> Result<()>;
    /// Best-effort wipe of cookies, caches, and web storage, parking the tab
    /// on `about:blank`.
    async fn clear_browsing_data(&self) -> Result<()>;

    fn user_agent(&self) -> &str;
}

// ── CDP implementation ───────────────────────────────────────────────────────

struct Inner {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
}

/// Chromium-backed [`BrowserSession`]. `start()` is idempotent; all other
/// operations fail until the session has been started.
pub struct CdpSession {
    config: SessionConfig,
    user_agent: String,
    inner: Mutex<Option<Inner>>,
}

const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
"#;

impl CdpSession {
    pub fn new(config: SessionConfig) -> Self {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());
        Self {
            config,
            user_agent,
            inner: Mutex::new(None),
        }
    }

    fn build_config(&self, exe: &str) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(exe)
            .viewport(Viewport {
                width: 1366,
                height: 768,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .window_size(1366, 768)
            .arg("--disable-gpu")
            .arg("--no-sandbox") // often required in CI / restricted environments
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--disable-crash-reporter")
            .arg("--disable-breakpad")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            // Stealth: suppress CDP automation fingerprint
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", self.user_agent));

        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if !self.config.http2 {
            builder = builder.arg("--disable-http2");
        }
        if !self.config.http3 {
            builder = builder.arg("--disable-quic");
        }

        builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))
    }
}

fn page_of(inner: &Option<Inner>) -> Result<&Page> {
    inner
        .as_ref()
        .map(|inner| &inner.page)
        .ok_or_else(|| anyhow!("browser session not started"))
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn start(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            debug!("browser session already started");
            return Ok(());
        }

        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!(
                "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE."
            )
        })?;
        info!("launching browser session ({})", exe);

        let config = self.build_config(&exe)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open session tab: {}", e))?;

        page.execute(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(STEALTH_JS)
                .build()
                .map_err(|e| anyhow!("stealth script params: {}", e))?,
        )
        .await
        .map_err(|e| anyhow!("Failed to install stealth script: {}", e))?;

        *guard = Some(Inner {
            browser,
            page,
            handler_task,
        });
        Ok(())
    }

    async fn stop(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut inner) = guard.take() {
            if let Err(e) = inner.browser.close().await {
                warn!("browser close error (non-fatal): {}", e);
            }
            inner.handler_task.abort();
            info!("browser session stopped");
        }
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        page.goto(url)
            .await
            .map_err(|e| anyhow!("navigation to {} failed: {}", url, e))?;
        let _ = page.wait_for_navigation().await;
        Ok(())
    }

    async fn set_content(&self, html: &str) -> Result<()> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        page.set_content(html)
            .await
            .map_err(|e| anyhow!("set_content failed: {}", e))?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| anyhow!("get_cookies failed: {}", e))?;
        Ok(cookies.into_iter().map(BrowserCookie::from).collect())
    }

    async fn page_content(&self) -> Result<String> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        page.content()
            .await
            .map_err(|e| anyhow!("failed to get page content: {}", e))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("evaluate failed: {}", e))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn element_attributes(&self, selector: &str, attribute: &str) -> Result<Vec<String>> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        // No matches is a normal outcome, not an error.
        let elements = match page.find_elements(selector).await {
            Ok(els) => els,
            Err(_) => return Ok(Vec::new()),
        };
        let mut values = Vec::new();
        for el in elements {
            if let Ok(Some(v)) = el.attribute(attribute).await {
                values.push(v);
            }
        }
        Ok(values)
    }

    async fn probe_widget(&self) -> Result<WidgetProbe> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;

        // Fresh pierced snapshot every probe: the widget re-renders while
        // the challenge runs and stale node ids go invalid.
        let doc = page
            .execute(GetDocumentParams::builder().depth(-1).pierce(true).build())
            .await
            .map_err(|e| anyhow!("DOM snapshot failed: {}", e))?;

        let Some((_, parent)) = find_input(&doc.result.root, None) else {
            return Ok(WidgetProbe::Missing);
        };
        let Some(parent) = parent else {
            return Ok(WidgetProbe::NotRendered);
        };
        let Some(shadow) = parent.shadow_roots.as_ref().and_then(|r| r.first()) else {
            return Ok(WidgetProbe::NotRendered);
        };
        let Some(widget) = shadow.children.as_ref().and_then(|c| c.first()) else {
            return Ok(WidgetProbe::NotRendered);
        };

        if node_attribute(widget, "style")
            .map(|style| style.contains("display: none;"))
            .unwrap_or(false)
        {
            return Ok(WidgetProbe::Hidden);
        }

        Ok(WidgetProbe::Clickable(WidgetTarget {
            backend_node_id: *widget.backend_node_id.inner(),
        }))
    }

    async fn click_widget(&self, target: &WidgetTarget) -> Result<()> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;

        let box_resp = page
            .execute(
                GetBoxModelParams::builder()
                    .backend_node_id(BackendNodeId::new(target.backend_node_id))
                    .build(),
            )
            .await
            .context("failed to get box model for challenge widget")?;

        // Content quad: 4 corner points (x1,y1,...,x4,y4): click the center.
        let quad = box_resp.result.model.content.inner();
        let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
        let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;

        page.execute(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseMoved)
                .x(x)
                .y(y)
                .build()
                .map_err(|e| anyhow!("mouse move params: {}", e))?,
        )
        .await?;

        page.execute(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MousePressed)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(|e| anyhow!("mouse down params: {}", e))?,
        )
        .await?;

        page.execute(
            DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseReleased)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(|e| anyhow!("mouse up params: {}", e))?,
        )
        .await?;

        debug!("clicked challenge widget at ({:.0}, {:.0})", x, y);
        Ok(())
    }

    async fn click_selector(&self, selector: &str) -> Result<()> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("element {} not found: {}", selector, e))?;
        element
            .click()
            .await
            .map_err(|e| anyhow!("click on {} failed: {}", selector, e))?;
        Ok(())
    }

    async fn apply_user_agent_metadata(&self) -> Result<()> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;

        let ua = &self.user_agent;
        let major = chrome_major_version(ua).unwrap_or(131).to_string();
        let (platform, platform_version) = if ua.contains("Windows") {
            ("Windows", "10.0.0")
        } else if ua.contains("Mac OS X") {
            ("macOS", "13.0.0")
        } else {
            ("Linux", "6.1.0")
        };

        let brands = vec![
            UserAgentBrandVersion::new("Not)A;Brand", "8"),
            UserAgentBrandVersion::new("Chromium", major.clone()),
            UserAgentBrandVersion::new("Google Chrome", major.clone()),
        ];
        let metadata = UserAgentMetadata::builder()
            .brands(brands.clone())
            .full_version_lists(brands)
            .platform(platform)
            .platform_version(platform_version)
            .architecture("x86")
            .bitness("64")
            .model("")
            .mobile(false)
            .wow64(false)
            .build()
            .map_err(|e| anyhow!("user agent metadata: {}", e))?;

        page.execute(
            SetUserAgentOverrideParams::builder()
                .user_agent(ua.clone())
                .platform(platform)
                .user_agent_metadata(metadata)
                .build()
                .map_err(|e| anyhow!("user agent override params: {}", e))?,
        )
        .await
        .map_err(|e| anyhow!("SetUserAgentOverride failed: {}", e))?;
        Ok(())
    }

    async fn clear_browsing_data(&self) -> Result<()> {
        let guard = self.inner.lock().await;
        let page = page_of(&guard)?;

        page.execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| anyhow!("clearing cookies failed: {}", e))?;
        if let Err(e) = page.execute(ClearBrowserCacheParams::default()).await {
            debug!("cache clear failed (non-fatal): {}", e);
        }
        // Web storage is origin-scoped; wipe whatever the current origin holds.
        let _ = page
            .evaluate("try { localStorage.clear(); sessionStorage.clear(); } catch (e) {}")
            .await;
        page.goto("about:blank")
            .await
            .map_err(|e| anyhow!("reset navigation failed: {}", e))?;
        Ok(())
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        // Drop cannot await; spawn the close when inside a runtime to avoid
        // leaving zombie Chromium processes behind.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if let Ok(mut guard) = self.inner.try_lock() {
            if let Some(mut inner) = guard.take() {
                inner.handler_task.abort();
                handle.spawn(async move {
                    let _ = inner.browser.close().await;
                });
            }
        }
    }
}

// ── DOM snapshot helpers ─────────────────────────────────────────────────────

/// First `<input>` in document order (piercing shadow roots), paired with its
/// parent node.
fn find_input<'a>(node: &'a Node, parent: Option<&'a Node>) -> Option<(&'a Node, Option<&'a Node>)> {
    if node.local_name == "input" {
        return Some((node, parent));
    }
    if let Some(children) = node.children.as_ref() {
        for child in children {
            if let Some(found) = find_input(child, Some(node)) {
                return Some(found);
            }
        }
    }
    if let Some(roots) = node.shadow_roots.as_ref() {
        for root in roots {
            if let Some(found) = find_input(root, Some(node)) {
                return Some(found);
            }
        }
    }
    None
}

/// Attribute lookup on a snapshot node (attributes come as a flat
/// `[name, value, name, value, ...]` list).
fn node_attribute(node: &Node, name: &str) -> Option<String> {
    let attrs = node.attributes.as_ref()?;
    attrs
        .chunks_exact(2)
        .find(|pair| pair[0] == name)
        .map(|pair| pair[1].clone())
}
