//! Browser process management: executable discovery, user-agent rotation,
//! and the cookie record type shared across the crate.
//!
//! The persistent CDP session (the thing the resolvers actually drive) lives
//! in [`session`].

pub mod session;

pub use session::{BrowserSession, CdpSession, SessionConfig, WidgetProbe, WidgetTarget};

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

// ── Realistic User-Agent pool ────────────────────────────────────────────────

/// Chrome-only desktop pool. Cloudflare's interactive paths behave best with
/// a Chrome UA that matches the real engine underneath, so non-Chrome strings
/// are deliberately absent.
const CHROME_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome 131 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome 130 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
];

/// Returns a randomly-chosen realistic Chrome desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    CHROME_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(CHROME_USER_AGENTS[0])
}

/// `true` when the UA string identifies real Chrome (not Edge/Opera skins).
pub fn is_chrome_user_agent(ua: &str) -> bool {
    ua.contains("Chrome/") && !ua.contains("Edg/") && !ua.contains("OPR/")
}

static CHROME_MAJOR_RE: OnceLock<regex::Regex> = OnceLock::new();

/// Chrome major version parsed out of a UA string, for Sec-CH-UA brand
/// metadata. `None` for non-Chrome UAs.
pub fn chrome_major_version(ua: &str) -> Option<u32> {
    let re = CHROME_MAJOR_RE
        .get_or_init(|| regex::Regex::new(r"Chrome/(\d+)\.").expect("valid UA regex"));
    re.captures(ua)?.get(1)?.as_str().parse().ok()
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    // 1. Explicit env override
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    // 2. PATH scan (Linux / macOS / Windows package managers)
    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    // 3. Platform-specific well-known paths
    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Cookie record ────────────────────────────────────────────────────────────

/// Owned cookie record, decoupled from the CDP wire type so it can be
/// serialized into results, storage files, and API responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Seconds since the UNIX epoch; `-1` for session cookies.
    pub expires: f64,
    pub secure: bool,
    pub http_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl From<chromiumoxide::cdp::browser_protocol::network::Cookie> for BrowserCookie {
    fn from(c: chromiumoxide::cdp::browser_protocol::network::Cookie) -> Self {
        Self {
            name: c.name,
            value: c.value,
            domain: c.domain,
            path: c.path,
            expires: c.expires,
            secure: c.secure,
            http_only: c.http_only,
            same_site: c.same_site.map(|s| format!("{s:?}")),
        }
    }
}
