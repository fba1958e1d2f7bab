// ---------------------------------------------------------------------------
// GateConfig: file-based config loader (cleargate.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Top-level config loaded from `cleargate.json`.
///
/// Every field also has a `CLEARGATE_*` env-var fallback, applied when the
/// field is absent from the file (or no file is found at all).
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GateConfig {
    /// Worker tasks in the scheduler pool. The effective pool size is
    /// `min(worker_count, max_concurrent)`.
    pub worker_count: usize,
    /// Admission-semaphore capacity: the hard cap on requests past the queue.
    pub max_concurrent: usize,
    /// Default per-request resolution timeout, in seconds.
    pub default_timeout_secs: u64,
    /// Run the browser sessions headless.
    pub headless: bool,
    /// HTTP API port.
    pub port: u16,
    /// Proxy server URL for browser traffic (e.g. `socks5://127.0.0.1:9050`).
    pub proxy: Option<String>,
    /// Fixed user agent. Unset means a random Chrome desktop UA per session.
    pub user_agent: Option<String>,
    /// Allow HTTP/2 in the browser. Off adds `--disable-http2`.
    pub http2: bool,
    /// Allow HTTP/3 (QUIC) in the browser. Off adds `--disable-quic`.
    pub http3: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            max_concurrent: 10,
            default_timeout_secs: 30,
            headless: true,
            port: 8000,
            proxy: None,
            user_agent: None,
            http2: true,
            http3: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl GateConfig {
    /// Apply `CLEARGATE_*` env-var overrides on top of file/default values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(n) = env_parse::<usize>("CLEARGATE_WORKERS") {
            self.worker_count = n;
        }
        if let Some(n) = env_parse::<usize>("CLEARGATE_MAX_CONCURRENT") {
            self.max_concurrent = n;
        }
        if let Some(n) = env_parse::<u64>("CLEARGATE_TIMEOUT_SECS") {
            self.default_timeout_secs = n;
        }
        if let Some(b) = env_bool("CLEARGATE_HEADLESS") {
            self.headless = b;
        }
        if let Some(p) = env_parse::<u16>("CLEARGATE_PORT") {
            self.port = p;
        }
        if let Some(p) = env_string("CLEARGATE_PROXY") {
            self.proxy = Some(p);
        }
        if let Some(ua) = env_string("CLEARGATE_USER_AGENT") {
            self.user_agent = Some(ua);
        }
        if let Some(b) = env_bool("CLEARGATE_HTTP2") {
            self.http2 = b;
        }
        if let Some(b) = env_bool("CLEARGATE_HTTP3") {
            self.http3 = b;
        }
    }

    pub fn default_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_timeout_secs)
    }
}

/// Load `cleargate.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `CLEARGATE_CONFIG` env var path
/// 2. `./cleargate.json`  (process cwd)
/// 3. `../cleargate.json` (one level up: repo root when running from a subdir)
///
/// Missing file → defaults (silent). Parse error → log a warning, use
/// defaults. Env-var overrides apply in every case.
pub fn load_gate_config() -> GateConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("cleargate.json"),
            std::path::PathBuf::from("../cleargate.json"),
        ];
        if let Ok(env_path) = std::env::var("CLEARGATE_CONFIG") {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    let mut cfg = GateConfig::default();
    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                match serde_json::from_str::<GateConfig>(&contents) {
                    Ok(parsed) => {
                        tracing::info!("cleargate.json loaded from {}", path.display());
                        cfg = parsed;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "cleargate.json parse error at {} ({}), using defaults",
                            path.display(),
                            e
                        );
                    }
                }
                break;
            }
            Err(_) => continue, // file not found at this path: try next
        }
    }

    cfg.apply_env_overrides();
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GateConfig::default();
        assert_eq!(cfg.worker_count, 5);
        assert_eq!(cfg.max_concurrent, 10);
        assert_eq!(cfg.default_timeout_secs, 30);
        assert!(cfg.headless);
        assert!(cfg.http2);
        assert!(cfg.http3);
        assert_eq!(cfg.port, 8000);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let cfg: GateConfig = serde_json::from_str(r#"{"worker_count": 2, "headless": false}"#)
            .expect("valid partial config");
        assert_eq!(cfg.worker_count, 2);
        assert!(!cfg.headless);
        assert_eq!(cfg.max_concurrent, 10);
        assert_eq!(cfg.port, 8000);
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        std::env::set_var("CLEARGATE_TEST_BOOL", "off");
        assert_eq!(env_bool("CLEARGATE_TEST_BOOL"), Some(false));
        std::env::set_var("CLEARGATE_TEST_BOOL", "YES");
        assert_eq!(env_bool("CLEARGATE_TEST_BOOL"), Some(true));
        std::env::set_var("CLEARGATE_TEST_BOOL", "maybe");
        assert_eq!(env_bool("CLEARGATE_TEST_BOOL"), None);
        std::env::remove_var("CLEARGATE_TEST_BOOL");
    }
}
