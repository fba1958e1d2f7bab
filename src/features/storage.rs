//! Domain-keyed persistence for earned clearance cookies.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::browser::BrowserCookie;

/// `cf_clearance` cookies report an expiry one year out; the issue time is
/// recovered by subtracting it back off.
const CLEARANCE_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// One saved resolution, keyed under the clearance cookie's domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Unix time the cookie was issued, derived from its expiry.
    pub unix_timestamp: i64,
    /// Human-readable local issue time.
    pub timestamp: String,
    pub cf_clearance: String,
    pub cookies: Vec<BrowserCookie>,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    pub created_at: String,
}

type RecordMap = BTreeMap<String, Vec<CookieRecord>>;

/// Default store location: `~/.cleargate/cookies.json`.
pub fn default_storage_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cleargate").join("cookies.json"))
}

pub fn load_cookie_records(path: &Path) -> Result<RecordMap> {
    if !path.exists() {
        return Ok(RecordMap::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading cookie store {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing cookie store {}", path.display()))
}

/// Append a record for `clearance_cookie` under its domain. An unreadable
/// existing store is replaced rather than treated as fatal.
pub fn write_cookie_record(
    path: &Path,
    clearance_cookie: &BrowserCookie,
    all_cookies: &[BrowserCookie],
    user_agent: &str,
    proxy: Option<&str>,
) -> Result<()> {
    let mut records = match load_cookie_records(path) {
        Ok(records) => records,
        Err(e) => {
            warn!("cookie store unreadable, starting fresh: {}", e);
            RecordMap::new()
        }
    };

    let issued_at = clearance_cookie.expires as i64 - CLEARANCE_LIFETIME_SECS;
    let record = CookieRecord {
        unix_timestamp: issued_at,
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        cf_clearance: clearance_cookie.value.clone(),
        cookies: all_cookies.to_vec(),
        user_agent: user_agent.to_string(),
        proxy: proxy.map(str::to_string),
        created_at: Utc::now().to_rfc3339(),
    };

    records
        .entry(clearance_cookie.domain.clone())
        .or_default()
        .push(record);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing cookie store {}", path.display()))?;
    Ok(())
}

/// Most recently issued record for a domain, if any.
pub fn latest_record<'a>(records: &'a RecordMap, domain: &str) -> Option<&'a CookieRecord> {
    records
        .get(domain)?
        .iter()
        .max_by_key(|r| r.unix_timestamp)
}

/// Drop records whose clearance cookie has already expired.
pub fn prune_expired_records(records: &mut RecordMap) {
    let now = Utc::now().timestamp();
    for entries in records.values_mut() {
        entries.retain(|r| r.unix_timestamp + CLEARANCE_LIFETIME_SECS > now);
    }
    records.retain(|_, entries| !entries.is_empty());
}
