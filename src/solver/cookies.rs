//! Cookie helpers shared by resolvers, the CLI, and the storage layer.

use std::collections::HashMap;

use crate::browser::BrowserCookie;

/// Cookies worth surfacing individually in results: the ones download tools
/// and downstream HTTP clients need to replay a cleared session.
pub const IMPORTANT_COOKIE_NAMES: &[&str] = &["cf_clearance", "__cf_bm", "cf_bm", "_cfuvid"];

/// The Cloudflare `cf_clearance` cookie, if present.
pub fn extract_clearance_cookie(cookies: &[BrowserCookie]) -> Option<&BrowserCookie> {
    get_cookie_by_name(cookies, "cf_clearance")
}

/// Flat name → value map of the important Cloudflare cookies.
pub fn important_cookies(cookies: &[BrowserCookie]) -> HashMap<String, String> {
    cookies
        .iter()
        .filter(|c| IMPORTANT_COOKIE_NAMES.contains(&c.name.as_str()))
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect()
}

/// Format cookies for an HTTP `Cookie` header: `name=value; name2=value2`.
pub fn format_cookie_header(cookies: &[BrowserCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cookies whose domain ends with `domain` (matches bare and dot-prefixed
/// cookie domains alike).
pub fn filter_domain_cookies<'a>(
    cookies: &'a [BrowserCookie],
    domain: &str,
) -> Vec<&'a BrowserCookie> {
    cookies
        .iter()
        .filter(|c| c.domain.ends_with(domain))
        .collect()
}

pub fn get_cookie_by_name<'a>(cookies: &'a [BrowserCookie], name: &str) -> Option<&'a BrowserCookie> {
    cookies.iter().find(|c| c.name == name)
}
