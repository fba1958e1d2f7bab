//! Render download tool invocations that reuse an earned clearance.

/// Tools the command generator knows about. aria2 rejects SOCKS proxies, so
/// only HTTP proxies are threaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTool {
    Curl,
    Wget,
    Aria2,
}

impl DownloadTool {
    fn label(&self) -> &'static str {
        match self {
            DownloadTool::Curl => "cURL",
            DownloadTool::Wget => "WGET",
            DownloadTool::Aria2 => "Aria2",
        }
    }

    fn binary(&self) -> &'static str {
        match self {
            DownloadTool::Curl => "curl",
            DownloadTool::Wget => "wget",
            DownloadTool::Aria2 => "aria2c",
        }
    }

    fn url_argument(&self, url: &str, proxy: Option<&str>) -> String {
        match (self, proxy) {
            (DownloadTool::Curl, Some(p)) => format!("--proxy {} {}", p, url),
            (DownloadTool::Aria2, Some(p)) => format!("--all-proxy {} {}", p, url),
            // wget picks proxies up from the environment instead.
            _ => url.to_string(),
        }
    }
}

/// Render one labelled command line with the cookie and user agent headers
/// filled in.
pub fn generate_command(
    tool: DownloadTool,
    cookie_header: &str,
    user_agent: &str,
    url: &str,
    proxy: Option<&str>,
) -> String {
    format!(
        "{}: {} --header \"Cookie: {}\" --header \"User-Agent: {}\" {}",
        tool.label(),
        tool.binary(),
        cookie_header,
        user_agent,
        tool.url_argument(url, proxy),
    )
}

pub fn generate_curl_command(
    cookie_header: &str,
    user_agent: &str,
    url: &str,
    proxy: Option<&str>,
) -> String {
    generate_command(DownloadTool::Curl, cookie_header, user_agent, url, proxy)
}

pub fn generate_wget_command(cookie_header: &str, user_agent: &str, url: &str) -> String {
    generate_command(DownloadTool::Wget, cookie_header, user_agent, url, None)
}

pub fn generate_aria2_command(
    cookie_header: &str,
    user_agent: &str,
    url: &str,
    proxy: Option<&str>,
) -> String {
    generate_command(DownloadTool::Aria2, cookie_header, user_agent, url, proxy)
}
