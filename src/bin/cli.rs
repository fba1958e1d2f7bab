//! One-shot command line front end: resolve a single URL with the clearance
//! session and print the cookie, optionally as download tool commands.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cleargate::browser::{BrowserCookie, CdpSession, SessionConfig};
use cleargate::features::commands::{
    generate_aria2_command, generate_curl_command, generate_wget_command,
};
use cleargate::features::storage::{default_storage_path, write_cookie_record};
use cleargate::solver::cookies::{format_cookie_header, IMPORTANT_COOKIE_NAMES};
use cleargate::solver::{
    ChallengeResolver, ClearanceSolver, ResolveRequest, SolveParams,
};

#[derive(Parser, Debug)]
#[command(
    name = "cleargate-cli",
    version,
    about = "Obtain a Cloudflare clearance cookie for a URL"
)]
struct Args {
    /// Target URL.
    url: String,

    /// Save the earned cookies to this JSON file instead of
    /// ~/.cleargate/cookies.json.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Seconds to spend on the challenge.
    #[arg(short, long, default_value_t = 30.0)]
    timeout: f64,

    /// Proxy server, e.g. http://127.0.0.1:8080.
    #[arg(short, long)]
    proxy: Option<String>,

    /// Override the browser user agent.
    #[arg(long)]
    user_agent: Option<String>,

    /// Disable HTTP/2 in the browser.
    #[arg(long)]
    disable_http2: bool,

    /// Disable HTTP/3 in the browser.
    #[arg(long)]
    disable_http3: bool,

    /// Run the browser with a visible window.
    #[arg(long)]
    headed: bool,

    /// Put every cookie in the generated commands, not just the
    /// Cloudflare ones.
    #[arg(short = 'A', long)]
    all_cookies: bool,

    /// Print a ready-to-run curl command.
    #[arg(short, long)]
    curl: bool,

    /// Print a ready-to-run wget command.
    #[arg(short, long)]
    wget: bool,

    /// Print a ready-to-run aria2 command.
    #[arg(short, long)]
    aria2: bool,
}

fn important_only(cookies: &[BrowserCookie]) -> Vec<BrowserCookie> {
    cookies
        .iter()
        .filter(|c| IMPORTANT_COOKIE_NAMES.contains(&c.name.as_str()))
        .cloned()
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let session = CdpSession::new(SessionConfig {
        user_agent: args.user_agent.clone(),
        headless: !args.headed,
        proxy: args.proxy.clone(),
        http2: !args.disable_http2,
        http3: !args.disable_http3,
    });
    let solver = ClearanceSolver::new(session);
    solver.start().await?;

    let request = ResolveRequest {
        id: Uuid::new_v4(),
        url: args.url.clone(),
        timeout: Duration::from_secs_f64(args.timeout),
        params: SolveParams::default(),
    };
    let result = solver.resolve(&request).await;
    solver.stop().await;

    let resolution = result?;
    if !resolution.success {
        eprintln!(
            "failed: {}",
            resolution
                .error_message
                .as_deref()
                .unwrap_or("no clearance cookie obtained")
        );
        std::process::exit(1);
    }

    let clearance = resolution
        .clearance_cookie
        .as_ref()
        .map(|c| c.value.as_str())
        .unwrap_or_default();
    println!("cf_clearance: {}", clearance);
    println!("user-agent:   {}", resolution.user_agent);

    if args.all_cookies {
        for cookie in &resolution.all_cookies {
            println!("{}={}", cookie.name, cookie.value);
        }
    }

    let header_cookies = if args.all_cookies {
        resolution.all_cookies.clone()
    } else {
        important_only(&resolution.all_cookies)
    };
    let header = format_cookie_header(&header_cookies);
    let proxy = args.proxy.as_deref();

    if args.curl {
        println!("{}", generate_curl_command(&header, &resolution.user_agent, &args.url, proxy));
    }
    if args.wget {
        println!("{}", generate_wget_command(&header, &resolution.user_agent, &args.url));
    }
    if args.aria2 {
        println!("{}", generate_aria2_command(&header, &resolution.user_agent, &args.url, proxy));
    }

    if let Some(cookie) = resolution.clearance_cookie.as_ref() {
        let store = args.file.clone().or_else(default_storage_path);
        if let Some(path) = store {
            write_cookie_record(
                &path,
                cookie,
                &resolution.all_cookies,
                &resolution.user_agent,
                proxy,
            )?;
            println!("cookies saved to {}", path.display());
        }
    }

    Ok(())
}
