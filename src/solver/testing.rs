//! Scripted [`BrowserSession`] fake shared by the resolver unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::browser::{BrowserCookie, BrowserSession, WidgetProbe, WidgetTarget};

/// Each observable (cookies, page content, widget probes, script results) is
/// a timeline: calls pop states front-to-back and the final state repeats
/// forever. Call counters let tests assert what a resolver did *not* do.
#[derive(Default)]
pub(crate) struct FakeSession {
    pub user_agent: String,

    cookie_states: Mutex<VecDeque<Vec<BrowserCookie>>>,
    content_states: Mutex<VecDeque<String>>,
    probe_states: Mutex<VecDeque<WidgetProbe>>,
    attributes: Mutex<HashMap<(String, String), Vec<String>>>,
    eval_results: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,

    pub navigations: AtomicUsize,
    pub set_contents: AtomicUsize,
    pub page_content_calls: AtomicUsize,
    pub widget_clicks: AtomicUsize,
    pub selector_clicks: AtomicUsize,
    pub resets: AtomicUsize,
}

fn pop_or_last<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut q = queue.lock().unwrap();
    if q.len() > 1 {
        q.pop_front()
    } else {
        q.front().cloned()
    }
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            ..Default::default()
        }
    }

    pub fn push_cookies(&self, cookies: Vec<BrowserCookie>) {
        self.cookie_states.lock().unwrap().push_back(cookies);
    }

    pub fn push_content(&self, html: impl Into<String>) {
        self.content_states.lock().unwrap().push_back(html.into());
    }

    pub fn push_probe(&self, probe: WidgetProbe) {
        self.probe_states.lock().unwrap().push_back(probe);
    }

    pub fn set_attributes(&self, selector: &str, attribute: &str, values: Vec<String>) {
        self.attributes
            .lock()
            .unwrap()
            .insert((selector.to_string(), attribute.to_string()), values);
    }

    pub fn push_eval(&self, script: &str, value: serde_json::Value) {
        self.eval_results
            .lock()
            .unwrap()
            .entry(script.to_string())
            .or_default()
            .push_back(value);
    }

    pub fn clearance_cookie(value: &str) -> BrowserCookie {
        BrowserCookie {
            name: "cf_clearance".to_string(),
            value: value.to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            expires: 1_900_000_000.0,
            secure: true,
            http_only: true,
            same_site: Some("None".to_string()),
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn navigate(&self, _url: &str) -> Result<()> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_content(&self, _html: &str) -> Result<()> {
        self.set_contents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        Ok(pop_or_last(&self.cookie_states).unwrap_or_default())
    }

    async fn page_content(&self) -> Result<String> {
        self.page_content_calls.fetch_add(1, Ordering::SeqCst);
        Ok(pop_or_last(&self.content_states).unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let mut results = self.eval_results.lock().unwrap();
        let value = match results.get_mut(script) {
            Some(q) if q.len() > 1 => q.pop_front().unwrap(),
            Some(q) => q.front().cloned().unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::Null,
        };
        Ok(value)
    }

    async fn element_attributes(&self, selector: &str, attribute: &str) -> Result<Vec<String>> {
        Ok(self
            .attributes
            .lock()
            .unwrap()
            .get(&(selector.to_string(), attribute.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn probe_widget(&self) -> Result<WidgetProbe> {
        pop_or_last(&self.probe_states).ok_or_else(|| anyhow!("no scripted probe"))
    }

    async fn click_widget(&self, _target: &WidgetTarget) -> Result<()> {
        self.widget_clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn click_selector(&self, _selector: &str) -> Result<()> {
        self.selector_clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_user_agent_metadata(&self) -> Result<()> {
        Ok(())
    }

    async fn clear_browsing_data(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
