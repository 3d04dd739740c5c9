//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use serde_json::{Value, json};

use hivecrawl::{
    Control, Env, MemoryStore, ParseSink, Site, Store, TaskArgs, TaskConfig,
};

/// Site fixture: follows every `<a href>` on a page and records one
/// `{url}` result per parsed page.
pub struct TestSite {
    pub base: String,
    pub seeds: Vec<String>,
}

impl TestSite {
    pub fn new(base: impl Into<String>, seeds: &[&str]) -> Self {
        Self {
            base: base.into(),
            seeds: seeds.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Site for TestSite {
    type Context = Vec<Value>;

    fn base_url(&self) -> &str {
        &self.base
    }

    fn prepare(&self, _args: &TaskArgs) -> Result<(Self::Context, Vec<String>)> {
        Ok((Vec::new(), self.seeds.clone()))
    }

    fn parse(
        &self,
        _control: &Control,
        doc: &Html,
        url: &str,
        out: &mut ParseSink,
    ) -> Result<()> {
        let links = Selector::parse("a[href]").map_err(|e| anyhow::anyhow!("{e}"))?;
        for anchor in doc.select(&links) {
            if let Some(href) = anchor.value().attr("href") {
                out.push_url(href);
            }
        }
        out.emit(json!({ "url": url }));
        Ok(())
    }

    fn collect_results(&self, context: &mut Self::Context, record: Value) {
        context.push(record);
    }
}

/// Task config tuned for fast test runs: one worker unit, a handful of
/// fetch slots, quick pop timeouts, and early stall termination.
pub fn fast_config(task: &str) -> TaskConfig {
    let mut config = TaskConfig::new(task)
        .proxy_pool("fake")
        .threads(4)
        .workers(1)
        .idle_windows(1);
    config.pop_timeout = Duration::from_secs(1);
    config
}

/// Fresh in-memory store, handed out both concretely and as a trait object.
pub fn memory_store() -> (Arc<MemoryStore>, Arc<dyn Store>) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();
    (store, dyn_store)
}

/// Env fixture that never touches the process environment.
pub fn test_env() -> Env {
    Env {
        redis_host: "localhost".to_string(),
        redis_port: 6379,
        proxy_pool_server_host: "localhost".to_string(),
        jhao104_port: 5010,
        scylla_port: 8899,
        karmen_port: 12345,
        cjdx_port: 3289,
    }
}

/// A minimal page body whose anchors point at `hrefs`.
pub fn page_with_links(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!("<a href=\"{href}\">link</a>"))
        .collect();
    format!("<html><head><title>t</title></head><body>{anchors}</body></html>")
}
