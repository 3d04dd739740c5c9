//! User-supplied crawl definition.
//!
//! A crawl is described by one value implementing `Site`. The framework owns
//! all scheduling; the site contributes the base URL, the seed list, the
//! parser, and the result sink. `parse` runs on dispatcher tasks and must not
//! do its own I/O: discovered URLs and result records go into the `ParseSink`
//! and the framework routes them.

use std::collections::HashMap;

use reqwest::StatusCode;
use scraper::Html;
use serde_json::{Map, Value};

use crate::control::Control;

/// Startup arguments forwarded to `Site::prepare`.
#[derive(Debug, Clone)]
pub struct TaskArgs {
    pub task_name: String,
    /// Free-form keyword arguments from the task starter.
    pub extra: Map<String, Value>,
}

/// Collects what a parser produces for one page.
#[derive(Debug, Default)]
pub struct ParseSink {
    urls: Vec<(String, bool)>,
    records: Vec<Value>,
}

impl ParseSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a discovered URL behind the current backlog.
    pub fn push_url(&mut self, url: impl Into<String>) {
        self.urls.push((url.into(), false));
    }

    /// Enqueue a discovered URL ahead of the backlog (priority descent).
    pub fn push_url_front(&mut self, url: impl Into<String>) {
        self.urls.push((url.into(), true));
    }

    /// Emit one result record for the collector.
    pub fn emit(&mut self, record: Value) {
        self.records.push(record);
    }

    pub(crate) fn into_parts(self) -> (Vec<(String, bool)>, Vec<Value>) {
        (self.urls, self.records)
    }
}

/// Capability record describing one crawlable site.
///
/// Only `base_url`, `prepare`, `parse`, and `collect_results` are mandatory;
/// the remaining hooks have workable defaults.
pub trait Site: Send + Sync + 'static {
    /// State owned exclusively by the result-collector task.
    type Context: Send + 'static;

    /// Absolute URL prefix every queued path is fetched under.
    fn base_url(&self) -> &str;

    /// Build the collector context and the seed URL list.
    ///
    /// Runs once, before any worker starts.
    fn prepare(&self, args: &TaskArgs) -> anyhow::Result<(Self::Context, Vec<String>)>;

    /// Extract result records and follow-up URLs from one fetched page.
    ///
    /// `url` is the cleaned request path. Runs concurrently across dispatcher
    /// tasks; thread-unsafe work (files, accumulators) belongs in
    /// `collect_results`, which receives whatever is `emit`ted here.
    fn parse(
        &self,
        control: &Control,
        doc: &Html,
        url: &str,
        out: &mut ParseSink,
    ) -> anyhow::Result<()>;

    /// Consume one result record.
    ///
    /// Called from a single task; no synchronization needed in the context.
    fn collect_results(&self, context: &mut Self::Context, record: Value);

    /// Extra fields merged into the periodic stats line.
    fn monitor(&self, stats: &HashMap<String, i64>) -> Map<String, Value> {
        let _ = stats;
        Map::new()
    }

    /// How much of the per-job attempt budget a non-200 response consumes.
    ///
    /// Return 0 to retry such responses for free — at the cost of an
    /// unbounded attempt loop if the server never relents.
    fn handle_error(&self, status: StatusCode) -> u32 {
        let _ = status;
        1
    }

    /// Canonicalize a URL into its queue key.
    fn clean_url(&self, url: &str) -> String {
        crate::utils::clean_url(self.base_url(), url)
    }
}
