//! Parse dispatch.
//!
//! The dispatcher settles each fetched job against the work queue: give-ups
//! go back through `fail_recoverable`, successes are finished *before* the
//! parser runs, so a URL's done transition always precedes any URL the
//! parser discovers on that page. Parser exceptions are logged and counted
//! but never retried — the page was fetched and stays done.

use std::sync::Arc;

use log::error;
use scraper::Html;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::control::Control;
use crate::error::StoreError;
use crate::site::{ParseSink, Site};
use crate::stats::{self, StatsHandle};
use crate::work_queue::{UrlJob, WorkQueue};

use super::TaskLog;

/// Shared handles the dispatcher needs for one worker unit.
pub struct DispatchContext<S: Site> {
    pub site: Arc<S>,
    pub queue: Arc<WorkQueue>,
    pub results: mpsc::Sender<Value>,
    pub stats: StatsHandle,
    pub log: TaskLog,
    pub control: Control,
}

/// Settle one `(body, job)` pair from the response channel.
pub async fn dispatch_one<S: Site>(
    cx: &DispatchContext<S>,
    body: Option<String>,
    job: UrlJob,
) -> Result<(), StoreError> {
    let Some(body) = body else {
        cx.queue.fail_recoverable(&job).await?;
        cx.stats.bump(stats::ERROR, 1).await;
        return Ok(());
    };

    cx.queue.finish(&job.url).await?;

    // The parsed document is not Send; parse inside a block so it is gone
    // before the first await below.
    let parsed = {
        let doc = Html::parse_document(&body);
        let mut sink = ParseSink::new();
        cx.site
            .parse(&cx.control, &doc, &job.url, &mut sink)
            .map(|()| sink)
    };

    match parsed {
        Ok(sink) => {
            let (urls, records) = sink.into_parts();
            for (url, front) in urls {
                cx.queue.push(&url, 0, front).await?;
            }
            for record in records {
                let _ = cx.results.send(record).await;
            }
            cx.stats.bump(stats::SUCCESS, 1).await;
            cx.log.event(format!("success: {}", job.url));
        }
        Err(err) => {
            error!(
                "Error occurs when parsing the content: {err:#} ({})",
                job.url
            );
            cx.log.event(format!("Parsing Error: url={}", job.url));
            cx.stats.bump(stats::ERROR, 1).await;
        }
    }
    Ok(())
}
