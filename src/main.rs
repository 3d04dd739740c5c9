//! Demo crawler binary.
//!
//! Crawls one site breadth-first from `/`, following same-host links and
//! recording page titles. Mostly useful as a template for real `Site`
//! implementations and for exercising a store + proxy-pool deployment end
//! to end.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use url::Url;

use hivecrawl::{
    Control, MemoryStore, ParseSink, Scheduler, Site, TaskArgs, TaskConfig,
};

#[derive(Parser, Debug)]
#[command(name = "hivecrawl", about = "Distributed proxy-rotating crawler demo")]
struct Args {
    /// Absolute base URL to crawl, e.g. https://example.com
    #[arg(long)]
    base_url: String,

    /// Task name; prefixes every store key.
    #[arg(long, default_value = "simple_crawler")]
    task: String,

    /// Proxy-source adapter (fake, jhao104, scylla, karmenzind, chenjiandongx, mixed).
    #[arg(long, default_value = "fake")]
    proxy_pool: String,

    /// Total fetch-worker budget across all worker units.
    #[arg(long, default_value_t = 64)]
    threads: usize,

    /// Target successful fetches per second; omit for uncapped.
    #[arg(long)]
    qps: Option<f64>,

    /// Drop all persisted task state before starting.
    #[arg(long)]
    restart: bool,

    /// Use an in-process store instead of Redis (single run, no resume).
    #[arg(long)]
    memory_store: bool,

    /// Stalled 5-second windows before the task terminates itself.
    #[arg(long, default_value_t = 5)]
    idle_windows: u32,
}

/// Follows same-host links and records `{url, title}` per page.
struct SimpleSite {
    base_url: String,
    host: String,
}

impl SimpleSite {
    fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("base URL has no host: {base_url}"))?
            .to_string();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    fn same_host(&self, href: &str) -> bool {
        match Url::parse(href) {
            Ok(url) => url.host_str() == Some(self.host.as_str()),
            // Relative links stay on the host by definition.
            Err(_) => !href.starts_with("//"),
        }
    }
}

impl Site for SimpleSite {
    type Context = Vec<Value>;

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn prepare(&self, args: &TaskArgs) -> Result<(Self::Context, Vec<String>)> {
        info!("Preparing task {}", args.task_name);
        Ok((Vec::new(), vec!["/".to_string()]))
    }

    fn parse(
        &self,
        _control: &Control,
        doc: &Html,
        url: &str,
        out: &mut ParseSink,
    ) -> Result<()> {
        let title_sel = Selector::parse("title").map_err(|e| anyhow::anyhow!("{e}"))?;
        let link_sel = Selector::parse("a[href]").map_err(|e| anyhow::anyhow!("{e}"))?;

        let title = doc
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        out.emit(json!({ "url": url, "title": title.trim() }));

        for anchor in doc.select(&link_sel) {
            if let Some(href) = anchor.value().attr("href") {
                let href = href.trim();
                if href.is_empty()
                    || href.starts_with('#')
                    || href.starts_with("mailto:")
                    || href.starts_with("javascript:")
                {
                    continue;
                }
                if self.same_host(href) {
                    out.push_url(href);
                }
            }
        }
        Ok(())
    }

    fn collect_results(&self, context: &mut Self::Context, record: Value) {
        info!("Collected: {record}");
        context.push(record);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let site = SimpleSite::new(&args.base_url)?;
    let mut config = TaskConfig::new(&args.task)
        .proxy_pool(&args.proxy_pool)
        .threads(args.threads)
        .restart(args.restart)
        .idle_windows(args.idle_windows);
    if let Some(qps) = args.qps {
        config = config.qps(qps);
    }

    let report = if args.memory_store {
        let env = hivecrawl::Env::from_env();
        Scheduler::with_store(site, config, env, Arc::new(MemoryStore::new()))
            .run()
            .await?
    } else {
        Scheduler::connect(site, config).await?.run().await?
    };

    info!(
        "Crawl finished: {} pages collected, stats: {:?}",
        report.context.len(),
        report.stats
    );
    Ok(())
}
