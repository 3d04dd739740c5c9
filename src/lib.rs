//! hivecrawl: a distributed, resumable, proxy-rotating crawler framework.
//!
//! Many concurrent fetch workers consume a shared store-backed work queue,
//! route every request through a rotating proxy pool with health feedback,
//! and funnel parsed results to a single collector. Crawls survive crashes:
//! URLs claimed by a dead run are rolled back into the todo queue on the
//! next start. An adaptive controller steers the active-worker budget
//! toward a target QPS and shuts the task down once the queue runs dry.
//!
//! A crawl is defined by a value implementing [`Site`] and started through
//! [`Scheduler`]:
//!
//! ```no_run
//! # use hivecrawl::{Scheduler, TaskConfig};
//! # async fn start(site: impl hivecrawl::Site) -> anyhow::Result<()> {
//! let config = TaskConfig::new("my_task").proxy_pool("jhao104").threads(300).qps(50.0);
//! let report = Scheduler::connect(site, config).await?.run().await?;
//! # Ok(()) }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod fetch;
pub mod proxy_pool;
pub mod scheduler;
pub mod site;
pub mod stats;
pub mod store;
pub mod utils;
pub mod work_queue;

pub use config::{Env, PoolTunables, TaskConfig};
pub use control::Control;
pub use error::{CrawlError, CrawlResult, StoreError};
pub use proxy_pool::{FeedbackLevel, ProxyPool, ProxySource, build_sources, registered_names};
pub use scheduler::{Scheduler, TaskLog, TaskReport};
pub use site::{ParseSink, Site, TaskArgs};
pub use stats::{StatsHandle, StatsSnapshot};
pub use store::{MemoryStore, RedisStore, Store};
pub use utils::{UserAgents, clean_url};
pub use work_queue::{UrlJob, WorkQueue};
