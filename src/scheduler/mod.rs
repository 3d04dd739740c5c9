//! Task supervisor.
//!
//! Wires one crawl run together: user `prepare`, proxy pool warm-up, the
//! helper tasks (result collector, stats aggregator, task log, monitor), and
//! the worker units. A worker unit is one rank of the two-level scheduling
//! model: a queue puller feeding a bounded local job channel, a fleet of
//! fetch tasks gated by the adaptive budget, and a dispatcher draining the
//! local response channel. Rank 0 additionally rolls back the `doing` set
//! left by a prior run and injects the seed URLs.
//!
//! Worker units share nothing but the backing store, the proxy pool, and the
//! typed runtime control state, so pointing several processes at the same
//! store yields the same cooperative behavior.

pub mod collector;
pub mod controller;
pub mod dispatch;
pub mod logger;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use log::{error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{Env, TaskConfig};
use crate::control::Control;
use crate::error::{CrawlError, CrawlResult, StoreError};
use crate::fetch::{self, FetchContext};
use crate::proxy_pool::{ProxyPool, build_sources};
use crate::site::{Site, TaskArgs};
use crate::stats::{self, StatsHandle, StatsSnapshot};
use crate::store::{RedisStore, Store};
use crate::utils::UserAgents;
use crate::work_queue::{UrlCleaner, UrlJob, WorkQueue};

use controller::SpeedGovernor;
use dispatch::DispatchContext;
pub use logger::TaskLog;

/// Monitor sampling interval.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
/// Sleep for fetch slots that are over budget or find no job.
const IDLE_BACKOFF: Duration = Duration::from_millis(500);
/// Startup delay for ranks above 0, giving rank 0 time to roll back.
const RANK_STARTUP_DELAY: Duration = Duration::from_secs(3);

const RESULTS_CHANNEL_CAPACITY: usize = 100_000;
const STATS_CHANNEL_CAPACITY: usize = 100_000;
const RESPONSE_CHANNEL_CAPACITY: usize = 1_000_000;

/// Outcome of a finished task.
pub struct TaskReport<C> {
    /// The collector context, with everything the run accumulated.
    pub context: C,
    /// Final counter values.
    pub stats: HashMap<String, i64>,
}

/// Supervisor for one crawl task.
pub struct Scheduler<S: Site> {
    site: Arc<S>,
    config: TaskConfig,
    env: Env,
    store: Arc<dyn Store>,
}

impl<S: Site> Scheduler<S> {
    /// Build a scheduler against the store endpoint from the environment.
    pub async fn connect(site: S, config: TaskConfig) -> CrawlResult<Self> {
        let env = Env::from_env();
        let store = RedisStore::connect(&env.redis_url()).await?;
        Ok(Self::with_store(site, config, env, Arc::new(store)))
    }

    /// Build a scheduler against an explicit store. Used by tests and
    /// embedders that manage their own store handle.
    pub fn with_store(site: S, config: TaskConfig, env: Env, store: Arc<dyn Store>) -> Self {
        Self {
            site: Arc::new(site),
            config,
            env,
            store,
        }
    }

    /// Run the task to completion (stall termination, store failure, or
    /// interrupt) and return the collector context plus final counters.
    pub async fn run(self) -> CrawlResult<TaskReport<S::Context>> {
        let Self {
            site,
            config,
            env,
            store,
        } = self;

        let args = TaskArgs {
            task_name: config.task_name.clone(),
            extra: config.extra.clone(),
        };
        let (context, seeds) = site.prepare(&args).map_err(CrawlError::Prepare)?;

        let (units, per_unit) = config.layout();
        let total_threads = units * per_unit;
        info!(
            "{} task starts: {units} worker units x {per_unit} fetch threads.",
            config.task_name
        );

        let control = Control::new(total_threads as f64 / 2.0);
        let (stats_handle, snapshot, stats_task) = stats::spawn_aggregator(STATS_CHANNEL_CAPACITY);
        let (log, log_task) = logger::spawn_log_writer(&config.task_name, &config.log_dir)
            .await
            .map_err(|err| CrawlError::Supervisor(format!("cannot open task log: {err}")))?;

        let pool_name = match config.proxy_pool.as_deref() {
            Some(name) => name.to_string(),
            None => {
                warn!("No proxy pool is specified. Use fake proxy pool.");
                "fake".to_string()
            }
        };
        let sources =
            build_sources(&pool_name, &env).map_err(|err| CrawlError::Config(err.to_string()))?;
        info!("Use {pool_name} proxy pool");
        let pool = Arc::new(ProxyPool::new(
            sources,
            Arc::clone(&store),
            config.bad_proxy_key(),
            config.pool,
        ));

        let cleaner: UrlCleaner = {
            let site = Arc::clone(&site);
            Arc::new(move |url: &str| site.clean_url(url))
        };
        let queue = Arc::new(WorkQueue::new(
            Arc::clone(&store),
            &config.task_name,
            cleaner,
            stats_handle.clone(),
            config.pop_timeout,
            config.max_requeues,
        ));

        if config.restart {
            queue.reset().await?;
            pool.clear_bans().await?;
        }
        pool.collect().await?;
        pool.shuffle();

        let (results_tx, results_rx) = mpsc::channel::<Value>(RESULTS_CHANNEL_CAPACITY);
        let collector = collector::spawn_collector(Arc::clone(&site), context, results_rx);
        let agents = Arc::new(UserAgents::load_or_default(&config.agents_path));

        let mut unit_handles = Vec::with_capacity(units);
        for rank in 0..units {
            let cx = UnitContext {
                rank,
                threads: per_unit,
                seeds: if rank == 0 { seeds.clone() } else { Vec::new() },
                site: Arc::clone(&site),
                queue: Arc::clone(&queue),
                pool: Arc::clone(&pool),
                control: control.clone(),
                stats: stats_handle.clone(),
                log: log.clone(),
                results: results_tx.clone(),
                agents: Arc::clone(&agents),
                base_url: site.base_url().to_string(),
                attempt_budget: config.attempt_budget,
            };
            unit_handles.push(tokio::spawn(run_worker_unit(cx)));
        }
        drop(results_tx);

        let monitor = tokio::spawn(monitor_loop(MonitorContext {
            site: Arc::clone(&site),
            snapshot: snapshot.clone(),
            control: control.clone(),
            queue: Arc::clone(&queue),
            pool: Arc::clone(&pool),
            log: log.clone(),
            governor: SpeedGovernor::new(config.qps, total_threads),
            idle_windows: config.idle_windows,
        }));

        let units_done = future::join_all(unit_handles);
        tokio::pin!(units_done);
        let unit_results = tokio::select! {
            results = &mut units_done => results,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received. Terminating {}.", config.task_name);
                control.signal_terminate();
                (&mut units_done).await
            }
        };
        control.signal_terminate();

        let mut failure: Option<StoreError> = None;
        for result in unit_results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("Worker unit failed: {err}");
                    failure.get_or_insert(err);
                }
                Err(err) => error!("Worker unit panicked: {err}"),
            }
        }
        let _ = monitor.await;

        // Close the stats, result, and log channels so their tasks drain.
        drop(queue);
        drop(stats_handle);
        drop(log);
        let _ = stats_task.await;
        let context = collector
            .await
            .map_err(|err| CrawlError::Supervisor(format!("result collector died: {err}")))?;
        let _ = log_task.await;

        info!("{} task finished.", config.task_name);
        if let Some(err) = failure {
            return Err(err.into());
        }
        Ok(TaskReport {
            context,
            stats: snapshot.to_map(),
        })
    }
}

struct UnitContext<S: Site> {
    rank: usize,
    threads: usize,
    seeds: Vec<String>,
    site: Arc<S>,
    queue: Arc<WorkQueue>,
    pool: Arc<ProxyPool>,
    control: Control,
    stats: StatsHandle,
    log: TaskLog,
    results: mpsc::Sender<Value>,
    agents: Arc<UserAgents>,
    base_url: String,
    attempt_budget: u32,
}

/// One rank: rollback/seeding (rank 0), queue puller, fetch fleet,
/// dispatcher. Returns when the terminate flag drains the pipeline.
async fn run_worker_unit<S: Site>(cx: UnitContext<S>) -> Result<(), StoreError> {
    info!("Rank: {} started, with max {} threads.", cx.rank, cx.threads);
    if cx.rank == 0 {
        cx.queue.rollback().await?;
        for url in &cx.seeds {
            cx.queue.push(url, 0, true).await?;
        }
    } else {
        tokio::time::sleep(RANK_STARTUP_DELAY).await;
    }

    let (jobs_tx, jobs_rx) = mpsc::channel::<UrlJob>(cx.threads);
    let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));
    let (resp_tx, mut resp_rx) =
        mpsc::channel::<(Option<String>, UrlJob)>(RESPONSE_CHANNEL_CAPACITY);

    let puller = {
        let queue = Arc::clone(&cx.queue);
        let control = cx.control.clone();
        tokio::spawn(async move {
            loop {
                if control.is_terminated() {
                    break;
                }
                match queue.pop().await {
                    Ok(Some(job)) => {
                        if jobs_tx.send(job).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!("Queue puller lost the store: {err}");
                        control.signal_terminate();
                        break;
                    }
                }
            }
        })
    };

    let mut fetchers = Vec::with_capacity(cx.threads);
    for thread in 0..cx.threads {
        let slot = (cx.rank * cx.threads + thread) as f64;
        let jobs_rx = Arc::clone(&jobs_rx);
        let resp_tx = resp_tx.clone();
        let control = cx.control.clone();
        let site = Arc::clone(&cx.site);
        let fetch_cx = FetchContext {
            base_url: cx.base_url.clone(),
            agents: Arc::clone(&cx.agents),
            pool: Arc::clone(&cx.pool),
            control: control.clone(),
            log: cx.log.clone(),
            attempt_budget: cx.attempt_budget,
        };
        fetchers.push(tokio::spawn(async move {
            loop {
                if control.is_terminated() {
                    break;
                }
                if slot >= control.budget() {
                    tokio::time::sleep(IDLE_BACKOFF).await;
                    continue;
                }
                let job = {
                    let mut rx = jobs_rx.lock().await;
                    match tokio::time::timeout(IDLE_BACKOFF, rx.recv()).await {
                        Ok(Some(job)) => job,
                        Ok(None) => break,
                        Err(_) => continue,
                    }
                };
                control.job_started();
                let body = fetch::fetch_one(&fetch_cx, site.as_ref(), &job).await;
                control.job_finished();
                if resp_tx.send((body, job)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(resp_tx);

    let dispatch_cx = DispatchContext {
        site: Arc::clone(&cx.site),
        queue: Arc::clone(&cx.queue),
        results: cx.results.clone(),
        stats: cx.stats.clone(),
        log: cx.log.clone(),
        control: cx.control.clone(),
    };
    let mut outcome = Ok(());
    while let Some((body, job)) = resp_rx.recv().await {
        if let Err(err) = dispatch::dispatch_one(&dispatch_cx, body, job).await {
            error!("Dispatcher lost the store: {err}");
            cx.control.signal_terminate();
            outcome = Err(err);
            break;
        }
    }

    let _ = puller.await;
    for fetcher in fetchers {
        let _ = fetcher.await;
    }
    outcome
}

struct MonitorContext<S: Site> {
    site: Arc<S>,
    snapshot: StatsSnapshot,
    control: Control,
    queue: Arc<WorkQueue>,
    pool: Arc<ProxyPool>,
    log: TaskLog,
    governor: SpeedGovernor,
    idle_windows: u32,
}

/// Periodic sampling: feed the governor, emit the stats line, and terminate
/// the task after enough consecutive stalled windows.
async fn monitor_loop<S: Site>(mut cx: MonitorContext<S>) {
    let started = Instant::now();
    let mut last_tick = Instant::now();
    let mut last_success = 0i64;
    let mut zeros = 0u32;

    loop {
        tokio::time::sleep(SAMPLE_INTERVAL).await;
        if cx.control.is_terminated() {
            break;
        }
        let dt = last_tick.elapsed().as_secs_f64().max(f64::EPSILON);
        last_tick = Instant::now();

        let stats_map = cx.snapshot.to_map();
        let success = stats_map.get(stats::SUCCESS).copied().unwrap_or(0);
        let new_total = success - last_success;
        last_success = success;
        let time_escape = started.elapsed().as_secs().max(1);
        let real_speed = new_total as f64 / dt;
        cx.governor.observe(real_speed, dt, &cx.control);

        let todo_len = match cx.queue.todo_len().await {
            Ok(len) => len,
            Err(err) => {
                error!("Monitor lost the store: {err}");
                cx.control.signal_terminate();
                break;
            }
        };
        let banned = cx.pool.banned_len().await.unwrap_or(0);

        let mut line = serde_json::Map::new();
        for (key, value) in &stats_map {
            line.insert(key.clone(), Value::from(*value));
        }
        line.insert("time_escape(s)".to_string(), Value::from(time_escape));
        line.insert("new_total".to_string(), Value::from(new_total));
        line.insert(
            "speed (pages/sec)".to_string(),
            Value::from((success as f64 / time_escape as f64 * 100.0).round() / 100.0),
        );
        line.insert(
            "real time speed (pages/sec)".to_string(),
            Value::from((real_speed * 100.0).round() / 100.0),
        );
        line.insert("todo_queue_size".to_string(), Value::from(todo_len));
        line.insert("cur_threads".to_string(), Value::from(cx.control.budget()));
        line.insert("bad_proxies".to_string(), Value::from(banned));
        line.insert(
            "proxies_queue_size".to_string(),
            Value::from(cx.pool.queue_len()),
        );
        line.insert("working".to_string(), Value::from(cx.control.working()));
        for (key, value) in cx.site.monitor(&stats_map) {
            line.insert(key, value);
        }
        let json = Value::Object(line).to_string();
        info!("{json}");
        cx.log.event(json);

        if new_total == 0 {
            zeros += 1;
            if zeros > cx.idle_windows {
                info!("No new pages for {zeros} windows. Terminating task.");
                cx.control.signal_terminate();
                break;
            }
        } else {
            zeros = 0;
        }
    }
}
