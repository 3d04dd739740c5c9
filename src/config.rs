//! Environment and per-task configuration.
//!
//! `Env` captures the process environment once (store endpoint, proxy-source
//! host and ports). `TaskConfig` describes a single crawl run and carries the
//! tunable thresholds that varied between deployments of this design.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-environment configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Env {
    pub redis_host: String,
    pub redis_port: u16,
    /// Host serving the proxy-source adapter HTTP endpoints.
    pub proxy_pool_server_host: String,
    pub jhao104_port: u16,
    pub scylla_port: u16,
    pub karmen_port: u16,
    pub cjdx_port: u16,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn port_or(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Env {
    pub fn from_env() -> Self {
        Self {
            redis_host: env_or("REDIS_HOST", "localhost"),
            redis_port: port_or("REDIS_PORT", 6379),
            proxy_pool_server_host: env_or("PROXY_POOL_SERVER_HOST", "localhost"),
            jhao104_port: port_or("JHAO104_PORT", 5010),
            scylla_port: port_or("SCYLLA_PORT", 8899),
            karmen_port: port_or("KARMEN_PORT", 12345),
            cjdx_port: port_or("CJDX_PORT", 3289),
        }
    }

    /// Connection URL for the backing store.
    #[must_use]
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Thresholds governing proxy health and quarantine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolTunables {
    /// Local fail count above which `get` skips an endpoint without banning it.
    pub skip_after: u32,
    /// Soft failures (level 1) above which an endpoint is banned.
    pub soft_ban_after: u32,
    /// Hard failures (level 2) above which an endpoint is banned.
    pub hard_ban_after: u32,
    /// Capacity of the circulating endpoint queue.
    pub queue_capacity: usize,
    /// How many times `shuffle` enqueues each live endpoint.
    pub repeat: usize,
}

impl Default for PoolTunables {
    fn default() -> Self {
        Self {
            skip_after: 3,
            soft_ban_after: 5,
            hard_ban_after: 2,
            queue_capacity: 100_000,
            repeat: 1,
        }
    }
}

/// Configuration for one crawl task.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Store key prefix and log file stem.
    pub task_name: String,
    /// Registered proxy-source name; `None` falls back to the fake (direct) pool.
    pub proxy_pool: Option<String>,
    /// Total fetch-worker budget across all worker units.
    pub thread_num: usize,
    /// Worker unit count; defaults to `min(cpu_count, 20)`.
    pub worker_num: Option<usize>,
    /// Target successful fetches per second; `None` leaves throughput uncapped.
    pub qps: Option<f64>,
    /// Drop all persisted task state (queues and banned proxies) before starting.
    pub restart: bool,
    /// Path to the newline-delimited User-Agent list.
    pub agents_path: String,
    /// Directory receiving the per-task event log.
    pub log_dir: String,
    /// Consecutive zero-success 5-second windows before the task self-terminates.
    pub idle_windows: u32,
    /// Per-job attempt budget inside the fetch state machine.
    pub attempt_budget: u32,
    /// Requeue cap: a URL is re-queued while `retry < max_requeues`.
    pub max_requeues: u32,
    /// Blocking-pop timeout against the todo list.
    pub pop_timeout: Duration,
    pub pool: PoolTunables,
    /// Free-form keyword arguments forwarded to `Site::prepare`.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskConfig {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            proxy_pool: None,
            thread_num: 3000,
            worker_num: None,
            qps: None,
            restart: false,
            agents_path: "resources/agents_list.txt".to_string(),
            log_dir: "logs".to_string(),
            idle_windows: 25,
            attempt_budget: 10,
            max_requeues: 3,
            pop_timeout: Duration::from_secs(10),
            pool: PoolTunables::default(),
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a keyword argument for `Site::prepare`.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn proxy_pool(mut self, name: impl Into<String>) -> Self {
        self.proxy_pool = Some(name.into());
        self
    }

    #[must_use]
    pub fn threads(mut self, n: usize) -> Self {
        self.thread_num = n;
        self
    }

    #[must_use]
    pub fn workers(mut self, n: usize) -> Self {
        self.worker_num = Some(n);
        self
    }

    #[must_use]
    pub fn qps(mut self, target: f64) -> Self {
        self.qps = Some(target);
        self
    }

    #[must_use]
    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    #[must_use]
    pub fn agents_path(mut self, path: impl Into<String>) -> Self {
        self.agents_path = path.into();
        self
    }

    #[must_use]
    pub fn idle_windows(mut self, n: u32) -> Self {
        self.idle_windows = n;
        self
    }

    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<String>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Worker unit count and per-unit thread budget.
    ///
    /// Units stand in for the worker processes of the two-level scheduling
    /// model: thread slots are numbered globally so the adaptive budget spans
    /// all units.
    #[must_use]
    pub fn layout(&self) -> (usize, usize) {
        let units = self
            .worker_num
            .unwrap_or_else(|| num_cpus::get().min(20))
            .max(1);
        let per_unit = (self.thread_num / units).clamp(1, 1000);
        (units, per_unit)
    }

    /// Store keys for this task.
    #[must_use]
    pub fn todo_key(&self) -> String {
        format!("{}_todo", self.task_name)
    }

    #[must_use]
    pub fn doing_key(&self) -> String {
        format!("{}_doing", self.task_name)
    }

    #[must_use]
    pub fn done_key(&self) -> String {
        format!("{}_done", self.task_name)
    }

    #[must_use]
    pub fn bad_proxy_key(&self) -> String {
        format!("{}@bad_proxy", self.task_name)
    }
}
