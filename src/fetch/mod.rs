//! Per-URL fetch state machine.
//!
//! One job gets an attempt budget of `attempt_budget` tries. Every attempt
//! draws a fresh proxy from the pool, issues a GET with an exponential
//! per-attempt timeout derived from the job's requeue count, and reports the
//! proxy's behavior back to the pool. The worker never touches the work
//! queue: it hands `(body | give-up, job)` to the dispatcher and moves on.

use std::sync::Arc;
use std::time::Duration;

use log::error;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;

use crate::control::Control;
use crate::proxy_pool::{FeedbackLevel, ProxyPool};
use crate::scheduler::TaskLog;
use crate::site::Site;
use crate::utils::UserAgents;
use crate::work_queue::UrlJob;

/// Everything a fetch worker needs besides the job itself.
pub struct FetchContext {
    pub base_url: String,
    pub agents: Arc<UserAgents>,
    pub pool: Arc<ProxyPool>,
    pub control: Control,
    pub log: TaskLog,
    pub attempt_budget: u32,
}

/// Per-attempt timeout: `5 + 2^retry` seconds.
#[must_use]
pub fn attempt_timeout(retry: u32) -> Duration {
    Duration::from_secs(5 + (1u64 << retry.min(6)))
}

/// Run the attempt loop for one job.
///
/// Returns the response body on an HTTP 200, or `None` when the budget is
/// exhausted or the task is terminating. Proxy feedback: 0 on success, 2 on
/// proxy-layer rejection, 1 on everything else that failed.
pub async fn fetch_one<S: Site>(cx: &FetchContext, site: &S, job: &UrlJob) -> Option<String> {
    let target = format!("{}{}", cx.base_url, job.url);
    let timeout = attempt_timeout(job.retry);
    let mut remaining = i64::from(cx.attempt_budget);

    while remaining > 0 {
        if cx.control.is_terminated() {
            return None;
        }
        let proxy = match cx.pool.get().await {
            Ok(proxy) => proxy,
            Err(err) => {
                error!("Proxy pool lost the store: {err}");
                cx.control.signal_terminate();
                return None;
            }
        };

        let client = match build_client(proxy.as_deref()) {
            Ok(client) => client,
            Err(err) => {
                cx.log.event(format!("Proxy Error: url={}", job.url));
                error!("Unusable proxy endpoint {proxy:?}: {err}");
                give_feedback(cx, proxy.as_deref(), FeedbackLevel::Hard).await;
                remaining -= 1;
                continue;
            }
        };

        let request = client
            .get(&target)
            .header(USER_AGENT, cx.agents.pick())
            .timeout(timeout);

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                match response.text().await {
                    Ok(body) => {
                        give_feedback(cx, proxy.as_deref(), FeedbackLevel::Success).await;
                        return Some(body);
                    }
                    Err(err) => {
                        give_feedback(cx, proxy.as_deref(), FeedbackLevel::Soft).await;
                        cx.log.event(format!(
                            "Connection Error: url={} error={err}",
                            job.url
                        ));
                        remaining -= 1;
                    }
                }
            }
            Ok(response) => {
                give_feedback(cx, proxy.as_deref(), FeedbackLevel::Soft).await;
                cx.log.event(format!(
                    "Status_code Error: url={}, code={}",
                    job.url,
                    response.status().as_u16()
                ));
                remaining -= i64::from(site.handle_error(response.status()));
            }
            Err(err) => {
                if proxy.is_some() && err.is_connect() {
                    // Could not reach the proxy itself.
                    give_feedback(cx, proxy.as_deref(), FeedbackLevel::Hard).await;
                    cx.log.event(format!("Proxy Error: url={}", job.url));
                } else {
                    give_feedback(cx, proxy.as_deref(), FeedbackLevel::Soft).await;
                    cx.log.event(format!(
                        "Connection Error: url={} error={err}",
                        job.url
                    ));
                }
                remaining -= 1;
            }
        }
    }
    None
}

fn build_client(proxy: Option<&str>) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(true);
    if let Some(endpoint) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(endpoint)?);
    }
    Ok(builder.build()?)
}

async fn give_feedback(cx: &FetchContext, proxy: Option<&str>, level: FeedbackLevel) {
    if let Some(endpoint) = proxy {
        if let Err(err) = cx.pool.feedback(endpoint, level).await {
            error!("Proxy feedback lost the store: {err}");
            cx.control.signal_terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_grows_exponentially_with_retry() {
        assert_eq!(attempt_timeout(0), Duration::from_secs(6));
        assert_eq!(attempt_timeout(1), Duration::from_secs(7));
        assert_eq!(attempt_timeout(2), Duration::from_secs(9));
        assert_eq!(attempt_timeout(3), Duration::from_secs(13));
        // Capped exponent keeps degenerate retry counts sane.
        assert_eq!(attempt_timeout(30), Duration::from_secs(69));
    }
}
