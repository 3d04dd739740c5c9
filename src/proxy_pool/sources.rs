//! Upstream proxy-source adapters.
//!
//! An adapter's whole contract is a name and, on demand, a finite list of
//! endpoint strings. Adapters are registered in an explicit table built at
//! startup; tasks select one by name. Each HTTP adapter fronts one of the
//! community proxy-pool servers and understands that server's JSON shape.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Env;

/// Per-request timeout for adapter fetches.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// One upstream supplier of proxy endpoints.
#[async_trait]
pub trait ProxySource: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Fetch the source's current endpoint list.
    async fn collect(&self) -> anyhow::Result<Vec<String>>;
}

/// Adapter names accepted by `build_sources`.
#[must_use]
pub fn registered_names() -> &'static [&'static str] {
    &[
        "fake",
        "jhao104",
        "scylla",
        "karmenzind",
        "chenjiandongx",
        "mixed",
    ]
}

/// Resolve an adapter name into source values.
///
/// `fake` resolves to no sources at all (every fetch goes direct); `mixed`
/// aggregates the jhao104, scylla, and karmenzind servers.
pub fn build_sources(name: &str, env: &Env) -> anyhow::Result<Vec<Box<dyn ProxySource>>> {
    let host = &env.proxy_pool_server_host;
    match name {
        "fake" => Ok(Vec::new()),
        "jhao104" => Ok(vec![Box::new(Jhao104Source::new(host, env.jhao104_port))]),
        "scylla" => Ok(vec![Box::new(ScyllaSource::new(host, env.scylla_port))]),
        "karmenzind" => Ok(vec![Box::new(KarmenzindSource::new(
            host,
            env.karmen_port,
        ))]),
        "chenjiandongx" => Ok(vec![Box::new(ChenjiandongxSource::new(
            host,
            env.cjdx_port,
        ))]),
        "mixed" => Ok(vec![
            Box::new(Jhao104Source::new(host, env.jhao104_port)),
            Box::new(ScyllaSource::new(host, env.scylla_port)),
            Box::new(KarmenzindSource::new(host, env.karmen_port)),
        ]),
        other => bail!(
            "proxy pool {other:?} is not registered (available: {})",
            registered_names().join(", ")
        ),
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(url: &str) -> anyhow::Result<T> {
    reqwest::Client::new()
        .get(url)
        .timeout(SOURCE_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?
        .json::<T>()
        .await
        .with_context(|| format!("decoding reply from {url}"))
}

/// <https://github.com/jhao104/proxy_pool>: `GET /get_all/` returns a JSON
/// array of endpoint strings.
#[derive(Debug)]
pub struct Jhao104Source {
    base: String,
}

impl Jhao104Source {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base(format!("http://{host}:{port}"))
    }

    #[must_use]
    pub fn with_base(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProxySource for Jhao104Source {
    fn name(&self) -> &str {
        "jhao104"
    }

    async fn collect(&self) -> anyhow::Result<Vec<String>> {
        get_json::<Vec<String>>(&format!("{}/get_all/", self.base)).await
    }
}

#[derive(Deserialize)]
struct IpPort {
    ip: String,
    port: u16,
}

#[derive(Deserialize)]
struct ScyllaReply {
    proxies: Vec<IpPort>,
}

/// <https://github.com/imWildCat/scylla>: `GET /api/v1/proxies` returns
/// `{"proxies": [{"ip": ..., "port": ...}, ...]}`.
#[derive(Debug)]
pub struct ScyllaSource {
    base: String,
}

impl ScyllaSource {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base(format!("http://{host}:{port}"))
    }

    #[must_use]
    pub fn with_base(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProxySource for ScyllaSource {
    fn name(&self) -> &str {
        "scylla"
    }

    async fn collect(&self) -> anyhow::Result<Vec<String>> {
        let reply: ScyllaReply = get_json(&format!("{}/api/v1/proxies", self.base)).await?;
        Ok(reply
            .proxies
            .into_iter()
            .map(|p| format!("{}:{}", p.ip, p.port))
            .collect())
    }
}

#[derive(Deserialize)]
struct KarmenzindDetail {
    detail: Vec<IpPort>,
}

#[derive(Deserialize)]
struct KarmenzindReply {
    data: KarmenzindDetail,
}

/// <https://github.com/Karmenzind/fp-server>: `GET /api/proxy/?count=N`
/// returns `{"data": {"detail": [{"ip": ..., "port": ...}, ...]}}`.
#[derive(Debug)]
pub struct KarmenzindSource {
    base: String,
}

impl KarmenzindSource {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base(format!("http://{host}:{port}"))
    }

    #[must_use]
    pub fn with_base(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProxySource for KarmenzindSource {
    fn name(&self) -> &str {
        "karmenzind"
    }

    async fn collect(&self) -> anyhow::Result<Vec<String>> {
        let reply: KarmenzindReply =
            get_json(&format!("{}/api/proxy/?count=10000", self.base)).await?;
        Ok(reply
            .data
            .detail
            .into_iter()
            .map(|p| format!("{}:{}", p.ip, p.port))
            .collect())
    }
}

/// <https://github.com/chenjiandongx/async-proxy-pool>: `GET /get/N` returns
/// `[{<any-key>: endpoint}, ...]`; only the value is meaningful.
#[derive(Debug)]
pub struct ChenjiandongxSource {
    base: String,
}

impl ChenjiandongxSource {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base(format!("http://{host}:{port}"))
    }

    #[must_use]
    pub fn with_base(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProxySource for ChenjiandongxSource {
    fn name(&self) -> &str {
        "chenjiandongx"
    }

    async fn collect(&self) -> anyhow::Result<Vec<String>> {
        let rows: Vec<HashMap<String, serde_json::Value>> =
            get_json(&format!("{}/get/100000", self.base)).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.into_values()
                    .next()
                    .and_then(|v| v.as_str().map(str::to_string))
            })
            .collect())
    }
}
