//! Per-origin connection pool registry.
//!
//! One keep-alive [`reqwest::Client`] per origin, created lazily on first
//! use and retained for process lifetime. Keeping pools per origin bounds
//! idle-connection reuse to the host that earned it and lets a misbehaving
//! origin be torn down without disturbing the rest.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProxyError, Result};

/// `scheme://host[:port]` triple identifying an upstream server. Hosts are
/// lowercased and default ports are dropped during URL parsing, so two
/// spellings of the same origin share a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    pub fn of(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::invalid_url(url.as_str(), "URL has no host"))?;

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            // `Url` already strips scheme-default ports.
            port: url.port(),
        })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Per-origin pool limits.
///
/// `max_pipelined_per_connection` is honored through HTTP/2 multiplexing:
/// with rustls, HTTP/2 is negotiated via ALPN and a single connection
/// carries concurrent streams, so no explicit HTTP/1.1 pipelining is
/// attempted.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_pipelined_per_connection: usize,
    pub keep_alive_idle: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_pipelined_per_connection: 5,
            keep_alive_idle: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Registry mapping [`Origin`] to its pooled client. Construction is
/// at-most-once per origin: the registry lock is held across the lookup and
/// the insert.
pub struct PoolManager {
    config: PoolConfig,
    pools: Mutex<HashMap<Origin, Client>>,
}

impl PoolManager {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve (or lazily create) the pooled client for an origin.
    pub fn client_for(&self, origin: &Origin) -> Result<Client> {
        let mut pools = self.pools.lock().unwrap();
        if let Some(client) = pools.get(origin) {
            return Ok(client.clone());
        }

        debug!(origin = %origin, "creating connection pool");
        let client = self.build_pooled_client()?;
        pools.insert(origin.clone(), client.clone());
        Ok(client)
    }

    /// Issue a request on the origin's pooled client. On a transport-level
    /// failure the request is retried once on a fresh non-pooled client;
    /// only the fallback's error surfaces to the caller. The response body
    /// is not buffered.
    pub async fn request(
        &self,
        url: &Url,
        method: Method,
        headers: HeaderMap,
        body: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let origin = Origin::of(url)?;
        let client = self.client_for(&origin)?;

        match send(&client, url, method.clone(), headers.clone(), body.clone(), timeout).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_transport() => {
                warn!(
                    origin = %origin,
                    error = %err,
                    "pooled request failed; retrying on a one-shot client"
                );
                let oneshot = self.build_oneshot_client()?;
                send(&oneshot, url, method, headers, body, timeout).await
            }
            Err(err) => Err(err),
        }
    }

    /// Drop every pool and clear the registry. Idle connections close as
    /// the clients are dropped. Shutdown only.
    pub fn close_all(&self) {
        let mut pools = self.pools.lock().unwrap();
        let drained = pools.len();
        pools.clear();
        debug!(pools = drained, "connection pools drained");
    }

    fn build_pooled_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .pool_max_idle_per_host(self.config.max_connections)
            .pool_idle_timeout(self.config.keep_alive_idle)
            .connect_timeout(self.config.connect_timeout)
            .tcp_nodelay(true)
            .build()?)
    }

    fn build_oneshot_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .pool_max_idle_per_host(0)
            .connect_timeout(self.config.connect_timeout)
            .tcp_nodelay(true)
            .build()?)
    }

    #[cfg(test)]
    fn pool_count(&self) -> usize {
        self.pools.lock().unwrap().len()
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

async fn send(
    client: &Client,
    url: &Url,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
) -> Result<Response> {
    let mut request = client.request(method, url.clone()).headers(headers);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    if let Some(body) = body {
        request = request.body(body);
    }
    Ok(request.send().await?)
}
