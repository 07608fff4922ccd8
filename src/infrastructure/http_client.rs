//! HTTP fetch layer with proxy rotation, response caching and block detection
//!
//! `FetchClient` resolves one page per call:
//! 1. serve it from the response cache, or send it through the `Transport`
//!    using the current proxy (redirects are never followed);
//! 2. on a connection-level failure, rotate the proxy, invalidate the cached
//!    entry and retry once;
//! 3. on a soft block (marker string in the body) behind a proxy, do the same
//!    with the same single retry budget.
//!
//! A second failure is fatal for the item.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{redirect, Client, ClientBuilder};
use scraper::Html;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::config::HttpConfig;
use super::crawl_error::{CrawlError, CrawlResult};
use super::proxy_rotator::{ProxyEndpoint, ProxyRotator};
use super::response_cache::{normalize_url, CacheEntry, ResponseCache};

/// A page to fetch: base URL plus optional query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl PageRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            params,
        }
    }

    /// Normalized URL used both as the cache key and as the request target.
    pub fn cache_key(&self) -> CrawlResult<String> {
        normalize_url(&self.url, &self.params)
    }

    /// The URL actually requested, query parameters included. Falls back to the
    /// bare URL when it cannot be parsed.
    pub fn full_url(&self) -> String {
        self.cache_key().unwrap_or_else(|_| self.url.clone())
    }
}

/// Raw response as produced by a `Transport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Network failures as seen by the fetch client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused/reset, timeout, or proxy handshake/auth failure.
    Connection(String),
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, proxy: Option<&ProxyEndpoint>) -> Result<RawResponse, TransportError>;
}

/// `reqwest` transport. Proxies are client-level in reqwest, so one client is
/// kept per proxy URL.
pub struct ReqwestTransport {
    config: HttpConfig,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, TransportError> {
        let proxy_url = proxy
            .map(ProxyEndpoint::to_url)
            .transpose()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let key = proxy_url.as_ref().map(ToString::to_string);

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| TransportError::Other("client registry poisoned".to_string()))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .gzip(true)
            .brotli(true)
            .redirect(redirect::Policy::none());
        if let Some(url) = proxy_url {
            let proxy = reqwest::Proxy::all(url.as_str())
                .map_err(|e| TransportError::Other(format!("Invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {e}")))?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn classify(error: &reqwest::Error) -> TransportError {
    if error.is_connect() || error.is_timeout() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &str, proxy: Option<&ProxyEndpoint>) -> Result<RawResponse, TransportError> {
        let client = self.client_for(proxy)?;
        info!("🌐 HTTP GET: {}", url);

        let response = client.get(url).send().await.map_err(|e| classify(&e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.map_err(|e| classify(&e))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// A resolved page and whether it came from the response cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub from_cache: bool,
}

impl FetchedPage {
    /// Parse the body into a queryable tree. `Html` is not `Send`, so callers
    /// parse where they use it.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct FetchClient {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ResponseCache>,
    rotator: Option<ProxyRotator>,
    block_marker: String,
}

impl FetchClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn ResponseCache>,
        rotator: Option<ProxyRotator>,
        block_marker: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            cache,
            rotator,
            block_marker: block_marker.into(),
        }
    }

    pub fn rotator(&self) -> Option<&ProxyRotator> {
        self.rotator.as_ref()
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    /// Resolve one page, spending at most one retry on a connection failure or
    /// a soft block.
    pub async fn fetch(&mut self, request: &PageRequest) -> CrawlResult<FetchedPage> {
        let key = request.cache_key()?;
        let mut retried = false;

        loop {
            let proxy = self.rotator.as_ref().map(|r| r.current().clone());

            let page = match self.resolve(&key, proxy.as_ref()).await {
                Ok(page) => page,
                Err(e) if e.is_connection_failure() && !retried => {
                    error!("Connection failure for {}: {}", key, e);
                    self.rotate_and_invalidate(&key).await?;
                    retried = true;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if page.status >= 400 {
                error!("❌ HTTP error {}: {}", page.status, key);
                return Err(CrawlError::HttpStatus {
                    status: page.status,
                    url: key,
                });
            }

            if self.is_soft_blocked(&page) {
                match proxy {
                    Some(endpoint) if !retried => {
                        error!(host = %endpoint.host, "Server blocked the ip address while fetching {}", key);
                        self.rotate_and_invalidate(&key).await?;
                        retried = true;
                        continue;
                    }
                    _ => {
                        // Keep the block page out of the cache for the next run.
                        self.cache.invalidate(&key).await?;
                        return Err(CrawlError::blocked_by_origin(&key));
                    }
                }
            }

            if (300..400).contains(&page.status) {
                warn!(
                    status = page.status,
                    location = page.header("location").unwrap_or(""),
                    "Redirect not followed for {}",
                    key
                );
            }
            return Ok(page);
        }
    }

    /// Serve from cache or go to the network, storing `200 OK` responses.
    async fn resolve(&self, key: &str, proxy: Option<&ProxyEndpoint>) -> CrawlResult<FetchedPage> {
        if let Some(entry) = self.cache.get(key).await? {
            debug!("Cache hit for {}", key);
            return Ok(FetchedPage {
                url: key.to_string(),
                status: entry.status,
                headers: entry.headers,
                body: entry.body,
                from_cache: true,
            });
        }

        let response = self.transport.send(key, proxy).await.map_err(|e| match e {
            TransportError::Connection(reason) => CrawlError::connection_failure(key, reason),
            TransportError::Other(reason) => CrawlError::Transport {
                url: key.to_string(),
                reason,
            },
        })?;

        if response.status == 200 {
            let entry = CacheEntry {
                url: key.to_string(),
                status: response.status,
                headers: response.headers.clone(),
                body: response.body.clone(),
                fetched_at: Utc::now(),
            };
            self.cache.store(key, &entry).await?;
        }

        Ok(FetchedPage {
            url: key.to_string(),
            status: response.status,
            headers: response.headers,
            body: response.body,
            from_cache: false,
        })
    }

    async fn rotate_and_invalidate(&mut self, key: &str) -> CrawlResult<()> {
        if let Some(rotator) = self.rotator.as_mut() {
            rotator.advance();
        }
        self.cache.invalidate(key).await?;
        Ok(())
    }

    fn is_soft_blocked(&self, page: &FetchedPage) -> bool {
        !self.block_marker.is_empty() && page.body.contains(&self.block_marker)
    }
}
