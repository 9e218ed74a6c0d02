//! Retrieval and caching of provider metadata documents.
//!
//! A [`Fetcher`] performs the HTTP GET; a [`Cache`] built by a
//! [`CacheFactory`] sits in front of it so each document is fetched once per
//! TTL, with concurrent misses coalesced into one request.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use jwt_verifier_cache::{Loader, TtlCache};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::FetchError;

/// A fetched JSON-object document (discovery metadata or a key set).
pub type Document = Arc<Map<String, Value>>;

/// Loads a document for a cache key (its URL).
pub type DocumentLoader = Loader<Document, FetchError>;

/// Fetches a JSON-object document from a URL.
///
/// Implementations must fail with [`FetchError`] unless the response status
/// is in `[200, 300)` and the body is a JSON object.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Document, FetchError>>;
}

/// Default [`Fetcher`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, custom roots, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Document, FetchError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| FetchError::Transport {
                    url: url.to_string(),
                    detail: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body: Map<String, Value> =
                response.json().await.map_err(|e| FetchError::InvalidBody {
                    url: url.to_string(),
                    detail: e.to_string(),
                })?;

            debug!(url, fields = body.len(), "fetched metadata document");
            Ok(Arc::new(body))
        })
    }
}

/// Run `fetcher` for `url`, failing with [`FetchError::Timeout`] after
/// `timeout`.
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    url: &str,
    timeout: Duration,
) -> Result<Document, FetchError> {
    let result = match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }),
    };
    if let Err(err) = &result {
        warn!(url, error = %err, "metadata fetch failed");
    }
    result
}

/// Adapt a [`Fetcher`] into a cache loader that honours `timeout`.
pub fn document_loader(fetcher: Arc<dyn Fetcher>, timeout: Duration) -> DocumentLoader {
    Arc::new(move |url: String| {
        let fetcher = Arc::clone(&fetcher);
        async move { fetch_with_timeout(fetcher.as_ref(), &url, timeout).await }.boxed()
    })
}

/// A keyed document cache. `get` returns the cached document for `key` or
/// loads it; failed loads are never cached.
pub trait Cache: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Document, FetchError>>;
}

impl Cache for TtlCache<Document, FetchError> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Document, FetchError>> {
        Box::pin(TtlCache::get(self, key))
    }
}

/// Timings handed to a [`CacheFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub cleanup_interval: Duration,
}

/// Builds a [`Cache`] around a loader. Called once for the metadata cache
/// and once for the default adaptor's key-set cache.
pub type CacheFactory = Arc<dyn Fn(DocumentLoader, CacheOptions) -> Arc<dyn Cache> + Send + Sync>;

/// Factory producing the in-memory [`TtlCache`].
pub fn default_cache_factory() -> CacheFactory {
    Arc::new(|loader: DocumentLoader, options: CacheOptions| {
        Arc::new(TtlCache::new(loader, options.ttl, options.cleanup_interval)) as Arc<dyn Cache>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Fetcher for SlowFetcher {
        fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Document, FetchError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                Ok(Arc::new(Map::new()))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_and_not_cached() {
        let fetcher = Arc::new(SlowFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(10),
        });
        let loader = document_loader(fetcher.clone(), Duration::from_secs(1));
        let cache = default_cache_factory()(
            loader,
            CacheOptions {
                ttl: Duration::from_secs(300),
                cleanup_interval: Duration::from_secs(600),
            },
        );

        let err = cache.get("https://slow.example.com/meta").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Timeout {
                url: "https://slow.example.com/meta".into(),
                timeout: Duration::from_secs(1),
            }
        );

        let _ = cache.get("https://slow.example.com/meta").await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_fetch_within_timeout() {
        let fetcher = Arc::new(SlowFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
        });
        let doc = fetch_with_timeout(fetcher.as_ref(), "u", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(doc.is_empty());
    }
}
