// Shared pool of public proxy endpoints
//
// The list is fetched lazily on first use and then shared read-only by every
// engine of every request. The fetch runs on its own task: callers only wait
// on it, so an engine that times out mid-fetch does not cancel it. Concurrent
// callers join the same in-flight attempt and share its outcome, success or
// failure. A failed attempt is forgotten once its waiters have seen it, and
// the next request starts a fresh one.

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::errors::EngineError;

/// Where the proxy list comes from
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &str;

    /// Fetch the full endpoint list
    async fn fetch(&self) -> Result<Vec<String>, EngineError>;
}

/// Plain-text list served over HTTP, one `host:port` or proxy URL per line
pub struct HttpProxyList {
    url: String,
    default_scheme: String,
    timeout: Duration,
}

impl HttpProxyList {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            default_scheme: "http".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Scheme used for bare `host:port` lines (e.g. "socks5h")
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn parse_list(&self, body: &str) -> Vec<String> {
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                if line.contains("://") {
                    line.to_string()
                } else {
                    format!("{}://{}", self.default_scheme, line)
                }
            })
            .filter(|endpoint| reqwest::Proxy::all(endpoint.as_str()).is_ok())
            .collect()
    }
}

#[async_trait]
impl ProxySource for HttpProxyList {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<String>, EngineError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let response = client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::from_status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(self.parse_list(&body))
    }
}

/// Fixed list, mostly useful for tests and for pinning a private pool
pub struct StaticProxyList(pub Vec<String>);

#[async_trait]
impl ProxySource for StaticProxyList {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.0.clone())
    }
}

/// Resolves to true when the attempt populated the pool
type Population = Shared<BoxFuture<'static, bool>>;

#[derive(Default)]
struct InFlight {
    generation: u64,
    current: Option<(u64, Population)>,
}

/// Lazily populated, single-flight proxy endpoint cache
pub struct ProxyPool {
    source: Arc<dyn ProxySource>,
    endpoints: Arc<OnceCell<Vec<String>>>,
    in_flight: Mutex<InFlight>,
}

impl ProxyPool {
    pub fn new(source: Box<dyn ProxySource>) -> Self {
        Self {
            source: Arc::from(source),
            endpoints: Arc::new(OnceCell::new()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// All endpoints, fetching them on first use.
    ///
    /// Returns `None` when the fetch fails or yields an empty list.
    pub async fn endpoints(&self) -> Option<&[String]> {
        if let Some(list) = self.endpoints.get() {
            return Some(list.as_slice());
        }

        let (generation, population) = self.join_or_start();
        population.await;

        // every waiter of this attempt has its outcome; let the next request start over
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&in_flight.current, Some((g, _)) if *g == generation) {
            in_flight.current = None;
        }
        drop(in_flight);

        self.endpoints.get().map(Vec::as_slice)
    }

    /// The in-flight population attempt, starting one if there is none
    fn join_or_start(&self) -> (u64, Population) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((generation, population)) = &in_flight.current {
            return (*generation, population.clone());
        }

        in_flight.generation += 1;
        let generation = in_flight.generation;
        let population = spawn_population(self.source.clone(), self.endpoints.clone());
        in_flight.current = Some((generation, population.clone()));
        (generation, population)
    }

    /// One endpoint at random
    pub async fn pick(&self) -> Option<String> {
        let endpoints = self.endpoints().await?;
        endpoints.choose(&mut rand::thread_rng()).cloned()
    }

    pub fn is_populated(&self) -> bool {
        self.endpoints.initialized()
    }
}

/// Fetch on a detached task; dropping every waiter does not cancel it
fn spawn_population(source: Arc<dyn ProxySource>, cell: Arc<OnceCell<Vec<String>>>) -> Population {
    let task = tokio::spawn(async move {
        debug!(source = source.name(), "Populating proxy pool");
        match source.fetch().await {
            Ok(list) if !list.is_empty() => {
                info!(source = source.name(), count = list.len(), "Proxy pool populated");
                let _ = cell.set(list);
                true
            }
            Ok(_) => {
                warn!(source = source.name(), "Proxy list is empty");
                false
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "Proxy pool population failed");
                false
            }
        }
    });

    task.map(|joined| joined.unwrap_or(false)).boxed().shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        /// Number of leading calls that fail
        failures: usize,
    }

    impl CountingSource {
        fn new(calls: &Arc<AtomicUsize>, delay_ms: u64, failures: usize) -> Box<Self> {
            Box::new(Self {
                calls: calls.clone(),
                delay: Duration::from_millis(delay_ms),
                failures,
            })
        }
    }

    #[async_trait]
    impl ProxySource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self) -> Result<Vec<String>, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.failures {
                return Err(EngineError::Status(503));
            }
            Ok(vec!["http://10.0.0.1:8080".into(), "http://10.0.0.2:8080".into()])
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_use_fetches_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(ProxyPool::new(CountingSource::new(&calls, 50, 0)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.pick().await }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pool.is_populated());
    }

    #[tokio::test]
    async fn test_failed_population_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = ProxyPool::new(CountingSource::new(&calls, 50, 1));

        assert!(pool.endpoints().await.is_none());
        assert!(!pool.is_populated());

        assert_eq!(pool.endpoints().await.map(|e| e.len()), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(ProxyPool::new(CountingSource::new(&calls, 50, usize::MAX)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.pick().await }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // a later request tries again
        assert!(pool.pick().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_fetch_survives_caller_timeouts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = ProxyPool::new(CountingSource::new(&calls, 300, 0));

        for _ in 0..5 {
            let _ = tokio::time::timeout(Duration::from_millis(100), pool.pick()).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pool.is_populated());
        assert!(pool.pick().await.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_completes_without_waiters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = ProxyPool::new(CountingSource::new(&calls, 100, 0));

        assert!(tokio::time::timeout(Duration::from_millis(10), pool.pick()).await.is_err());
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(pool.is_populated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_list_is_not_cached() {
        let pool = ProxyPool::new(Box::new(StaticProxyList(Vec::new())));
        assert!(pool.pick().await.is_none());
        assert!(!pool.is_populated());
    }

    #[tokio::test]
    async fn test_http_list_source() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/proxies.txt")
            .with_status(200)
            .with_body("# public list\n1.2.3.4:8080\n\nsocks5://5.6.7.8:1080\n")
            .expect(1)
            .create_async()
            .await;

        let source = HttpProxyList::new(format!("{}/proxies.txt", server.url()));
        let pool = ProxyPool::new(Box::new(source));

        let endpoints = pool.endpoints().await.unwrap();
        assert_eq!(endpoints, ["http://1.2.3.4:8080", "socks5://5.6.7.8:1080"]);

        // second call served from the cache
        assert!(pool.endpoints().await.is_some());
        mock.assert_async().await;
    }
}
