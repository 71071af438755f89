// Engine trait and the per-attempt context every engine receives

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::errors::EngineError;
use super::models::{EngineResult, EngineWeight, MediaReference};
use super::network::{CookieSet, UserAgentPool};
use super::proxy_pool::ProxyPool;

/// A single source able to turn a video reference into a playable URL.
///
/// `attempt` never fails loudly: every expected failure (bad status, timeout,
/// malformed payload) is `None`. Panics are caught by the scheduler.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the engine (for logging and the result's `engine_name`)
    fn name(&self) -> &'static str;

    /// Cost class; heavy engines belong in a sequential tier
    fn weight(&self) -> EngineWeight {
        EngineWeight::Light
    }

    async fn attempt(&self, media: &MediaReference, ctx: &EngineContext) -> Option<EngineResult>;
}

/// Ambient capabilities for one engine attempt.
///
/// Cheap to clone; the scheduler clones it per attempt with the timeout it
/// picked for that engine.
#[derive(Clone)]
pub struct EngineContext {
    /// Explicit outbound proxy; wins over the pool
    pub proxy: Option<String>,
    pub proxy_pool: Option<Arc<ProxyPool>>,
    pub user_agents: Arc<UserAgentPool>,
    pub cookies: Option<Arc<CookieSet>>,
    /// Budget for this attempt, set by the scheduler
    pub timeout: Duration,
}

impl EngineContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            proxy: None,
            proxy_pool: None,
            user_agents: Arc::new(UserAgentPool::default()),
            cookies: None,
            timeout,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_proxy_pool(mut self, pool: Option<Arc<ProxyPool>>) -> Self {
        self.proxy_pool = pool;
        self
    }

    pub fn with_user_agents(mut self, agents: Arc<UserAgentPool>) -> Self {
        self.user_agents = agents;
        self
    }

    pub fn with_cookies(mut self, cookies: Option<Arc<CookieSet>>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut ctx = self.clone();
        ctx.timeout = timeout;
        ctx
    }

    pub fn user_agent(&self) -> &str {
        self.user_agents.pick()
    }

    /// Explicit proxy, else a random endpoint from the shared pool
    pub async fn outbound_proxy(&self) -> Option<String> {
        if let Some(proxy) = &self.proxy {
            return Some(proxy.clone());
        }
        match &self.proxy_pool {
            Some(pool) => pool.pick().await,
            None => None,
        }
    }

    /// HTTP client honoring the proxy, cookies and timeout of this attempt
    pub async fn http_client(&self) -> Result<reqwest::Client, EngineError> {
        let proxy = self.outbound_proxy().await;
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent().to_string());

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        if let Some(cookies) = &self.cookies {
            builder = builder.cookie_provider(cookies.to_jar());
        }

        Ok(builder.build()?)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("proxy", &self.proxy)
            .field("proxy_pool", &self.proxy_pool.is_some())
            .field("user_agents", &self.user_agents.len())
            .field("cookies", &self.cookies.as_ref().map(|c| c.path().to_path_buf()))
            .field("timeout", &self.timeout)
            .finish()
    }
}
