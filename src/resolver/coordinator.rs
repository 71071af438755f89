// Coordinator - public entry point of the resolver
//
// normalize -> schedule tiers -> outcome. Normalization failures are
// reported before any engine is touched.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::ResolverConfig;
use super::engines::{CobaltEngine, InvidiousEngine, NativePageEngine, YtDlpEngine};
use super::errors::{ConfigError, ResolveError};
use super::models::ResolutionOutcome;
use super::network::{CookieSet, UserAgentPool};
use super::normalizer::normalize;
use super::proxy_pool::{HttpProxyList, ProxyPool};
use super::scheduler::{ResolutionReport, TierScheduler, TierTable, TierTimeouts, RACE_TIER};
use super::traits::{Engine, EngineContext};
use super::utils::auto_detect_proxy;

/// Tier the heavy fallback engines are registered in
const FALLBACK_TIER: u8 = 2;

pub struct Resolver {
    table: TierTable,
    scheduler: TierScheduler,
    context: EngineContext,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    /// Standard engine line-up with the networking described by `config`
    pub async fn from_config(config: &ResolverConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let cookies = match &config.cookies_path {
            Some(path) => {
                let set = CookieSet::load(path)?;
                info!(path = %path.display(), cookies = set.entries().len(), "Loaded cookies");
                Some(Arc::new(set))
            }
            None => None,
        };

        let proxy = match &config.proxy {
            Some(proxy) => Some(proxy.clone()),
            None if config.auto_detect_proxy => auto_detect_proxy()
                .await
                .inspect(|p| info!(proxy = p.as_str(), "Auto-detected local proxy")),
            None => None,
        };

        let proxy_pool = config
            .proxy_list_url
            .as_ref()
            .map(|url| Arc::new(ProxyPool::new(Box::new(HttpProxyList::new(url.clone())))));

        let context = EngineContext::new(config.engine_timeout())
            .with_proxy(proxy)
            .with_proxy_pool(proxy_pool)
            .with_user_agents(Arc::new(UserAgentPool::new(config.user_agents.clone())))
            .with_cookies(cookies);

        let timeouts = TierTimeouts {
            tier1_deadline: config.tier1_deadline(),
            engine_timeout: config.engine_timeout(),
            heavy_engine_timeout: config.heavy_engine_timeout(),
        };

        Ok(Self {
            table: Self::default_table(config),
            scheduler: TierScheduler::new(timeouts),
            context,
        })
    }

    /// native, invidious and cobalt race in tier 1; yt-dlp waits in tier 2
    pub fn default_table(config: &ResolverConfig) -> TierTable {
        let mut table = TierTable::new()
            .with(RACE_TIER, Arc::new(NativePageEngine::new()))
            .with(RACE_TIER, Arc::new(InvidiousEngine::new(config.invidious_instances.clone())))
            .with(
                RACE_TIER,
                Arc::new(
                    CobaltEngine::new(config.cobalt_instances.clone())
                        .with_api_key(config.cobalt_api_key.clone()),
                ),
            );

        if config.enable_ytdlp {
            table.register(FALLBACK_TIER, Arc::new(YtDlpEngine::new(config.ytdlp_path.clone())));
        }
        table
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Resolve a raw link to the outcome alone
    pub async fn resolve(&self, raw_input: &str) -> Result<ResolutionOutcome, ResolveError> {
        Ok(self.resolve_with_report(raw_input).await?.outcome)
    }

    /// Resolve a raw link, keeping the per-engine attempt log
    pub async fn resolve_with_report(&self, raw_input: &str) -> Result<ResolutionReport, ResolveError> {
        let media = normalize(raw_input).inspect_err(|e| warn!(error = %e, "Rejected input"))?;
        debug!(id = media.canonical_id.as_str(), engines = ?self.table, "Resolving");

        Ok(self.scheduler.run(&self.table, &media, &self.context).await)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("table", &self.table)
            .field("timeouts", self.scheduler.timeouts())
            .field("context", &self.context)
            .finish()
    }
}

/// Hand-assembled resolver: custom engines, timeouts and context
#[derive(Default)]
pub struct ResolverBuilder {
    table: TierTable,
    timeouts: TierTimeouts,
    context: Option<EngineContext>,
}

impl ResolverBuilder {
    pub fn engine(mut self, tier: u8, engine: Arc<dyn Engine>) -> Self {
        self.table.register(tier, engine);
        self
    }

    pub fn table(mut self, table: TierTable) -> Self {
        self.table = table;
        self
    }

    pub fn timeouts(mut self, timeouts: TierTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn tier1_deadline(mut self, deadline: Duration) -> Self {
        self.timeouts.tier1_deadline = deadline;
        self
    }

    pub fn context(mut self, context: EngineContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn build(self) -> Resolver {
        let context = self
            .context
            .unwrap_or_else(|| EngineContext::new(self.timeouts.engine_timeout));
        Resolver {
            table: self.table,
            scheduler: TierScheduler::new(self.timeouts),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::engines::ScriptedEngine;
    use crate::resolver::errors::NormalizationError;
    use crate::resolver::scheduler::{AttemptStatus, SchedulerState};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_invalid_reference_touches_no_engine() {
        let spy = ScriptedEngine::succeeding("spy", "https://cdn/v.mp4");
        let calls = spy.calls();
        let resolver = Resolver::builder().engine(1, Arc::new(spy)).build();

        let err = resolver.resolve("https://example.com/not-a-video").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidReference(NormalizationError::NoIdentifier(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_second_tier() {
        let resolver = Resolver::builder()
            .engine(1, Arc::new(ScriptedEngine::absent("fast-a")))
            .engine(1, Arc::new(ScriptedEngine::panicking("fast-b")))
            .engine(2, Arc::new(ScriptedEngine::succeeding("slow", "https://cdn/slow.mp4")))
            .build();

        let report = resolver
            .resolve_with_report("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42")
            .await
            .unwrap();

        assert_eq!(report.state, SchedulerState::Resolved);
        let result = report.outcome.result().unwrap();
        assert_eq!(result.play_url, "https://cdn/slow.mp4");
        assert_eq!(result.engine_name, "slow");
        assert_eq!(
            report.attempts_for("fast-b").next().map(|a| a.status),
            Some(AttemptStatus::Panicked)
        );
    }

    #[tokio::test]
    async fn test_all_engines_absent() {
        let resolver = Resolver::builder()
            .engine(1, Arc::new(ScriptedEngine::absent("a")))
            .engine(2, Arc::new(ScriptedEngine::absent("b")))
            .build();

        let outcome = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(outcome, ResolutionOutcome::Absent);
    }

    #[tokio::test]
    async fn test_deadline_from_builder() {
        let resolver = Resolver::builder()
            .engine(1, Arc::new(ScriptedEngine::hanging("stuck")))
            .tier1_deadline(Duration::from_millis(50))
            .build();

        let report = resolver
            .resolve_with_report("https://www.youtube.com/shorts/dQw4w9WgXcQ")
            .await
            .unwrap();
        assert_eq!(report.state, SchedulerState::Exhausted);
        assert!(report.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_from_config_registers_default_engines() {
        let resolver = Resolver::from_config(&ResolverConfig::default()).await.unwrap();
        assert_eq!(
            resolver.table().engine_names(),
            vec![(1, "native"), (1, "invidious"), (1, "cobalt"), (2, "yt-dlp")]
        );
        assert!(resolver.context().proxy.is_none());

        let config = ResolverConfig::default()
            .with_ytdlp(false)
            .with_proxy(Some("socks5h://127.0.0.1:9050".into()));
        let resolver = Resolver::from_config(&config).await.unwrap();
        assert_eq!(resolver.table().len(), 3);
        assert_eq!(resolver.context().proxy.as_deref(), Some("socks5h://127.0.0.1:9050"));
    }

    #[tokio::test]
    async fn test_from_config_missing_cookies_file() {
        let config = ResolverConfig::default()
            .with_cookies_path(Some("/nonexistent/cookies.txt".into()));
        assert!(matches!(
            Resolver::from_config(&config).await,
            Err(ConfigError::Io { .. })
        ));
    }
}
