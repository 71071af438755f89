// Resolver configuration: timeouts, transport options, engine mirrors
//
// Precedence: built-in defaults < JSON file < environment < explicit setters.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::ConfigError;

/// Public Invidious instances probed in order
pub const DEFAULT_INVIDIOUS_INSTANCES: &[&str] = &[
    "https://inv.nadeko.net",
    "https://invidious.nerdvpn.de",
    "https://yewtu.be",
];

/// Public Cobalt API instances probed in order
pub const DEFAULT_COBALT_INSTANCES: &[&str] = &["https://api.cobalt.tools"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Wall-clock budget for the whole tier-1 race
    pub tier1_deadline_ms: u64,
    /// Timeout for a single light engine attempt
    pub engine_timeout_ms: u64,
    /// Timeout for a single heavy (subprocess) engine attempt
    pub heavy_engine_timeout_ms: u64,

    /// Explicit outbound proxy (http://, https://, socks5://, socks5h://)
    pub proxy: Option<String>,
    /// Probe common local SOCKS5 ports when no proxy is set
    pub auto_detect_proxy: bool,
    /// Plain-text list of public proxies feeding the shared proxy pool
    pub proxy_list_url: Option<String>,

    /// Netscape cookies.txt file
    pub cookies_path: Option<PathBuf>,
    /// User agents to rotate through; empty means built-in defaults
    pub user_agents: Vec<String>,

    pub invidious_instances: Vec<String>,
    pub cobalt_instances: Vec<String>,
    pub cobalt_api_key: Option<String>,

    /// yt-dlp binary; discovered in common locations when unset
    pub ytdlp_path: Option<String>,
    /// Register the yt-dlp engine in tier 2
    pub enable_ytdlp: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tier1_deadline_ms: 12_000,
            engine_timeout_ms: 8_000,
            heavy_engine_timeout_ms: 45_000,
            proxy: None,
            auto_detect_proxy: false,
            proxy_list_url: None,
            cookies_path: None,
            user_agents: Vec::new(),
            invidious_instances: DEFAULT_INVIDIOUS_INSTANCES.iter().map(|s| s.to_string()).collect(),
            cobalt_instances: DEFAULT_COBALT_INSTANCES.iter().map(|s| s.to_string()).collect(),
            cobalt_api_key: None,
            ytdlp_path: None,
            enable_ytdlp: true,
        }
    }
}

impl ResolverConfig {
    /// `<config dir>/tube-resolver/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tube-resolver").join("config.json"))
    }

    /// Load from a JSON file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default file if it exists, otherwise defaults
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Override from `PROXY_URL`, `RESOLVER_COOKIES` and `YTDLP_PATH`
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(proxy) = non_empty("PROXY_URL") {
            self.proxy = Some(proxy);
        }
        if let Some(path) = non_empty("RESOLVER_COOKIES") {
            self.cookies_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty("YTDLP_PATH") {
            self.ytdlp_path = Some(path);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject proxy URLs reqwest would not accept
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(proxy) = &self.proxy {
            reqwest::Proxy::all(proxy.as_str()).map_err(|_| ConfigError::InvalidProxy(proxy.clone()))?;
        }
        Ok(())
    }

    pub fn tier1_deadline(&self) -> Duration {
        Duration::from_millis(self.tier1_deadline_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn heavy_engine_timeout(&self) -> Duration {
        Duration::from_millis(self.heavy_engine_timeout_ms)
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_tier1_deadline(mut self, millis: u64) -> Self {
        self.tier1_deadline_ms = millis;
        self
    }

    pub fn with_engine_timeout(mut self, millis: u64) -> Self {
        self.engine_timeout_ms = millis;
        self
    }

    pub fn with_heavy_engine_timeout(mut self, millis: u64) -> Self {
        self.heavy_engine_timeout_ms = millis;
        self
    }

    pub fn with_proxy_list_url(mut self, url: Option<String>) -> Self {
        self.proxy_list_url = url;
        self
    }

    pub fn with_ytdlp(mut self, enabled: bool) -> Self {
        self.enable_ytdlp = enabled;
        self
    }
}
