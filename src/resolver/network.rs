// Ambient network capabilities handed to engines: user-agent rotation and cookies

use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::Jar;

use super::errors::ConfigError;

/// Desktop browser user agents used when the config does not supply any
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Pool of user-agent strings; every request draws one at random
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    /// Empty input falls back to [`DEFAULT_USER_AGENTS`]
    pub fn new(agents: Vec<String>) -> Self {
        let agents: Vec<String> = agents
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        if agents.is_empty() {
            Self::default()
        } else {
            Self { agents }
        }
    }

    pub fn pick(&self) -> &str {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self {
            agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One line of a Netscape cookies.txt file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub name: String,
    pub value: String,
}

/// Persisted cookie set, loaded once from a cookies.txt file.
///
/// HTTP engines get it as a reqwest cookie jar; subprocess engines get the
/// file path.
#[derive(Debug, Clone)]
pub struct CookieSet {
    path: PathBuf,
    entries: Vec<CookieEntry>,
}

impl CookieSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            entries: parse_netscape(&content),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[CookieEntry] {
        &self.entries
    }

    /// Build a cookie jar for reqwest
    pub fn to_jar(&self) -> Arc<Jar> {
        let jar = Jar::default();

        for entry in &self.entries {
            let host = entry.domain.trim_start_matches('.');
            let url = format!("https://{}{}", host, entry.path);
            let Ok(url) = url.parse::<reqwest::Url>() else {
                continue;
            };

            let mut cookie = format!(
                "{}={}; Domain={}; Path={}",
                entry.name, entry.value, entry.domain, entry.path
            );
            if entry.secure {
                cookie.push_str("; Secure");
            }
            jar.add_cookie_str(&cookie, &url);
        }

        Arc::new(jar)
    }
}

fn parse_netscape(content: &str) -> Vec<CookieEntry> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
            if line.is_empty() || line.starts_with('#') {
                return None;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                return None;
            }

            Some(CookieEntry {
                domain: fields[0].to_string(),
                path: fields[2].to_string(),
                secure: fields[3].eq_ignore_ascii_case("TRUE"),
                name: fields[5].to_string(),
                value: fields[6].to_string(),
            })
        })
        .collect()
}
