// yt-dlp engine - heavy fallback through the native `yt-dlp` binary
//
// Slow (process start, full extraction) but the most likely to work when
// the light engines are blocked. Tries several YouTube player clients in
// turn; android is least likely to be blocked without cookies, web handles
// age-gated videos when cookies are available.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Command as StdCommand;
use tracing::{debug, info};

use crate::resolver::errors::EngineError;
use crate::resolver::models::{CandidateVariant, EngineResult, EngineWeight, MediaReference};
use crate::resolver::ranker::rank;
use crate::resolver::traits::{Engine, EngineContext};
use crate::resolver::utils::run_output_with_timeout;

#[derive(Debug, Deserialize)]
struct DumpJson {
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<DumpFormat>,
    /// Present when yt-dlp already merged a single best format
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DumpFormat {
    url: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    protocol: Option<String>,
}

impl DumpFormat {
    fn to_variant(&self) -> Option<CandidateVariant> {
        let url = self.url.clone().filter(|u| !u.is_empty())?;
        // storyboards and other non-media entries have no codecs at all
        let has_video = self.vcodec.as_deref().is_some_and(|v| v != "none");
        let has_audio = self.acodec.as_deref().is_some_and(|a| a != "none");
        if self.protocol.as_deref() == Some("mhtml") {
            return None;
        }

        Some(CandidateVariant {
            url,
            has_video,
            has_audio,
            height: self.height.unwrap_or(0),
            width: self.width.unwrap_or(0),
        })
    }
}

pub struct YtDlpEngine {
    ytdlp_path: String,
}

impl YtDlpEngine {
    pub fn new(ytdlp_path: Option<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.unwrap_or_else(Self::find_ytdlp),
        }
    }

    /// Find yt-dlp binary
    fn find_ytdlp() -> String {
        let common_paths = [
            "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
            "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
            "/usr/bin/yt-dlp",          // System installation
        ];

        for path in common_paths {
            if std::path::Path::new(path).exists() {
                return path.to_string();
            }
        }

        if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return path;
                }
            }
        }

        "yt-dlp".to_string()
    }

    pub fn path(&self) -> &str {
        &self.ytdlp_path
    }

    /// Player clients to try, in order
    fn clients(ctx: &EngineContext) -> &'static [&'static str] {
        if ctx.cookies.is_some() {
            &["web", "android"]
        } else {
            &["android", "tv", "web"]
        }
    }

    fn build_args(
        &self,
        media: &MediaReference,
        ctx: &EngineContext,
        proxy: Option<&str>,
        client: &str,
    ) -> Vec<String> {
        let socket_timeout = ctx.timeout.as_secs().clamp(5, 30);
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
            "--socket-timeout".to_string(),
            socket_timeout.to_string(),
            "--retries".to_string(),
            "1".to_string(),
            "--user-agent".to_string(),
            ctx.user_agent().to_string(),
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", client),
        ];

        if let Some(cookies) = &ctx.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.path().display().to_string());
        }

        if let Some(proxy) = proxy {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }

        args.push(media.watch_url());
        args
    }

    fn parse_json(&self, stdout: &[u8]) -> Result<EngineResult, EngineError> {
        let dump: DumpJson = serde_json::from_slice(stdout)?;

        let mut variants: Vec<CandidateVariant> =
            dump.formats.iter().filter_map(DumpFormat::to_variant).collect();
        if variants.is_empty() {
            if let Some(url) = dump.url.clone() {
                variants.push(CandidateVariant {
                    url,
                    has_video: true,
                    has_audio: true,
                    height: dump.height.unwrap_or(0),
                    width: dump.width.unwrap_or(0),
                });
            }
        }

        let best = rank(&variants).ok_or(EngineError::NoPlayableVariant)?;
        let title = dump.title.unwrap_or_else(|| "YouTube Video".to_string());

        EngineResult::new(self.name(), title, best.url.clone())
            .map(|r| r.with_variant(best).with_thumbnail(dump.thumbnail))
            .ok_or(EngineError::NoPlayableVariant)
    }

    async fn extract(&self, media: &MediaReference, ctx: &EngineContext) -> Result<EngineResult, EngineError> {
        let proxy = ctx.outbound_proxy().await;
        let clients = Self::clients(ctx);
        // split the attempt budget between clients so the last one still gets a turn
        let per_client = ctx.timeout / clients.len() as u32;
        let mut last_error = EngineError::ToolNotFound(self.ytdlp_path.clone());

        for client in clients {
            let args = self.build_args(media, ctx, proxy.as_deref(), client);
            debug!(engine = self.name(), client, "Running {} {}", self.ytdlp_path, args.join(" "));

            match run_output_with_timeout(&self.ytdlp_path, &args, per_client).await {
                Ok(out) if out.status.success() => return self.parse_json(&out.stdout),
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    last_error = EngineError::from_tool_output(&stderr);
                    debug!(engine = self.name(), client, error = %last_error, "Client failed");
                    if let EngineError::Blocked(reason) = &last_error {
                        if let Some(hint) = reason.remedy(ctx.cookies.is_some(), proxy.is_some()) {
                            info!(engine = self.name(), reason = %reason, hint, "Blocked upstream");
                        }
                        // a permanent restriction will not change with another client
                        if reason.is_permanent() {
                            break;
                        }
                    }
                }
                Err(e @ EngineError::ToolNotFound(_)) => return Err(e),
                Err(e) => {
                    debug!(engine = self.name(), client, error = %e, "Client error");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Engine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn weight(&self) -> EngineWeight {
        EngineWeight::Heavy
    }

    async fn attempt(&self, media: &MediaReference, ctx: &EngineContext) -> Option<EngineResult> {
        self.extract(media, ctx)
            .await
            .map_err(|e| debug!(engine = self.name(), id = media.canonical_id.as_str(), error = %e, "Attempt failed"))
            .ok()
    }
}
