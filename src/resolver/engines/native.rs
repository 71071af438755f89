// Native engine - reads the player response embedded in the watch page
//
// No third-party service involved: one GET to the watch page, then the
// `ytInitialPlayerResponse` object is parsed straight out of the HTML.
// Ciphered formats (signatureCipher instead of url) are skipped.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::resolver::diagnostics::{diagnose_error, BlockingReason};
use crate::resolver::errors::EngineError;
use crate::resolver::models::{CandidateVariant, EngineResult, MediaReference};
use crate::resolver::ranker::rank;
use crate::resolver::traits::{Engine, EngineContext};

lazy_static::lazy_static! {
    static ref PLAYER_RESPONSE_RE: Regex =
        Regex::new(r"ytInitialPlayerResponse\s*=\s*\{").unwrap();
}

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    streaming_data: Option<StreamingData>,
    video_details: Option<VideoDetails>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    formats: Vec<StreamFormat>,
    #[serde(default)]
    adaptive_formats: Vec<StreamFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamFormat {
    url: Option<String>,
    #[serde(default)]
    mime_type: String,
    width: Option<u32>,
    height: Option<u32>,
    audio_quality: Option<String>,
    audio_channels: Option<u32>,
}

impl StreamFormat {
    fn to_variant(&self) -> Option<CandidateVariant> {
        let url = self.url.clone()?;
        let has_video = self.mime_type.starts_with("video/");
        let has_audio = self.mime_type.starts_with("audio/")
            || self.audio_quality.is_some()
            || self.audio_channels.is_some();

        Some(CandidateVariant {
            url,
            has_video,
            has_audio,
            height: self.height.unwrap_or(0),
            width: self.width.unwrap_or(0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    title: Option<String>,
    thumbnail: Option<ThumbnailList>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailList {
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Watch-page scraper
pub struct NativePageEngine {
    base_url: String,
}

impl NativePageEngine {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different host (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(&self, media: &MediaReference, ctx: &EngineContext) -> Result<EngineResult, EngineError> {
        let client = ctx.http_client().await?;
        let url = format!("{}/watch?v={}", self.base_url, media.canonical_id);

        let response = client
            .get(&url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::from_status(status.as_u16()));
        }

        let html = response.text().await?;
        let player = extract_player_response(&html)?;
        self.build_result(player)
    }

    fn build_result(&self, player: PlayerResponse) -> Result<EngineResult, EngineError> {
        if let Some(playability) = &player.playability_status {
            if playability.status.as_deref().is_some_and(|s| s != "OK") {
                let reason = playability.reason.as_deref().unwrap_or("not playable");
                return Err(EngineError::Blocked(
                    diagnose_error(reason).unwrap_or(BlockingReason::Unknown),
                ));
            }
        }

        let streaming = player
            .streaming_data
            .ok_or(EngineError::MissingField("streamingData"))?;

        let variants: Vec<CandidateVariant> = streaming
            .formats
            .iter()
            .chain(streaming.adaptive_formats.iter())
            .filter_map(StreamFormat::to_variant)
            .collect();

        let best = rank(&variants).ok_or(EngineError::NoPlayableVariant)?;

        let details = player.video_details;
        let title = details
            .as_ref()
            .and_then(|d| d.title.clone())
            .unwrap_or_else(|| "YouTube Video".to_string());
        // thumbnails are listed smallest first
        let thumbnail = details
            .and_then(|d| d.thumbnail)
            .and_then(|t| t.thumbnails.into_iter().last())
            .map(|t| t.url);

        EngineResult::new(self.name(), title, best.url.clone())
            .map(|r| r.with_variant(best).with_thumbnail(thumbnail))
            .ok_or(EngineError::NoPlayableVariant)
    }
}

/// Parse the first JSON object after `ytInitialPlayerResponse =`
fn extract_player_response(html: &str) -> Result<PlayerResponse, EngineError> {
    let found = PLAYER_RESPONSE_RE
        .find(html)
        .ok_or(EngineError::MissingField("ytInitialPlayerResponse"))?;

    // the match ends just past the opening brace
    let json = &html[found.end() - 1..];
    let mut stream = serde_json::Deserializer::from_str(json).into_iter::<PlayerResponse>();
    match stream.next() {
        Some(Ok(player)) => Ok(player),
        Some(Err(e)) => Err(EngineError::Parse(e.to_string())),
        None => Err(EngineError::MissingField("ytInitialPlayerResponse")),
    }
}

impl Default for NativePageEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for NativePageEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn attempt(&self, media: &MediaReference, ctx: &EngineContext) -> Option<EngineResult> {
        match self.fetch(media, ctx).await {
            Ok(result) => Some(result),
            Err(e) => {
                debug!(engine = self.name(), id = media.canonical_id.as_str(), error = %e, "Attempt failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn media() -> MediaReference {
        MediaReference {
            raw_input: "https://youtu.be/dQw4w9WgXcQ".into(),
            canonical_id: "dQw4w9WgXcQ".into(),
        }
    }

    fn page(player: &str) -> String {
        format!(
            "<html><script>var ytInitialPlayerResponse = {};var meta = {{}};</script></html>",
            player
        )
    }

    const PLAYER: &str = r#"{
        "playabilityStatus": {"status": "OK"},
        "streamingData": {
            "formats": [
                {"url": "https://cdn/360.mp4", "mimeType": "video/mp4; codecs=\"avc1, mp4a\"", "width": 640, "height": 360, "audioQuality": "AUDIO_QUALITY_LOW"}
            ],
            "adaptiveFormats": [
                {"url": "https://cdn/1080.mp4", "mimeType": "video/mp4; codecs=\"avc1\"", "width": 1920, "height": 1080},
                {"signatureCipher": "s=abc", "mimeType": "video/mp4", "width": 3840, "height": 2160},
                {"url": "https://cdn/audio.m4a", "mimeType": "audio/mp4; codecs=\"mp4a\"", "audioQuality": "AUDIO_QUALITY_MEDIUM"}
            ]
        },
        "videoDetails": {
            "title": "Never Gonna Give You Up};",
            "thumbnail": {"thumbnails": [{"url": "https://i/small.jpg"}, {"url": "https://i/large.jpg"}]}
        }
    }"#;

    #[test]
    fn test_extract_player_response_ignores_braces_in_strings() {
        let player = extract_player_response(&page(PLAYER)).unwrap();
        let title = player.video_details.unwrap().title.unwrap();
        assert_eq!(title, "Never Gonna Give You Up};");
    }

    #[test]
    fn test_build_result_prefers_combined_stream() {
        let engine = NativePageEngine::new();
        let result = engine
            .build_result(extract_player_response(&page(PLAYER)).unwrap())
            .unwrap();

        assert_eq!(result.play_url, "https://cdn/360.mp4");
        assert_eq!(result.quality_label, "360p");
        assert_eq!(result.thumbnail_url.as_deref(), Some("https://i/large.jpg"));
        assert_eq!(result.engine_name, "native");
    }

    #[test]
    fn test_unplayable_video_is_blocked() {
        let player = r#"{"playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"}}"#;
        let err = NativePageEngine::new()
            .build_result(extract_player_response(&page(player)).unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::Blocked(BlockingReason::AgeRestricted)));
    }

    #[test]
    fn test_missing_player_response() {
        assert!(matches!(
            extract_player_response("<html></html>"),
            Err(EngineError::MissingField(_))
        ));
    }

    #[tokio::test]
    async fn test_attempt_against_mock_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/watch".into()))
            .match_query(mockito::Matcher::UrlEncoded("v".into(), "dQw4w9WgXcQ".into()))
            .with_status(200)
            .with_body(page(PLAYER))
            .create_async()
            .await;

        let engine = NativePageEngine::new().with_base_url(server.url());
        let ctx = EngineContext::new(Duration::from_secs(5));
        let result = engine.attempt(&media(), &ctx).await.unwrap();

        assert_eq!(result.title, "Never Gonna Give You Up};");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_attempt_non_200_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let engine = NativePageEngine::new().with_base_url(server.url());
        let ctx = EngineContext::new(Duration::from_secs(5));
        assert!(engine.attempt(&media(), &ctx).await.is_none());
    }
}
