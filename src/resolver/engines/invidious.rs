// Invidious engine - REST API of public Invidious mirrors
//
// Mirrors come and go, so the engine walks its instance list in order and
// takes the first one that answers with at least one playable stream.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::resolver::errors::EngineError;
use crate::resolver::models::{CandidateVariant, EngineResult, MediaReference};
use crate::resolver::ranker::rank;
use crate::resolver::traits::{Engine, EngineContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    title: Option<String>,
    #[serde(default)]
    video_thumbnails: Vec<VideoThumbnail>,
    /// Muxed audio+video streams
    #[serde(default)]
    format_streams: Vec<Stream>,
    #[serde(default)]
    adaptive_formats: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct VideoThumbnail {
    quality: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Stream {
    url: Option<String>,
    #[serde(rename = "type", default)]
    mime_type: String,
    /// "1280x720"
    size: Option<String>,
    /// "720p"
    resolution: Option<String>,
}

impl Stream {
    fn dimensions(&self) -> (u32, u32) {
        if let Some((w, h)) = self.size.as_deref().and_then(|s| s.split_once('x')) {
            if let (Ok(w), Ok(h)) = (w.trim().parse(), h.trim().parse()) {
                return (w, h);
            }
        }

        let height = self
            .resolution
            .as_deref()
            .and_then(|r| r.trim_end_matches('p').parse().ok())
            .unwrap_or(0);
        (0, height)
    }

    fn to_variant(&self, muxed: bool) -> Option<CandidateVariant> {
        let url = self.url.clone().filter(|u| !u.is_empty())?;
        let (width, height) = self.dimensions();

        Some(CandidateVariant {
            url,
            has_video: muxed || self.mime_type.starts_with("video/"),
            has_audio: muxed || self.mime_type.starts_with("audio/"),
            height,
            width,
        })
    }
}

pub struct InvidiousEngine {
    instances: Vec<String>,
}

impl InvidiousEngine {
    pub fn new(instances: Vec<String>) -> Self {
        Self {
            instances: instances
                .into_iter()
                .map(|i| i.trim_end_matches('/').to_string())
                .filter(|i| !i.is_empty())
                .collect(),
        }
    }

    async fn try_instance(
        &self,
        client: &reqwest::Client,
        instance: &str,
        media: &MediaReference,
    ) -> Result<EngineResult, EngineError> {
        let url = format!("{}/api/v1/videos/{}", instance, media.canonical_id);
        let response = client
            .get(&url)
            .query(&[("fields", "title,videoThumbnails,formatStreams,adaptiveFormats")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::from_status(status.as_u16()));
        }

        let video: VideoResponse = response.json().await?;
        self.build_result(instance, video)
    }

    fn build_result(&self, instance: &str, video: VideoResponse) -> Result<EngineResult, EngineError> {
        let variants: Vec<CandidateVariant> = video
            .format_streams
            .iter()
            .filter_map(|s| s.to_variant(true))
            .chain(video.adaptive_formats.iter().filter_map(|s| s.to_variant(false)))
            .collect();

        let best = rank(&variants).ok_or(EngineError::NoPlayableVariant)?;

        let thumbnail = video
            .video_thumbnails
            .iter()
            .find(|t| t.quality.as_deref() == Some("maxres"))
            .or_else(|| video.video_thumbnails.first())
            .map(|t| absolute_url(instance, &t.url));

        let title = video.title.unwrap_or_else(|| "YouTube Video".to_string());

        EngineResult::new(self.name(), title, best.url.clone())
            .map(|r| r.with_variant(best).with_thumbnail(thumbnail))
            .ok_or(EngineError::NoPlayableVariant)
    }

    async fn fetch(&self, media: &MediaReference, ctx: &EngineContext) -> Result<EngineResult, EngineError> {
        let client = ctx.http_client().await?;

        for instance in &self.instances {
            match self.try_instance(&client, instance, media).await {
                Ok(result) => return Ok(result),
                Err(e) => debug!(engine = self.name(), instance = instance.as_str(), error = %e, "Instance failed"),
            }
        }

        Err(EngineError::AllInstancesFailed(self.instances.len()))
    }
}

fn absolute_url(instance: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{}", instance, url)
    } else {
        url.to_string()
    }
}

#[async_trait]
impl Engine for InvidiousEngine {
    fn name(&self) -> &'static str {
        "invidious"
    }

    async fn attempt(&self, media: &MediaReference, ctx: &EngineContext) -> Option<EngineResult> {
        if self.instances.is_empty() {
            return None;
        }
        self.fetch(media, ctx)
            .await
            .map_err(|e| debug!(engine = self.name(), id = media.canonical_id.as_str(), error = %e, "Attempt failed"))
            .ok()
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

    const VIDEO: &str = r#"{
        "title": "Test video",
        "videoThumbnails": [
            {"quality": "default", "url": "/vi/dQw4w9WgXcQ/default.jpg"},
            {"quality": "maxres", "url": "/vi/dQw4w9WgXcQ/maxres.jpg"}
        ],
        "formatStreams": [
            {"url": "https://cdn/360.mp4", "type": "video/mp4", "size": "640x360", "resolution": "360p"},
            {"url": "https://cdn/720.mp4", "type": "video/mp4", "resolution": "720p"}
        ],
        "adaptiveFormats": [
            {"url": "https://cdn/1080.webm", "type": "video/webm", "size": "1920x1080"},
            {"url": "https://cdn/audio.m4a", "type": "audio/mp4"}
        ]
    }"#;

    #[test]
    fn test_dimensions() {
        let s = Stream {
            url: None,
            mime_type: String::new(),
            size: Some("1280x720".into()),
            resolution: None,
        };
        assert_eq!(s.dimensions(), (1280, 720));

        let s = Stream {
            url: None,
            mime_type: String::new(),
            size: None,
            resolution: Some("480p".into()),
        };
        assert_eq!(s.dimensions(), (0, 480));
    }

    #[tokio::test]
    async fn test_falls_through_dead_instances() {
        let mut dead = mockito::Server::new_async().await;
        let dead_mock = dead
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/videos/".into()))
            .with_status(502)
            .expect(1)
            .create_async()
            .await;

        let mut alive = mockito::Server::new_async().await;
        let _alive_mock = alive
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/videos/dQw4w9WgXcQ".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VIDEO)
            .create_async()
            .await;

        let engine = InvidiousEngine::new(vec![dead.url(), format!("{}/", alive.url())]);
        let ctx = EngineContext::new(Duration::from_secs(5));
        let result = engine.attempt(&media(), &ctx).await.unwrap();

        assert_eq!(result.play_url, "https://cdn/720.mp4");
        assert_eq!(result.quality_label, "720p");
        assert_eq!(
            result.thumbnail_url,
            Some(format!("{}/vi/dQw4w9WgXcQ/maxres.jpg", alive.url()))
        );
        assert_eq!(result.engine_name, "invidious");
        dead_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_instances_dead_is_absent() {
        let mut dead = mockito::Server::new_async().await;
        let _mock = dead
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let engine = InvidiousEngine::new(vec![dead.url()]);
        let ctx = EngineContext::new(Duration::from_secs(5));
        assert!(engine.attempt(&media(), &ctx).await.is_none());
        assert!(InvidiousEngine::new(vec![]).attempt(&media(), &ctx).await.is_none());
    }
}
