// Cobalt engine - "give me one link" style API
//
// The upstream picks the stream itself, so there is nothing to rank: the
// engine only has to get a URL out of one of its instances.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resolver::diagnostics::BlockingReason;
use crate::resolver::errors::EngineError;
use crate::resolver::models::{EngineResult, MediaReference};
use crate::resolver::traits::{Engine, EngineContext};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CobaltRequest<'a> {
    url: &'a str,
    video_quality: &'a str,
}

#[derive(Debug, Deserialize)]
struct CobaltResponse {
    status: String,
    url: Option<String>,
    filename: Option<String>,
    #[serde(default)]
    picker: Vec<PickerItem>,
    error: Option<CobaltError>,
}

#[derive(Debug, Deserialize)]
struct PickerItem {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: String,
    thumb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CobaltError {
    code: String,
}

pub struct CobaltEngine {
    instances: Vec<String>,
    api_key: Option<String>,
    video_quality: String,
}

impl CobaltEngine {
    pub fn new(instances: Vec<String>) -> Self {
        Self {
            instances: instances
                .into_iter()
                .map(|i| i.trim_end_matches('/').to_string())
                .filter(|i| !i.is_empty())
                .collect(),
            api_key: None,
            video_quality: "1080".to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Quality hint sent upstream ("max", "1080", "720", ...)
    pub fn with_video_quality(mut self, quality: impl Into<String>) -> Self {
        self.video_quality = quality.into();
        self
    }

    async fn try_instance(
        &self,
        client: &reqwest::Client,
        instance: &str,
        media: &MediaReference,
    ) -> Result<EngineResult, EngineError> {
        let watch_url = media.watch_url();
        let mut request = client
            .post(format!("{}/", instance))
            .header("Accept", "application/json")
            .json(&CobaltRequest {
                url: &watch_url,
                video_quality: &self.video_quality,
            });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Api-Key {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        // errors come back as JSON too, usually with 400
        let body: CobaltResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(EngineError::from_status(status.as_u16())),
            Err(e) => return Err(e.into()),
        };

        self.build_result(body)
    }

    fn build_result(&self, body: CobaltResponse) -> Result<EngineResult, EngineError> {
        let (url, thumbnail) = match body.status.as_str() {
            "tunnel" | "redirect" | "stream" => (body.url.ok_or(EngineError::MissingField("url"))?, None),
            "picker" => body
                .picker
                .into_iter()
                .find(|item| item.kind.as_deref().map_or(true, |k| k == "video"))
                .map(|item| (item.url, item.thumb))
                .ok_or(EngineError::NoPlayableVariant)?,
            "error" => {
                let code = body.error.map(|e| e.code).unwrap_or_default();
                return Err(match error_reason(&code) {
                    Some(reason) => EngineError::Blocked(reason),
                    None => EngineError::Execution(code),
                });
            }
            other => return Err(EngineError::Parse(format!("unexpected status {:?}", other))),
        };

        let title = body
            .filename
            .as_deref()
            .map(strip_extension)
            .filter(|t| !t.is_empty())
            .unwrap_or("YouTube Video")
            .to_string();

        EngineResult::new(self.name(), title, url)
            .map(|r| r.with_thumbnail(thumbnail).with_quality_label("HD"))
            .ok_or(EngineError::MissingField("url"))
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

/// Map an error code like `error.api.content.video.age` to a blocking reason
fn error_reason(code: &str) -> Option<BlockingReason> {
    code.split('.').find_map(|segment| match segment {
        "age" => Some(BlockingReason::AgeRestricted),
        "region" => Some(BlockingReason::GeoBlocked),
        "private" => Some(BlockingReason::PrivateVideo),
        "unavailable" | "empty" => Some(BlockingReason::VideoUnavailable),
        "rate_exceeded" => Some(BlockingReason::RateLimited),
        s if s.starts_with("auth") => Some(BlockingReason::Http403Forbidden),
        _ => None,
    })
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains(' ') && ext.len() <= 4 => stem.trim(),
        _ => filename.trim(),
    }
}

#[async_trait]
impl Engine for CobaltEngine {
    fn name(&self) -> &'static str {
        "cobalt"
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
