// Common data models for resolution

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-supplied reference reduced to its canonical video identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Input exactly as received
    pub raw_input: String,
    /// 11-character video identifier
    pub canonical_id: String,
}

impl MediaReference {
    /// Canonical watch page URL for this video
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.canonical_id)
    }
}

/// One playable stream option reported by an upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateVariant {
    pub url: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub height: u32,
    pub width: u32,
}

impl CandidateVariant {
    /// Single-file playable: video and audio in one stream
    pub fn is_combined(&self) -> bool {
        self.has_video && self.has_audio
    }
}

/// The best stream a single engine found, with descriptive metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    pub title: String,
    pub play_url: String,
    pub thumbnail_url: Option<String>,
    pub quality_label: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub engine_name: String,
}

impl EngineResult {
    /// Build a result; refuses an empty play URL.
    pub fn new(
        engine_name: impl Into<String>,
        title: impl Into<String>,
        play_url: impl Into<String>,
    ) -> Option<Self> {
        let play_url = play_url.into();
        if play_url.trim().is_empty() {
            return None;
        }
        Some(Self {
            title: title.into(),
            play_url,
            thumbnail_url: None,
            quality_label: "HD".to_string(),
            width: None,
            height: None,
            engine_name: engine_name.into(),
        })
    }

    /// Take dimensions and quality label from a ranked variant
    pub fn with_variant(mut self, variant: &CandidateVariant) -> Self {
        self.quality_label = super::ranker::quality_label(variant.height);
        self.width = (variant.width > 0).then_some(variant.width);
        self.height = (variant.height > 0).then_some(variant.height);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail_url = thumbnail.filter(|t| !t.is_empty());
        self
    }

    pub fn with_quality_label(mut self, label: impl Into<String>) -> Self {
        self.quality_label = label.into();
        self
    }
}

/// Terminal result of one resolution call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved(EngineResult),
    /// No engine in any tier produced a usable result
    Absent,
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn result(&self) -> Option<&EngineResult> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Absent => None,
        }
    }

    pub fn into_result(self) -> Option<EngineResult> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Absent => None,
        }
    }
}

impl From<Option<EngineResult>> for ResolutionOutcome {
    fn from(result: Option<EngineResult>) -> Self {
        match result {
            Some(r) => Self::Resolved(r),
            None => Self::Absent,
        }
    }
}

/// How expensive an engine is to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineWeight {
    /// Plain HTTP calls, safe to race many at once
    #[default]
    Light,
    /// Subprocess or browser; run one at a time
    Heavy,
}

impl fmt::Display for EngineWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Heavy => write!(f, "heavy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_play_url_is_refused() {
        assert!(EngineResult::new("x", "title", "").is_none());
        assert!(EngineResult::new("x", "title", "   ").is_none());
        assert!(EngineResult::new("x", "title", "https://cdn/v.mp4").is_some());
    }

    #[test]
    fn test_with_variant_sets_dimensions() {
        let variant = CandidateVariant {
            url: "https://cdn/v.mp4".into(),
            has_video: true,
            has_audio: true,
            height: 720,
            width: 1280,
        };
        let result = EngineResult::new("x", "t", "https://cdn/v.mp4")
            .unwrap()
            .with_variant(&variant);
        assert_eq!(result.quality_label, "720p");
        assert_eq!(result.height, Some(720));
        assert_eq!(result.width, Some(1280));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ResolutionOutcome::Absent).unwrap();
        assert_eq!(json["status"], "absent");

        let result = EngineResult::new("native", "t", "https://cdn/v.mp4").unwrap();
        let json = serde_json::to_value(ResolutionOutcome::Resolved(result)).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["result"]["engine_name"], "native");
    }
}
