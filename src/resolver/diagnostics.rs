// Failure diagnostics - classifies why an upstream refused to hand over a stream
//
// Engines never surface these to the caller (a failed engine is just absent),
// but the reason ends up in the debug log so an operator can tell a dead
// mirror from an IP block or a video that nobody can resolve.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static::lazy_static! {
    /// Whole words only: "parental" must not read as "rental"
    static ref DRM_RE: Regex = Regex::new(
        r"\b(drm|widevine|playready|fairplay|rental)\b|encrypted media|requires purchase"
    )
    .unwrap();
}

/// Reasons why an upstream might refuse a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// PO Token (Proof of Origin) required
    PoTokenRequired,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Network timeout (soft IP block)
    NetworkTimeout,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered
    BotDetection,

    /// Private video requiring authorization
    PrivateVideo,

    /// Video deleted or unavailable
    VideoUnavailable,

    /// DRM-protected content, never resolvable
    DrmProtected,

    /// Generic/unknown blocking
    Unknown,
}

impl BlockingReason {
    /// Check if cookies might help
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::PoTokenRequired
                | Self::AgeRestricted
                | Self::BotDetection
                | Self::PrivateVideo
        )
    }

    /// Check if proxy might help
    pub fn proxy_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::GeoBlocked
                | Self::NetworkTimeout
                | Self::RateLimited
                | Self::BotDetection
        )
    }

    /// Check if this is a permanent restriction (no engine can get around it)
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DrmProtected | Self::VideoUnavailable)
    }

    /// What the caller could add to get around this, given what it already has
    pub fn remedy(&self, has_cookies: bool, has_proxy: bool) -> Option<&'static str> {
        if self.is_permanent() {
            return None;
        }
        if self.cookies_might_help() && !has_cookies {
            return Some("configure cookies_path with a logged-in cookies.txt");
        }
        if self.proxy_might_help() && !has_proxy {
            return Some("configure a proxy or proxy_list_url");
        }
        None
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::PoTokenRequired => "Proof of Origin token required",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::RateLimited => "Rate limited by upstream",
            Self::BotDetection => "Bot detection triggered",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::DrmProtected => "DRM-protected content",
            Self::Unknown => "Unknown blocking reason",
        }
    }

    /// Map an HTTP status code to a reason, when the code alone says enough
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            403 => Some(Self::Http403Forbidden),
            404 | 410 => Some(Self::VideoUnavailable),
            408 | 504 => Some(Self::NetworkTimeout),
            429 => Some(Self::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Analyze an error message (tool stderr, API error text) and return the blocking reason
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    if DRM_RE.is_match(&lower) {
        return Some(BlockingReason::DrmProtected);
    }

    if lower.contains("po token") || lower.contains("proof of origin") {
        return Some(BlockingReason::PoTokenRequired);
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return Some(BlockingReason::AgeRestricted);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(BlockingReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
        || lower.contains("video is unavailable")
    {
        return Some(BlockingReason::VideoUnavailable);
    }

    if lower.contains("not available in your country") || lower.contains("blocked in your country") {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(BlockingReason::RateLimited);
    }

    // "sign in to confirm you're not a bot"
    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("automated")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(BlockingReason::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(BlockingReason::Unknown);
    }

    None
}
