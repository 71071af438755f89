// Result ranker - the single quality policy shared by every engine that sees raw streams
//
// Combined (video+audio) variants beat video-only ones regardless of height;
// inside each group the tallest wins and ties keep upstream order.

use super::models::CandidateVariant;

/// Pick the best playable variant, or `None` when nothing has video.
pub fn rank(variants: &[CandidateVariant]) -> Option<&CandidateVariant> {
    let playable = || variants.iter().filter(|v| v.has_video && !v.url.is_empty());

    best_by_height(playable().filter(|v| v.has_audio))
        .or_else(|| best_by_height(playable()))
}

/// First variant of maximal height; `max_by_key` would return the last one.
fn best_by_height<'a>(
    variants: impl Iterator<Item = &'a CandidateVariant>,
) -> Option<&'a CandidateVariant> {
    variants.fold(None::<&'a CandidateVariant>, |best, v| match best {
        Some(b) if b.height >= v.height => Some(b),
        _ => Some(v),
    })
}

/// Display label for a stream height ("720p"), "HD" when unknown
pub fn quality_label(height: u32) -> String {
    if height == 0 {
        "HD".to_string()
    } else {
        format!("{}p", height)
    }
}
