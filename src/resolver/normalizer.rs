// Reference normalizer - extracts the canonical video id from any accepted URL shape

use regex::Regex;

use super::errors::NormalizationError;
use super::models::MediaReference;

lazy_static::lazy_static! {
    /// Accepted URL shapes, tried in order; first match wins.
    static ref ID_PATTERNS: [Regex; 4] = [
        // https://www.youtube.com/watch?v=ID (v= may be any query parameter)
        Regex::new(r"/watch\?(?:[^#]*&)?v=([0-9A-Za-z_-]{11})(?:[^0-9A-Za-z_-]|$)").unwrap(),
        // https://youtu.be/ID
        Regex::new(r"youtu\.be/([0-9A-Za-z_-]{11})(?:[^0-9A-Za-z_-]|$)").unwrap(),
        // https://www.youtube.com/embed/ID
        Regex::new(r"/embed/([0-9A-Za-z_-]{11})(?:[^0-9A-Za-z_-]|$)").unwrap(),
        // https://www.youtube.com/shorts/ID
        Regex::new(r"/shorts/([0-9A-Za-z_-]{11})(?:[^0-9A-Za-z_-]|$)").unwrap(),
    ];
}

/// Normalize a raw reference into its canonical id
pub fn normalize(raw_input: &str) -> Result<MediaReference, NormalizationError> {
    let trimmed = raw_input.trim();

    ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|id| MediaReference {
            raw_input: raw_input.to_string(),
            canonical_id: id.as_str().to_string(),
        })
        .ok_or_else(|| NormalizationError::NoIdentifier(raw_input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_all_shapes_share_canonical_id() {
        let inputs = [
            format!("https://www.youtube.com/watch?v={ID}"),
            format!("https://youtu.be/{ID}"),
            format!("https://www.youtube.com/embed/{ID}"),
            format!("https://www.youtube.com/shorts/{ID}"),
        ];

        for input in &inputs {
            let reference = normalize(input).unwrap();
            assert_eq!(reference.canonical_id, ID, "input: {input}");
            assert_eq!(&reference.raw_input, input);
        }
    }

    #[test]
    fn test_extra_query_parameters() {
        let r = normalize(&format!("https://www.youtube.com/watch?list=PL1&v={ID}&t=42s")).unwrap();
        assert_eq!(r.canonical_id, ID);

        let r = normalize(&format!("https://youtu.be/{ID}?si=abcdef")).unwrap();
        assert_eq!(r.canonical_id, ID);

        let r = normalize(&format!("  https://m.youtube.com/watch?v={ID}\n")).unwrap();
        assert_eq!(r.canonical_id, ID);
    }

    #[test]
    fn test_watch_url() {
        let r = normalize(&format!("https://youtu.be/{ID}")).unwrap();
        assert_eq!(r.watch_url(), format!("https://www.youtube.com/watch?v={ID}"));
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        for input in [
            "",
            "not a url",
            "https://www.youtube.com/",
            "https://www.youtube.com/watch?v=short",
            "https://vimeo.com/123456789",
            "https://vimeo.com/?v=abcdefghijk",
            "https://www.youtube.com/results?v=dQw4w9WgXcQ",
            // 12 characters is not an id
            "https://youtu.be/dQw4w9WgXcQQ",
        ] {
            assert_eq!(
                normalize(input),
                Err(NormalizationError::NoIdentifier(input.to_string())),
                "input: {input:?}"
            );
        }
    }
}
