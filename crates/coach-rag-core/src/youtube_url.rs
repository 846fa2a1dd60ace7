//! YouTube URL parsing and canonicalization.
//!
//! Video sources are deduplicated by their canonical watch URL rather than
//! by transcript hash, since captions can change without the video being
//! new. Every accepted URL shape collapses to
//! `https://www.youtube.com/watch?v=<id>` with tracking, timestamp, and
//! playlist parameters dropped.

use url::Url;

const CANONICAL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Returns true for an 11-character id made of `[A-Za-z0-9_-]`.
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Canonical watch URL for a video id.
pub fn canonical_video_url(video_id: &str) -> String {
    format!("{}{}", CANONICAL_PREFIX, video_id)
}

fn parse_lenient(input: &str) -> Option<Url> {
    let trimmed = input.trim();
    Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("https://{}", trimmed)))
        .ok()
}

fn is_youtube_host(host: &str) -> bool {
    let host = host.trim_start_matches("www.").trim_start_matches("m.");
    host == "youtube.com" || host == "music.youtube.com" || host == "youtube-nocookie.com"
}

/// Extract the video id from a watch, short-link, embed, or shorts URL.
///
/// A bare 11-character id is accepted as-is.
pub fn extract_video_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if is_valid_video_id(trimmed) {
        return Some(trimmed.to_string());
    }

    let url = parse_lenient(trimmed)?;
    let host = url.host_str()?.to_ascii_lowercase();

    let candidate = if host == "youtu.be" || host == "www.youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if is_youtube_host(&host) {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("embed") | Some("shorts") | Some("live") | Some("v") => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| is_valid_video_id(id))
}

/// Extract the playlist id from a URL carrying a `list=` parameter.
pub fn extract_playlist_id(input: &str) -> Option<String> {
    let url = parse_lenient(input)?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !is_youtube_host(&host) && host != "youtu.be" {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.trim().to_string())
        .filter(|id| {
            !id.is_empty()
                && id
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

/// Canonical watch URL for any accepted video URL or bare id.
pub fn normalize_video_url(input: &str) -> Option<String> {
    extract_video_id(input).map(|id| canonical_video_url(&id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_url_with_tracking() {
        assert_eq!(
            normalize_video_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s&si=abc123"),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_short_link_and_variants() {
        for input in [
            "https://youtu.be/dQw4w9WgXcQ?si=tracking",
            "youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
        ] {
            assert_eq!(
                extract_video_id(input).as_deref(),
                Some("dQw4w9WgXcQ"),
                "input: {}",
                input
            );
        }
    }

    #[test]
    fn test_rejects_foreign_and_malformed() {
        assert_eq!(extract_video_id("https://vimeo.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_video_id("not a url at all"), None);
    }

    #[test]
    fn test_playlist_id() {
        assert_eq!(
            extract_playlist_id(
                "https://www.youtube.com/playlist?list=PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf"
            )
            .as_deref(),
            Some("PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf")
        );
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL123").as_deref(),
            Some("PL123")
        );
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            None
        );
    }
}
