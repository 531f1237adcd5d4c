//! Recognition of video links accepted by the transcription service.
//!
//! Only the link *shape* is checked here. Whether the video actually exists
//! (or is public) is for the service to decide after submission.

use once_cell::sync::Lazy;
use regex::Regex;

/// Optional scheme, optional `www.`, then either the long form
/// (`youtube.com/watch?v=`, `youtube.com/embed/`) or the short form
/// (`youtu.be/`), followed by at least one identifier character.
///
/// Only the start of the input is anchored; trailing query parameters such as
/// `&t=42s` are accepted.
static VIDEO_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?(?:youtube\.com/(?:watch\?v=|embed/)|youtu\.be/)([A-Za-z0-9_-]+)")
        .expect("video link pattern is valid")
});

/// Check whether `input` looks like a link to a single video.
///
/// Never fails: empty, malformed or foreign input simply yields `false`.
pub fn is_valid_video_url(input: &str) -> bool {
    VIDEO_LINK.is_match(input)
}

/// Extract the video identifier from a recognized link.
pub fn video_id(input: &str) -> Option<&str> {
    VIDEO_LINK
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
