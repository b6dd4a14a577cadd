//! Markdown marker stripping for completion replies.
//!
//! Replies are sent as plain Telegram text, so bold/italic asterisks and
//! heading hashes would show up literally. Only these markers are removed;
//! everything else, including single `#`, is left as the model wrote it.

/// Markers removed from replies, in removal order.
const MARKERS: &[&str] = &["**", "*", "###", "##"];

/// Remove bold, italic and heading markers from `reply`.
pub fn strip_markdown(reply: &str) -> String {
    let mut out = reply.to_string();
    for marker in MARKERS {
        if out.contains(marker) {
            out = out.replace(marker, "");
        }
    }
    out
}
