//! Paragraph-aware message splitting.
//!
//! Telegram rejects messages longer than 4096 characters, so long replies
//! are cut into chunks on blank-line paragraph boundaries. A single
//! paragraph longer than the limit is passed through as its own oversized
//! chunk; it is never cut mid-paragraph.

use serde::{Deserialize, Serialize};

/// Telegram's per-message character limit.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Paragraph delimiter. Consumed on split, reinserted on join.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

const SEPARATOR_LEN: usize = 2;

/// Chunking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Maximum characters per outbound chunk.
    pub max_chunk_length: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: TELEGRAM_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Split `text` into chunks of at most `max_chunk_length` characters.
///
/// Never returns an empty vector: empty or whitespace-only input yields a
/// single empty chunk, and text that already fits is returned untouched.
/// Paragraphs are packed greedily in order.
///
/// ```
/// use psybot::utils::split::split_message;
///
/// assert_eq!(split_message("short", 4096), vec!["short"]);
/// assert_eq!(
///     split_message("Part 1\n\nPart 2\n\nPart 3", 10),
///     vec!["Part 1", "Part 2", "Part 3"]
/// );
/// assert_eq!(split_message("", 4096), vec![""]);
/// ```
pub fn split_message(text: &str, max_chunk_length: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![String::new()];
    }
    if text.chars().count() <= max_chunk_length {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        let paragraph_len = paragraph.chars().count();
        let joined_len = if current.is_empty() {
            paragraph_len
        } else {
            current_len + SEPARATOR_LEN + paragraph_len
        };

        if joined_len <= max_chunk_length {
            if !current.is_empty() {
                current.push_str(PARAGRAPH_SEPARATOR);
            }
            current.push_str(paragraph);
            current_len = joined_len;
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(paragraph);
            current_len = paragraph_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}
