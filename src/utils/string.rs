//! Char-safe string helpers for log lines and operator output.

/// First `n` chars of `s`, with a trailing `...` when anything was cut.
///
/// Used to keep user queries short in logs without slicing mid code point.
pub fn preview(s: &str, n: usize) -> String {
    let mut chars = s.chars();
    let mut out: String = chars.by_ref().take(n).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

/// Mask a credential for display, keeping only the last four chars.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count == 0 {
        return "(unset)".to_string();
    }
    if count <= 8 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}
