//! Deterministic conversion of display names into portable path segments.

use std::sync::LazyLock;

use regex::Regex;

use super::LayoutError;

/// Maximum UTF-8 bytes kept per path segment.
///
/// Leaves room under the common 255-byte file name limit for the ` [<id>]`
/// collision suffix and the `.<name>.part` download wrapper.
pub const MAX_SEGMENT_BYTES: usize = 200;

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex is valid") // Static pattern, safe to panic
});

/// Device names Windows refuses regardless of extension.
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitizes `name` into a single path segment valid on Windows, macOS and Linux.
///
/// The transform is pure: the same input always yields the same segment.
/// Non-ASCII characters are kept. A leading `.` becomes `_`, so no segment
/// is hidden from the local state inspector.
///
/// # Errors
///
/// Returns [`LayoutError::Unrepresentable`] if nothing usable remains.
pub fn sanitize_segment(name: &str) -> Result<String, LayoutError> {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => ' ',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let collapsed = WHITESPACE_RUN.replace_all(&replaced, " ");
    let mut segment = collapsed
        .trim()
        .trim_end_matches(['.', ' '])
        .to_string();

    if segment.len() > MAX_SEGMENT_BYTES {
        truncate_on_char_boundary(&mut segment, MAX_SEGMENT_BYTES);
        segment = segment.trim_end_matches(['.', ' ']).to_string();
    }

    if segment.is_empty() {
        // "." and ".." end up here too: a name made only of dots has no usable characters
        return Err(LayoutError::unrepresentable(name));
    }

    if segment.starts_with('.') {
        segment.replace_range(..1, "_");
    }

    if is_windows_reserved(&segment) {
        segment = match segment.split_once('.') {
            Some((stem, rest)) => format!("{stem}_.{rest}"),
            None => format!("{segment}_"),
        };
    }

    Ok(segment)
}

/// Shortens `segment` to at most `max_bytes` bytes without splitting a character.
pub(crate) fn truncate_on_char_boundary(segment: &mut String, max_bytes: usize) {
    if segment.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !segment.is_char_boundary(end) {
        end -= 1;
    }
    segment.truncate(end);
}

fn is_windows_reserved(segment: &str) -> bool {
    let stem = segment.split('.').next().unwrap_or(segment).trim_end();
    WINDOWS_RESERVED
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}
