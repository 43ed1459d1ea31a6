//! Download filename derivation.
//!
//! Titles come from arbitrary remote media and end up in a
//! `Content-Disposition` header and on the client's disk, so they are reduced
//! to something every platform accepts.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Maximum length of the stem, in characters.
const MAX_STEM_CHARS: usize = 150;

/// Fallback stem when nothing usable survives sanitization.
const FALLBACK_STEM: &str = "download";

/// Sanitize a title for use as a filename stem.
///
/// Control characters and characters invalid on Windows become `_` (runs
/// collapse to one), leading/trailing spaces and dots are trimmed, reserved
/// device names are prefixed with `_`, and the result is capped at
/// 150 characters. Unicode text is kept as-is.
///
/// ```
/// use ytmp3::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
/// assert_eq!(sanitize_filename("..."), "download");
/// assert_eq!(sanitize_filename("nul"), "_nul");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return FALLBACK_STEM.to_string();
    }

    let capped: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let capped = capped.trim_end_matches([' ', '.']);

    let upper = capped.to_uppercase();
    let stem_upper = upper.split('.').next().unwrap_or_default();
    if WINDOWS_RESERVED_NAMES.contains(&stem_upper) {
        return format!("_{}", capped);
    }

    capped.to_string()
}

/// Build the download filename for an artifact, e.g. `My Song.mp3`.
pub fn download_filename(title: &str, extension: &str) -> String {
    format!("{}.{}", sanitize_filename(title), extension)
}

/// ASCII-only variant of a filename for the plain `filename=` parameter of
/// `Content-Disposition`; non-ASCII characters and quotes become `_`.
pub fn ascii_fallback(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Percent-encode a filename for the RFC 5987 `filename*=` parameter.
pub fn rfc5987_encode(filename: &str) -> String {
    urlencoding::encode(filename).into_owned()
}
