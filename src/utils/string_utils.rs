//! UTF-8-safe string helpers
//!
//! DOM text arrives with arbitrary whitespace and multi-byte characters, so
//! every slice taken for logging or comparison goes through these helpers.

/// Safely truncate a string to a maximum number of CHARACTERS (not bytes).
///
/// Never panics on multi-byte characters.
///
/// # Examples
/// ```
/// # use mission_scrape::utils::string_utils::safe_truncate_chars;
/// assert_eq!(safe_truncate_chars("Hello, World!", 5), "Hello");
/// assert_eq!(safe_truncate_chars("ação rápida", 4), "ação");
/// assert_eq!(safe_truncate_chars("Hi", 100), "Hi");
/// ```
#[inline]
pub fn safe_truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        None => s,
        Some((byte_idx, _)) => &s[..byte_idx],
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces and trim.
///
/// Preformatted descriptions keep their line breaks; use this only for
/// comparison keys and short single-line fields.
///
/// # Examples
/// ```
/// # use mission_scrape::utils::string_utils::normalize_whitespace;
/// assert_eq!(normalize_whitespace("  Loja \n\t Central  "), "Loja Central");
/// ```
pub fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Trim every line of a multi-line text and drop blank lines.
pub fn tidy_multiline(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(safe_truncate_chars("🎉🎊🎈", 2), "🎉🎊");
        assert_eq!(safe_truncate_chars("", 3), "");
    }

    #[test]
    fn tidy_multiline_drops_blank_lines() {
        assert_eq!(tidy_multiline("  a \n\n   b\n \n"), "a\nb");
    }
}
