//! Character-safe truncation helpers shared by the prompt builders.

/// The longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate to `max_chars` characters, appending `marker` when anything was cut.
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    let head = truncate_chars(text, max_chars);
    if head.len() == text.len() {
        text.to_string()
    } else {
        format!("{}{}", head, marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_marker_only_when_cut() {
        assert_eq!(truncate_with_marker("abcdef", 3, "..."), "abc...");
        assert_eq!(truncate_with_marker("abc", 3, "..."), "abc");
    }
}
