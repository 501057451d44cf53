//! Text helpers for alert bodies and diagnostic messages.

/// Truncate to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Keep a value safe inside inline markdown code.
pub fn escape_inline_code(s: &str) -> String {
    s.trim().replace(['\r', '\n'], " ").replace('`', "'")
}

/// Minimal escaping for markdown list items.
pub fn escape_inline_markdown(s: &str) -> String {
    s.trim().replace(['\r', '\n'], " ").replace('|', "\\|")
}

/// Stop user text from closing a fenced code block early.
pub fn neutralize_code_fence(s: &str) -> String {
    s.replace("```", "'''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello…");
        // Multi-byte input is cut on a char boundary.
        assert_eq!(truncate_chars("账号状态异常", 2), "账号…");
    }

    #[test]
    fn test_escape_helpers() {
        assert_eq!(escape_inline_code(" a`b\nc "), "a'b c");
        assert_eq!(escape_inline_markdown("x|y\r\nz"), "x\\|y  z");
        assert_eq!(neutralize_code_fence("```rust\n```"), "'''rust\n'''");
    }
}
