//! String helpers for log lines and exception messages.

/// Shorten `s` to at most `max_chars` characters, marking the cut with `…`.
///
/// Model output can be arbitrarily long; exception records and log events keep
/// only the head of it.
pub fn excerpt(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
