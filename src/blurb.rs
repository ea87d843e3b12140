//! Whitespace normalization applied to every text run before chunking.

use crate::markers;

/// Normalize a raw text run.
///
/// Reserved marker characters and any whitespace other than a plain space
/// become spaces, runs of spaces collapse to one, and with `trim` set the
/// result has no leading or trailing space.
///
/// # Examples
///
/// ```
/// use proxindex::blurb::blurbify;
///
/// assert_eq!(blurbify("  one\t\ttwo\n three  ", true), "one two three");
/// assert_eq!(blurbify("  one  ", false), " one ");
/// ```
pub fn blurbify(text: &str, trim: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let c = if c.is_whitespace() || markers::is_reserved(c) {
            ' '
        } else {
            c
        };
        if c == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(c);
    }

    if trim {
        let trimmed = out.trim_matches(' ');
        if trimmed.len() != out.len() {
            return trimmed.to_string();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{BUMP_MARKER, NODE_MARKER, VIRTUAL_WORD};

    #[test]
    fn collapses_mixed_whitespace() {
        assert_eq!(blurbify("a \r\n\t b", true), "a b");
    }

    #[test]
    fn strips_reserved_markers() {
        let raw = format!("a{BUMP_MARKER}5{BUMP_MARKER}b{NODE_MARKER}c{VIRTUAL_WORD}");
        assert_eq!(blurbify(&raw, true), "a 5 b c");
    }

    #[test]
    fn keeps_edges_without_trim() {
        assert_eq!(blurbify("\n\nword\t", false), " word ");
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert_eq!(blurbify(" \t\n ", true), "");
    }

    #[test]
    fn keeps_non_ascii_text() {
        assert_eq!(blurbify("café\u{00a0}naïve", true), "café naïve");
    }
}
