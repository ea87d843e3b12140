//! Compact encoding of virtual-word runs.
//!
//! Stored chunk text never carries raw virtual words. Each run of them is
//! rewritten as `BUMP <count> BUMP` (no spaces), and at analysis time
//! [`BumpDecoder`] turns that marker back into a position gap on the next
//! real word.

use std::iter::Peekable;

use crate::{
    markers::{BUMP_MARKER, VIRTUAL_WORD},
    tokenizer::Token,
};

/// The compact marker standing in for `count` virtual words.
pub fn bump_marker(count: usize) -> String {
    format!("{BUMP_MARKER}{count}{BUMP_MARKER}")
}

/// Replace every run of virtual words with a bump marker.
///
/// A run is a sequence of virtual words separated only by whitespace; any
/// other character in between starts a new run. Afterwards a space directly
/// followed by another space or by a bump marker is dropped.
///
/// # Examples
///
/// ```
/// use proxindex::{
///     bump::compact_virtual_words,
///     markers::{BUMP_MARKER as B, VIRTUAL_WORD as V},
/// };
///
/// let raw = format!("sat. {V} {V} {V}  A dog");
/// assert_eq!(compact_virtual_words(&raw), format!("sat.{B}3{B} A dog"));
/// ```
pub fn compact_virtual_words(text: &str) -> String {
    let mut replaced = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != VIRTUAL_WORD {
            replaced.push(c);
            continue;
        }

        let mut count = 1;
        loop {
            let mut ahead = chars.clone();
            let mut skipped = 0;
            while ahead.next_if(|c| c.is_whitespace()).is_some() {
                skipped += 1;
            }
            if ahead.peek() != Some(&VIRTUAL_WORD) {
                break;
            }
            for _ in 0..=skipped {
                chars.next();
            }
            count += 1;
        }
        replaced.push_str(&bump_marker(count));
    }

    let mut out = String::with_capacity(replaced.len());
    let mut chars = replaced.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' && matches!(chars.peek(), Some(&' ') | Some(&BUMP_MARKER)) {
            continue;
        }
        out.push(c);
    }
    out
}

/// Count words the way the chunk accumulator does: real words plus the
/// virtual words each bump marker stands for.
pub fn word_count(text: &str) -> usize {
    let mut count = 0;
    for token in crate::tokenizer::Tokenizer::new(text) {
        count += bump_value(text, &token).unwrap_or(1);
    }
    count
}

/// `true` if compacted `text` contains at least one word that isn't part
/// of a bump marker.
pub fn has_real_words(text: &str) -> bool {
    crate::tokenizer::Tokenizer::new(text)
        .any(|t| !t.is_virtual() && bump_value(text, &t).is_none())
}

/// Render compacted chunk text for display: bump markers and the other
/// reserved characters become single spaces.
pub fn display_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_bump = false;
    for c in text.chars() {
        if c == BUMP_MARKER {
            in_bump = !in_bump;
            out.push(' ');
        } else if !in_bump {
            out.push(c);
        }
    }
    crate::blurb::blurbify(&out, true)
}

/// The count carried by `token` if it is the number inside a bump marker.
fn bump_value(text: &str, token: &Token<'_>) -> Option<usize> {
    if !text[..token.start].ends_with(BUMP_MARKER)
        || !text[token.end..].starts_with(BUMP_MARKER)
    {
        return None;
    }
    token.text.parse().ok()
}

/// Iterator adapter that swallows bump markers and adds their count to the
/// position increment of the following word.
///
/// A bump at the very end of the stream has no word to attach to and is
/// dropped.
pub struct BumpDecoder<'a, I: Iterator<Item = Token<'a>>> {
    text: &'a str,
    inner: Peekable<I>,
}

impl<'a, I: Iterator<Item = Token<'a>>> BumpDecoder<'a, I> {
    /// `text` must be the string `tokens` were scanned from.
    pub fn new(text: &'a str, tokens: I) -> Self {
        Self {
            text,
            inner: tokens.peekable(),
        }
    }
}

impl<'a, I: Iterator<Item = Token<'a>>> Iterator for BumpDecoder<'a, I> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let mut gap = 0;
        loop {
            let mut token = self.inner.next()?;
            match bump_value(self.text, &token) {
                Some(n) => gap += n,
                None => {
                    token.position_increment += gap;
                    return Some(token);
                }
            }
        }
    }
}
