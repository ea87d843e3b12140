//! Word scanner shared by chunking and index-time analysis.
//!
//! Letters and digits form words, an apostrophe between a word and a
//! following letter or digit stays inside the word (`don't`), and everything
//! else separates words. A virtual word placeholder is always a word of its
//! own. Offsets are byte offsets into the scanned string.

use std::borrow::Cow;

use crate::markers::{FIELD_END_MARKER, FIELD_START_MARKER, VIRTUAL_WORD};

/// A word and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: Cow<'a, str>,
    pub start: usize,
    pub end: usize,
    /// Distance in words from the previous token. `0` stacks this token on
    /// the previous position.
    pub position_increment: usize,
}

impl<'a> Token<'a> {
    fn borrowed(source: &'a str, start: usize, end: usize) -> Self {
        Self {
            text: Cow::Borrowed(&source[start..end]),
            start,
            end,
            position_increment: 1,
        }
    }

    pub fn is_virtual(&self) -> bool {
        is_virtual_word(&self.text)
    }
}

/// `true` if `text` is exactly one virtual word placeholder.
pub fn is_virtual_word(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next() == Some(VIRTUAL_WORD) && chars.next().is_none()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == FIELD_START_MARKER || c == FIELD_END_MARKER
}

fn is_joiner(c: char) -> bool {
    c == '\'' || c == '\u{2019}'
}

/// Single-pass iterator over the words of a string.
///
/// # Examples
///
/// ```
/// use proxindex::tokenizer::Tokenizer;
///
/// let words: Vec<_> = Tokenizer::new("It's 9 o'clock, Bob.")
///     .map(|t| t.text.into_owned())
///     .collect();
/// assert_eq!(words, ["It's", "9", "o'clock", "Bob"]);
/// ```
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let base = self.pos;
        let mut chars = self.text[base..].char_indices().peekable();

        let (start, first) = loop {
            let Some((i, c)) = chars.next() else {
                self.pos = self.text.len();
                return None;
            };
            if c == VIRTUAL_WORD {
                let start = base + i;
                let end = start + c.len_utf8();
                self.pos = end;
                return Some(Token::borrowed(self.text, start, end));
            }
            if is_word_char(c) {
                break (base + i, c);
            }
        };

        let mut end = start + first.len_utf8();
        while let Some(&(i, c)) = chars.peek() {
            if is_word_char(c) {
                end = base + i + c.len_utf8();
                chars.next();
                continue;
            }
            if is_joiner(c) {
                let mut ahead = chars.clone();
                ahead.next();
                if matches!(ahead.peek(), Some(&(_, n)) if n.is_alphanumeric())
                {
                    chars.next();
                    continue;
                }
            }
            break;
        }

        self.pos = end;
        Some(Token::borrowed(self.text, start, end))
    }
}
