//! Placeholder words that make boundaries cost proximity distance.
//!
//! Before a text run is chunked, a block of virtual words is inserted after
//! every sentence and, when required, at the start of the run. Chunking
//! counts them like real words, so two real words on either side of a
//! boundary end up further apart than their textual distance.

use crate::markers::VIRTUAL_WORD;

/// What, if anything, to insert at the very start of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadingBump {
    None,
    /// A pending section bump of this many words.
    Section(usize),
    /// A forced chunk boundary; always a full chunk's worth of words.
    ForcedChunk(usize),
}

impl LeadingBump {
    /// Pick the leading bump for a run: a pending section bump wins over a
    /// forced chunk.
    pub fn resolve(
        pending_section_bump: usize,
        forced_chunk: bool,
        chunk_size: usize,
    ) -> Self {
        if pending_section_bump > 0 {
            Self::Section(pending_section_bump)
        } else if forced_chunk {
            Self::ForcedChunk(chunk_size)
        } else {
            Self::None
        }
    }

    fn count(self) -> usize {
        match self {
            Self::None => 0,
            Self::Section(n) | Self::ForcedChunk(n) => n,
        }
    }
}

fn is_sentence_punctuation(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Decide whether `chars[idx]` ends a sentence.
///
/// An ellipsis never ends a sentence, nor does a period directly followed by
/// a letter or digit. A run of `!`/`?` ends only at its last character.
pub fn is_end_of_sentence(chars: &[char], idx: usize) -> bool {
    let curr = chars[idx];
    if !is_sentence_punctuation(curr) {
        return false;
    }
    let prev = if idx > 0 { chars[idx - 1] } else { ' ' };
    let next = chars.get(idx + 1).copied().unwrap_or(' ');

    match curr {
        '.' => !next.is_alphanumeric() && prev != '.' && next != '.',
        _ => !is_sentence_punctuation(next),
    }
}

fn push_block(out: &mut String, count: usize) {
    if count == 0 {
        return;
    }
    out.push(' ');
    for _ in 0..count {
        out.push(VIRTUAL_WORD);
        out.push(' ');
    }
}

/// Insert virtual words into an already blurbified run.
///
/// `sentence_bump` words go after each sentence end (after a closing double
/// quote if one follows the punctuation) and `leading` decides the block at
/// the start. Every block starts with a space so it can't fuse with the
/// word before it.
///
/// # Examples
///
/// ```
/// use proxindex::{
///     markers::VIRTUAL_WORD,
///     virtual_words::{LeadingBump, insert_virtual_words},
/// };
///
/// let out = insert_virtual_words("Hi. Bye", 2, LeadingBump::None);
/// let v = VIRTUAL_WORD;
/// assert_eq!(out, format!("Hi. {v} {v}  Bye"));
/// ```
pub fn insert_virtual_words(
    text: &str,
    sentence_bump: usize,
    leading: LeadingBump,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    push_block(&mut out, leading.count());

    let mut i = 0;
    while i < chars.len() {
        out.push(chars[i]);
        if is_end_of_sentence(&chars, i) {
            if chars.get(i + 1) == Some(&'"') {
                i += 1;
                out.push('"');
            }
            push_block(&mut out, sentence_bump);
        }
        i += 1;
    }
    out
}
