//! Index-time analysis of stored chunk text.
//!
//! The stages run in a fixed order: word scanning, bump decoding, case
//! folding, then stop-word n-gramming. [`ProximityTokenizer`] wraps the same
//! pipeline for tantivy so that bump markers turn into real position gaps in
//! the index.

use std::{collections::HashSet, sync::Arc};

use tantivy::tokenizer::{
    Token as IndexToken,
    TokenStream,
    Tokenizer as IndexTokenizer,
};

use crate::{
    bump::BumpDecoder,
    markers::{FIELD_END_MARKER, FIELD_START_MARKER},
    stop_filter::NgramStopFilter,
    tokenizer::{Token, Tokenizer},
};

/// Name the tokenizer is registered under in the index.
pub const PROXIMITY_TOKENIZER: &str = "proximity";

/// Lower-case words and strip field markers. Tokens that end up empty
/// (virtual words, bare markers) are dropped but still take up their
/// positions.
fn normalize<'a>(tokens: impl Iterator<Item = Token<'a>>) -> Vec<Token<'a>> {
    let mut out = Vec::new();
    let mut carry = 0;
    for mut token in tokens {
        if token.is_virtual() {
            carry += token.position_increment;
            continue;
        }
        let folded: String = token
            .text
            .chars()
            .filter(|&c| c != FIELD_START_MARKER && c != FIELD_END_MARKER)
            .flat_map(char::to_lowercase)
            .collect();
        if folded.is_empty() {
            carry += token.position_increment;
            continue;
        }
        token.text = folded.into();
        token.position_increment += std::mem::take(&mut carry);
        out.push(token);
    }
    out
}

/// Run the full analysis pipeline over `text`.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
///
/// use proxindex::analyzer::analyze;
///
/// let stop: HashSet<String> = ["the".to_string()].into();
/// let terms: Vec<_> = analyze("See The Who", Some(&stop))
///     .into_iter()
///     .map(|t| t.text.into_owned())
///     .collect();
/// assert_eq!(terms, ["see", "see~the", "the~who", "who"]);
/// ```
pub fn analyze<'a>(
    text: &'a str,
    stop_words: Option<&HashSet<String>>,
) -> Vec<Token<'a>> {
    let tokens = normalize(BumpDecoder::new(text, Tokenizer::new(text)));
    match stop_words {
        Some(stop) if !stop.is_empty() => {
            NgramStopFilter::new(tokens.into_iter(), stop).collect()
        }
        _ => tokens,
    }
}

/// tantivy adapter for [`analyze`].
#[derive(Debug, Clone, Default)]
pub struct ProximityTokenizer {
    stop_words: Arc<HashSet<String>>,
}

impl ProximityTokenizer {
    pub fn new(stop_words: Option<HashSet<String>>) -> Self {
        Self {
            stop_words: Arc::new(stop_words.unwrap_or_default()),
        }
    }
}

impl IndexTokenizer for ProximityTokenizer {
    type TokenStream<'a> = ProximityTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> ProximityTokenStream {
        let mut position = usize::MAX;
        let tokens = analyze(text, Some(&self.stop_words))
            .into_iter()
            .map(|t| {
                position = position.wrapping_add(t.position_increment);
                IndexToken {
                    offset_from: t.start,
                    offset_to: t.end,
                    position,
                    text: t.text.into_owned(),
                    position_length: 1,
                }
            })
            .collect();
        ProximityTokenStream {
            tokens,
            index: None,
        }
    }
}

#[derive(Debug)]
pub struct ProximityTokenStream {
    tokens: Vec<IndexToken>,
    index: Option<usize>,
}

impl TokenStream for ProximityTokenStream {
    fn advance(&mut self) -> bool {
        let next = self.index.map_or(0, |i| i + 1);
        self.index = Some(next);
        next < self.tokens.len()
    }

    fn token(&self) -> &IndexToken {
        &self.tokens[self.index.unwrap_or_default()]
    }

    fn token_mut(&mut self) -> &mut IndexToken {
        &mut self.tokens[self.index.unwrap_or_default()]
    }
}
