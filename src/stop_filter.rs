//! Stop-word n-gramming.
//!
//! Instead of discarding stop words, each one is glued to its neighbours so
//! that phrases like "the who" stay searchable while a lone "the" never
//! becomes a term of its own. Glued tokens read `stop~next` or `real~stop`
//! and span both source words.

use std::{borrow::Cow, collections::HashSet};

use crate::tokenizer::Token;

/// Iterator adapter performing the gluing over an analyzed token stream.
///
/// Tokens must already be lower-cased the same way the stop set is.
pub struct NgramStopFilter<'a, 's, I: Iterator<Item = Token<'a>>> {
    inner: I,
    stop_words: &'s HashSet<String>,
    next: Option<Token<'a>>,
    queued: Option<Token<'a>>,
    accum_increment: usize,
}

impl<'a, 's, I: Iterator<Item = Token<'a>>> NgramStopFilter<'a, 's, I> {
    pub fn new(mut inner: I, stop_words: &'s HashSet<String>) -> Self {
        let next = inner.next();
        Self {
            inner,
            stop_words,
            next,
            queued: None,
            accum_increment: 0,
        }
    }

    fn is_stop(&self, token: &Token<'_>) -> bool {
        self.stop_words.contains(token.text.as_ref())
    }

    /// Join two adjacent tokens. A requested increment of zero stacks the
    /// result on `first`; otherwise it takes `first`'s place plus any
    /// distance carried over from dropped stop words.
    fn glom(
        &mut self,
        first: &Token<'a>,
        second: &Token<'a>,
        increment: usize,
    ) -> Token<'a> {
        debug_assert_eq!(second.position_increment, 1);
        let position_increment = if increment == 0 {
            0
        } else {
            first.position_increment - 1 + increment + self.accum_increment
        };
        self.accum_increment = 0;
        Token {
            text: Cow::Owned(format!("{}~{}", first.text, second.text)),
            start: first.start,
            end: second.end,
            position_increment,
        }
    }
}

impl<'a, I: Iterator<Item = Token<'a>>> Iterator
    for NgramStopFilter<'a, '_, I>
{
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if let Some(token) = self.queued.take() {
            return Some(token);
        }

        loop {
            let mut cur = self.next.take()?;
            self.next = self.inner.next();
            let next_adjacent = self
                .next
                .as_ref()
                .is_some_and(|n| n.position_increment == 1);

            if !self.is_stop(&cur) {
                cur.position_increment += std::mem::take(&mut self.accum_increment);

                let next_is_stop = self.next.as_ref().is_some_and(|n| self.is_stop(n));
                if next_adjacent
                    && next_is_stop
                    && let Some(next) = self.next.clone()
                {
                    self.queued = Some(self.glom(&cur, &next, 0));
                }
                return Some(cur);
            }

            match self.next.clone() {
                Some(next) if next_adjacent => {
                    return Some(self.glom(&cur, &next, 1));
                }
                _ => self.accum_increment += cur.position_increment,
            }
        }
    }
}
