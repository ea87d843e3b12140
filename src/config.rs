//! Indexer configuration.
//!
//! An [`IndexerConfig`] is read once (from JSON, or defaults), normalized,
//! and then shared read-only by every document processed with it.

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Smallest chunk size the indexer accepts, in words.
pub const MIN_CHUNK_SIZE: usize = 2;

/// Default chunk size in words.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default number of words shared by adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Default number of virtual words inserted after each sentence.
pub const DEFAULT_SENTENCE_BUMP: usize = 5;

/// Default relevance multiplier for words outside any boosted section.
pub const DEFAULT_WORD_BOOST: f32 = 1.0;

/// Stop words used when the configuration doesn't name its own.
pub const DEFAULT_STOP_WORDS: &str = "a an and are as at be but by for if in \
     into is it no not of on or s such t that the their then there these \
     they this to was will with";

/// Settings that shape how documents are chunked and analyzed.
///
/// # Examples
///
/// ```
/// use proxindex::config::IndexerConfig;
///
/// let config = IndexerConfig {
///     chunk_size: 10,
///     chunk_overlap: 8,
///     ..IndexerConfig::default()
/// }
/// .normalized();
/// assert_eq!(config.chunk_overlap, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words repeated at the start of the following chunk.
    pub chunk_overlap: usize,
    /// Whitespace/comma/semicolon separated stop words. `None` disables
    /// n-gramming entirely.
    pub stop_words: Option<String>,
    /// Sentence bump used when no section overrides it.
    pub sentence_bump: usize,
    /// Word boost used when no section overrides it.
    pub word_boost: f32,
    /// Skip whitespace-only text runs instead of treating them as nodes.
    pub strip_whitespace: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            stop_words: Some(DEFAULT_STOP_WORDS.to_string()),
            sentence_bump: DEFAULT_SENTENCE_BUMP,
            word_boost: DEFAULT_WORD_BOOST,
            strip_whitespace: true,
        }
    }
}

impl IndexerConfig {
    /// Load a configuration from a JSON file, falling back to defaults when
    /// the file doesn't exist. The result is already normalized.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(
                path = %path.display(),
                "no indexer config found, using defaults"
            );
            return Ok(Self::default().normalized());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config.normalized())
    }

    /// Clamp the chunk size to [`MIN_CHUNK_SIZE`] and the overlap to half the
    /// chunk size, and fix up an unusable word boost.
    pub fn normalized(mut self) -> Self {
        if self.chunk_size < MIN_CHUNK_SIZE {
            tracing::warn!(
                requested = self.chunk_size,
                "chunk size too small, using {MIN_CHUNK_SIZE}"
            );
            self.chunk_size = MIN_CHUNK_SIZE;
        }
        let max_overlap = self.chunk_size / 2;
        if self.chunk_overlap > max_overlap {
            tracing::warn!(
                requested = self.chunk_overlap,
                "chunk overlap limited to half the chunk size ({max_overlap})"
            );
            self.chunk_overlap = max_overlap;
        }
        if !self.word_boost.is_finite() || self.word_boost <= 0.0 {
            tracing::warn!(
                requested = self.word_boost,
                "word boost must be positive, using {DEFAULT_WORD_BOOST}"
            );
            self.word_boost = DEFAULT_WORD_BOOST;
        }
        self
    }

    /// The configured stop words as a lookup set.
    pub fn stop_set(&self) -> Option<HashSet<String>> {
        self.stop_words.as_deref().map(make_stop_set)
    }
}

/// Split a stop-word list on whitespace, commas and semicolons, lower-casing
/// every entry.
pub fn make_stop_set(words: &str) -> HashSet<String> {
    words
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
