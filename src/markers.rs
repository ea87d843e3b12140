//! Reserved characters that never survive from source text into chunks.
//!
//! All of them live in the Unicode private use area. [`crate::blurb`]
//! replaces any occurrence in incoming text with a space, so the only
//! instances a chunk can contain are the ones the indexer put there.

/// Delimits a compacted bump count, e.g. `"\u{EBBB}5\u{EBBB}"`.
pub const BUMP_MARKER: char = '\u{EBBB}';

/// Separates the text of adjacent source nodes inside a chunk.
pub const NODE_MARKER: char = '\u{E90D}';

/// Placeholder word standing in for one unit of proximity distance.
pub const VIRTUAL_WORD: char = '\u{EA1F}';

/// Start of a tokenized meta-data field value.
pub const FIELD_START_MARKER: char = '\u{EBEB}';

/// End of a tokenized meta-data field value.
pub const FIELD_END_MARKER: char = '\u{EE1D}';

/// `true` for every character the indexer reserves for itself.
pub fn is_reserved(c: char) -> bool {
    matches!(
        c,
        BUMP_MARKER
            | NODE_MARKER
            | VIRTUAL_WORD
            | FIELD_START_MARKER
            | FIELD_END_MARKER
    )
}
