//! Records handed from the chunk accumulator to whatever stores them.

use serde::Serialize;

use crate::error::Result;

/// One finished chunk of document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub key: String,
    pub section_type: Option<String>,
    pub sub_document: Option<String>,
    /// Source node the first word of the chunk came from.
    pub node: usize,
    /// Number of real words in `node` before the chunk's first word.
    pub word_offset: usize,
    /// Bump-compacted chunk text.
    pub text: String,
    pub word_boost: f32,
    /// Whether the chunk's words may feed a spelling dictionary.
    pub spell: bool,
}

/// A meta-data field collected from a `meta` subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaField {
    pub name: String,
    pub value: String,
    pub store: bool,
    pub index: bool,
    pub tokenize: bool,
    pub facet: bool,
    pub spell: bool,
    pub word_boost: f32,
}

/// Written once per (sub-)document after all of its chunks. Its presence
/// marks the document as completely indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummaryRecord {
    pub key: String,
    pub sub_document: Option<String>,
    pub chunk_count: usize,
    /// Source modification time, seconds since the Unix epoch.
    pub file_date: u64,
    pub meta: Vec<MetaField>,
}

/// Destination for chunk and summary records.
///
/// Calls are synchronous; an error aborts the current document and is
/// returned to the caller unchanged.
pub trait IndexSink {
    fn append_chunk(&mut self, chunk: ChunkRecord) -> Result<()>;

    fn append_summary(&mut self, summary: DocumentSummaryRecord) -> Result<()>;
}

impl<S: IndexSink + ?Sized> IndexSink for &mut S {
    fn append_chunk(&mut self, chunk: ChunkRecord) -> Result<()> {
        (**self).append_chunk(chunk)
    }

    fn append_summary(&mut self, summary: DocumentSummaryRecord) -> Result<()> {
        (**self).append_summary(summary)
    }
}

/// In-memory sink. Used to buffer a document that is processed off the
/// writer thread, and in tests.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MemorySink {
    pub chunks: Vec<ChunkRecord>,
    pub summaries: Vec<DocumentSummaryRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk texts in emission order.
    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    /// Replay everything recorded into another sink, chunks first.
    pub fn replay(self, sink: &mut impl IndexSink) -> Result<()> {
        for chunk in self.chunks {
            sink.append_chunk(chunk)?;
        }
        for summary in self.summaries {
            sink.append_summary(summary)?;
        }
        Ok(())
    }
}

impl IndexSink for MemorySink {
    fn append_chunk(&mut self, chunk: ChunkRecord) -> Result<()> {
        self.chunks.push(chunk);
        Ok(())
    }

    fn append_summary(&mut self, summary: DocumentSummaryRecord) -> Result<()> {
        self.summaries.push(summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> ChunkRecord {
        ChunkRecord {
            key: "idx:a.xml".into(),
            section_type: None,
            sub_document: None,
            node: 1,
            word_offset: 0,
            text: text.into(),
            word_boost: 1.0,
            spell: true,
        }
    }

    #[test]
    fn replay_preserves_order() {
        let mut first = MemorySink::new();
        first.append_chunk(chunk("one")).unwrap();
        first.append_chunk(chunk("two")).unwrap();
        first
            .append_summary(DocumentSummaryRecord {
                key: "idx:a.xml".into(),
                sub_document: None,
                chunk_count: 2,
                file_date: 0,
                meta: Vec::new(),
            })
            .unwrap();

        let mut second = MemorySink::new();
        first.replay(&mut second).unwrap();
        assert_eq!(second.texts(), ["one", "two"]);
        assert_eq!(second.summaries.len(), 1);
    }

    #[test]
    fn mutable_reference_is_a_sink() {
        fn push(mut sink: impl IndexSink) {
            sink.append_chunk(chunk("x")).unwrap();
        }

        let mut sink = MemorySink::new();
        push(&mut sink);
        push(&mut sink);
        assert_eq!(sink.chunks.len(), 2);
    }
}
