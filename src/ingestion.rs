use rayon::prelude::*;
use tantivy::IndexWriter;
use tracing::{debug, info, warn};

use crate::{
    chunking::ChunkAccumulator,
    config::IndexerConfig,
    doc_id::DocumentKey,
    error::Result,
    lazy_tree::{LazyTreeBuilder, NodeTable},
    sink::{IndexSink, MemorySink},
    tantivy_index::{SearchIndex, WriterSink},
    walker::DiscoveredFile,
    xml_source::parse_document,
};

/// Outcome of one [`ingest_files`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents written to the index.
    pub indexed: usize,
    /// Chunks written across all indexed documents.
    pub chunks: usize,
    /// Keys of documents that failed and were skipped.
    pub failed: Vec<String>,
}

/// Chunk one XML document into `sink` with a fresh accumulator.
///
/// Returns the number of chunks written. On error the sink may already
/// hold part of the document; callers that need all-or-nothing should
/// buffer into a [`MemorySink`].
pub fn index_document<'a>(
    config: &'a IndexerConfig,
    key: &str,
    xml: &str,
    file_date: u64,
    sink: &'a mut dyn IndexSink,
    lazy: Option<&'a mut dyn LazyTreeBuilder>,
) -> Result<usize> {
    let mut acc = ChunkAccumulator::new(config, key, file_date, sink);
    if let Some(lazy) = lazy {
        acc = acc.with_lazy_tree(lazy);
    }
    parse_document(xml, |event| acc.handle(event))?;
    Ok(acc.chunks_written())
}

fn chunk_file(
    config: &IndexerConfig,
    key: &DocumentKey,
    file: &DiscoveredFile,
) -> Result<MemorySink> {
    let xml = std::fs::read_to_string(&file.absolute_path)?;
    let mut sink = MemorySink::new();
    let mut tree = NodeTable::new();
    let chunks = index_document(
        config,
        key.as_str(),
        &xml,
        file.mtime,
        &mut sink,
        Some(&mut tree),
    )?;
    debug!(%key, chunks, nodes = tree.node_count(), "chunked document");
    Ok(sink)
}

/// Replay one buffered document into `sink`, recording the outcome.
///
/// Returns `false` if the sink failed part way; the key is then listed in
/// `report.failed` and the sink may hold a partial document.
fn write_buffered(
    key: &DocumentKey,
    buffered: MemorySink,
    sink: &mut impl IndexSink,
    report: &mut IngestReport,
) -> bool {
    let chunks = buffered.chunks.len();
    match buffered.replay(sink) {
        Ok(()) => {
            report.indexed += 1;
            report.chunks += chunks;
            true
        }
        Err(e) => {
            warn!(%key, error = %e, "failed to write document");
            report.failed.push(key.to_string());
            false
        }
    }
}

/// Chunk a batch of files and write them to the index.
///
/// Documents are read and chunked in parallel, each into its own buffer,
/// then written sequentially (the writer is shared) and committed once. A
/// document already in the index is replaced. A document that fails to
/// read or parse is logged and skipped, and leaves any earlier version in
/// the index untouched. A document the writer rejects is also skipped, but
/// its earlier version is gone as well.
pub fn ingest_files(
    index: &SearchIndex,
    writer: &mut IndexWriter,
    config: &IndexerConfig,
    index_name: &str,
    files: &[DiscoveredFile],
) -> Result<IngestReport> {
    let processed: Vec<_> = files
        .par_iter()
        .map(|file| {
            let key = DocumentKey::new(index_name, &file.relative_path);
            let result = chunk_file(config, &key, file);
            (key, result)
        })
        .collect();

    let mut report = IngestReport::default();
    for (key, result) in processed {
        let buffered = match result {
            Ok(buffered) => buffered,
            Err(e) => {
                warn!(%key, error = %e, "skipping document");
                report.failed.push(key.into());
                continue;
            }
        };
        index.delete_document(writer, key.as_str());
        let mut sink = WriterSink::new(index, writer);
        if !write_buffered(&key, buffered, &mut sink, &mut report) {
            // Drops whatever part of the document reached the writer.
            index.delete_document(writer, key.as_str());
        }
    }

    writer.commit()?;
    info!(
        indexed = report.indexed,
        chunks = report.chunks,
        failed = report.failed.len(),
        "ingestion finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        error::Error,
        sink::{ChunkRecord, DocumentSummaryRecord},
        walker::discover_files,
    };

    fn small_config() -> IndexerConfig {
        IndexerConfig {
            chunk_size: 4,
            chunk_overlap: 2,
            ..IndexerConfig::default()
        }
        .normalized()
    }

    #[test]
    fn index_document_counts_chunks() {
        let config = small_config();
        let mut sink = MemorySink::new();
        let mut tree = NodeTable::new();
        let n = index_document(
            &config,
            "t:a.xml",
            "<doc><p>one two three four five six</p></doc>",
            7,
            &mut sink,
            Some(&mut tree),
        )
        .unwrap();

        assert_eq!(n, 2);
        assert_eq!(sink.chunks.len(), 2);
        assert_eq!(sink.summaries.len(), 1);
        assert_eq!(sink.summaries[0].file_date, 7);
        assert!(tree.is_finished());
    }

    #[test]
    fn index_document_without_tree() {
        let config = small_config();
        let mut sink = MemorySink::new();
        index_document(&config, "k", "<a>hi</a>", 0, &mut sink, None)
            .unwrap();
        assert_eq!(sink.texts(), ["hi"]);
    }

    /// Accepts `room` chunks, then fails.
    struct FullAfter {
        room: usize,
        written: MemorySink,
    }

    impl IndexSink for FullAfter {
        fn append_chunk(&mut self, chunk: ChunkRecord) -> Result<()> {
            if self.room == 0 {
                return Err(Error::Config("sink is full".into()));
            }
            self.room -= 1;
            self.written.append_chunk(chunk)
        }

        fn append_summary(&mut self, summary: DocumentSummaryRecord) -> Result<()> {
            self.written.append_summary(summary)
        }
    }

    fn buffered(xml: &str) -> MemorySink {
        let mut sink = MemorySink::new();
        index_document(&small_config(), "k", xml, 0, &mut sink, None).unwrap();
        sink
    }

    #[test]
    fn write_failure_is_scoped_to_the_document() {
        let mut report = IngestReport::default();
        let mut sink = FullAfter {
            room: 3,
            written: MemorySink::new(),
        };

        let long = buffered(
            "<a>one two three four five six seven eight nine ten eleven twelve</a>",
        );
        assert!(long.chunks.len() > 3);
        let key = DocumentKey::new("lib", Path::new("long.xml"));
        assert!(!write_buffered(&key, long, &mut sink, &mut report));

        sink.room = usize::MAX;
        let short = buffered("<a>two words</a>");
        let key = DocumentKey::new("lib", Path::new("short.xml"));
        assert!(write_buffered(&key, short, &mut sink, &mut report));

        assert_eq!(report.failed, ["lib:long.xml"]);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(sink.written.summaries.len(), 1);
    }

    #[test]
    fn ingest_and_search() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("whale.xml"),
            "<book><p>Call me Ishmael. Some years ago.</p></book>",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("city.xml"),
            "<book><p>It was the best of times.</p></book>",
        )
        .unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        let config = small_config();
        let index = SearchIndex::open_in_ram(config.stop_set()).unwrap();
        let mut writer = index.writer(15_000_000).unwrap();

        let report =
            ingest_files(&index, &mut writer, &config, "lib", &files).unwrap();
        assert_eq!(report.indexed, 2);
        assert!(report.failed.is_empty());
        assert_eq!(index.document_count().unwrap(), 2);

        let hits = index.search_chunks("ishmael", 10).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].key, "lib:whale.xml");
    }

    #[test]
    fn broken_documents_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.xml"), "<a><b></a>").unwrap();
        std::fs::write(tmp.path().join("good.xml"), "<a>fine words</a>")
            .unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        let config = small_config();
        let index = SearchIndex::open_in_ram(None).unwrap();
        let mut writer = index.writer(15_000_000).unwrap();

        let report =
            ingest_files(&index, &mut writer, &config, "lib", &files).unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failed, ["lib:bad.xml"]);
        assert!(index.document_info("lib:bad.xml").unwrap().is_none());
        assert!(index.document_info("lib:good.xml").unwrap().is_some());
    }

    #[test]
    fn reingesting_replaces_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.xml");
        std::fs::write(&path, "<a>original content</a>").unwrap();

        let config = small_config();
        let index = SearchIndex::open_in_ram(None).unwrap();
        let mut writer = index.writer(15_000_000).unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        ingest_files(&index, &mut writer, &config, "lib", &files).unwrap();

        std::fs::write(&path, "<a>updated content</a>").unwrap();
        let files = discover_files(tmp.path(), None).unwrap();
        ingest_files(&index, &mut writer, &config, "lib", &files).unwrap();

        assert!(index.search_chunks("original", 10).unwrap().is_empty());
        assert_eq!(index.search_chunks("content", 10).unwrap().len(), 1);
        assert_eq!(index.document_count().unwrap(), 1);
    }
}
