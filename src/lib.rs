//! proxindex - a proximity-aware chunk indexer for XML documents.
//!
//! Each document is streamed through a [`ChunkAccumulator`], which cuts its
//! text into overlapping, fixed-size word windows. Section boundaries,
//! sentence ends and explicit breaks are kept as virtual-word gaps, so a
//! phrase or proximity query never matches across them. Chunks and a
//! per-document summary land in a [Tantivy](https://github.com/quickwit-oss/tantivy)
//! index whose tokenizer turns those gaps into real position gaps.
//!
//! # Quick start
//!
//! ```
//! use proxindex::{IndexerConfig, SearchIndex, WriterSink};
//! use proxindex::ingestion::index_document;
//!
//! let config = IndexerConfig::default();
//! let index = SearchIndex::open_in_ram(config.stop_set()).unwrap();
//! let mut writer = index.writer(15_000_000).unwrap();
//!
//! let xml = "<book><p>Call me Ishmael.</p></book>";
//! let mut sink = WriterSink::new(&index, &writer);
//! index_document(&config, "lib:moby.xml", xml, 0, &mut sink, None).unwrap();
//! drop(sink);
//! writer.commit().unwrap();
//!
//! let hits = index.search_chunks("ishmael", 10).unwrap();
//! assert_eq!(hits[0].key, "lib:moby.xml");
//! ```

pub mod analyzer;
pub mod blurb;
pub mod bump;
pub mod chunking;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod doc_id;
pub mod error;
pub mod incremental;
pub mod ingestion;
pub mod lazy_tree;
pub mod markers;
pub mod section;
pub mod sink;
pub mod stop_filter;
pub mod tantivy_index;
pub mod tokenizer;
pub mod virtual_words;
pub mod walker;
pub mod xml_source;

pub use chunking::ChunkAccumulator;
pub use config::IndexerConfig;
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use doc_id::DocumentKey;
pub use error::{Error, Result};
pub use lazy_tree::{LazyTreeBuilder, NodeTable};
pub use sink::{ChunkRecord, DocumentSummaryRecord, IndexSink, MemorySink};
pub use tantivy_index::{SearchIndex, WriterSink};
