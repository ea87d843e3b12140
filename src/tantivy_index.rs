use std::{collections::HashSet, path::Path};

use tantivy::{
    DocAddress,
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::{DocSetCollector, TopDocs},
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::*,
    tokenizer::{RemoveLongFilter, TextAnalyzer},
};

use crate::{
    analyzer::{PROXIMITY_TOKENIZER, ProximityTokenizer},
    error::Result,
    sink::{ChunkRecord, DocumentSummaryRecord, IndexSink},
};

/// Field names used in the schema.
pub mod fields {
    pub const KEY: &str = "key";
    pub const DOC_INFO: &str = "doc_info";
    pub const SECTION_TYPE: &str = "section_type";
    pub const SUB_DOCUMENT: &str = "sub_document";
    pub const NODE: &str = "node";
    pub const WORD_OFFSET: &str = "word_offset";
    pub const TEXT: &str = "text";
    pub const WORD_BOOST: &str = "word_boost";
    pub const SPELL: &str = "spell";
    pub const CHUNK_COUNT: &str = "chunk_count";
    pub const FILE_DATE: &str = "file_date";
    pub const META: &str = "meta";
    pub const META_TEXT: &str = "meta_text";
    pub const META_TERM: &str = "meta_term";
}

/// Separates a meta field's name from its value in the stored `meta` field.
pub const META_SEPARATOR: char = '\u{1F}';

/// Longest term kept in the index, in bytes.
const MAX_TERM_LEN: usize = 255;

/// Chunk and document-summary store backed by tantivy.
///
/// Chunks and summaries share one index. Summaries are told apart by their
/// `doc_info` term; both carry the document key, so deleting by key removes
/// every trace of a document.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub key: Field,
    pub doc_info: Field,
    pub section_type: Field,
    pub sub_document: Field,
    pub node: Field,
    pub word_offset: Field,
    pub text: Field,
    pub word_boost: Field,
    pub spell: Field,
    pub chunk_count: Field,
    pub file_date: Field,
    pub meta: Field,
    pub meta_text: Field,
    pub meta_term: Field,
}

impl SchemaFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let f = |name: &str| schema.get_field(name);
        Ok(Self {
            key: f(fields::KEY)?,
            doc_info: f(fields::DOC_INFO)?,
            section_type: f(fields::SECTION_TYPE)?,
            sub_document: f(fields::SUB_DOCUMENT)?,
            node: f(fields::NODE)?,
            word_offset: f(fields::WORD_OFFSET)?,
            text: f(fields::TEXT)?,
            word_boost: f(fields::WORD_BOOST)?,
            spell: f(fields::SPELL)?,
            chunk_count: f(fields::CHUNK_COUNT)?,
            file_date: f(fields::FILE_DATE)?,
            meta: f(fields::META)?,
            meta_text: f(fields::META_TEXT)?,
            meta_term: f(fields::META_TERM)?,
        })
    }
}

/// A chunk matching a query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChunkHit {
    pub score: f32,
    pub key: String,
    pub section_type: Option<String>,
    pub sub_document: Option<String>,
    pub node: u64,
    pub word_offset: u64,
    pub text: String,
    pub word_boost: f64,
}

/// A stored document summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DocInfo {
    pub key: String,
    pub sub_document: Option<String>,
    pub chunk_count: u64,
    pub file_date: u64,
    /// Stored meta fields as (name, value), in document order.
    pub meta: Vec<(String, String)>,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::KEY, STRING | STORED);
    builder.add_text_field(fields::DOC_INFO, STRING | STORED);
    builder.add_text_field(fields::SECTION_TYPE, TEXT | STORED);
    builder.add_text_field(fields::SUB_DOCUMENT, STRING | STORED);
    builder.add_u64_field(fields::NODE, STORED);
    builder.add_u64_field(fields::WORD_OFFSET, STORED);

    let proximity = TextFieldIndexing::default()
        .set_tokenizer(PROXIMITY_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    builder.add_text_field(
        fields::TEXT,
        TextOptions::default()
            .set_indexing_options(proximity.clone())
            .set_stored(),
    );
    builder.add_f64_field(fields::WORD_BOOST, STORED | FAST);
    builder.add_u64_field(fields::SPELL, STORED);

    builder.add_u64_field(fields::CHUNK_COUNT, STORED);
    builder.add_u64_field(fields::FILE_DATE, STORED | FAST);
    builder.add_text_field(fields::META, STORED);
    builder.add_text_field(
        fields::META_TEXT,
        TextOptions::default().set_indexing_options(proximity),
    );
    builder.add_text_field(fields::META_TERM, STRING);

    builder.build()
}

fn register_tokenizers(index: &Index, stop_words: Option<HashSet<String>>) {
    let proximity = TextAnalyzer::builder(ProximityTokenizer::new(stop_words))
        .filter(RemoveLongFilter::limit(MAX_TERM_LEN))
        .build();
    index.tokenizers().register(PROXIMITY_TOKENIZER, proximity);
}

impl SearchIndex {
    /// Open or create an index at the given directory.
    ///
    /// `stop_words` must be the set the index was built with; queries and
    /// new chunks are analyzed with it.
    pub fn open(dir: &Path, stop_words: Option<HashSet<String>>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                build_schema(),
                tantivy::IndexSettings::default(),
            )?
        };

        Self::from_index(index, stop_words)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram(stop_words: Option<HashSet<String>>) -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()), stop_words)
    }

    fn from_index(
        index: Index,
        stop_words: Option<HashSet<String>>,
    ) -> Result<Self> {
        register_tokenizers(&index, stop_words);
        let fields = SchemaFields::resolve(&index.schema())?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    pub fn add_chunk(
        &self,
        writer: &IndexWriter,
        chunk: &ChunkRecord,
    ) -> Result<()> {
        let f = self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_text(f.key, &chunk.key);
        if let Some(section_type) = &chunk.section_type {
            doc.add_text(f.section_type, section_type);
        }
        if let Some(sub_document) = &chunk.sub_document {
            doc.add_text(f.sub_document, sub_document);
        }
        doc.add_u64(f.node, chunk.node as u64);
        doc.add_u64(f.word_offset, chunk.word_offset as u64);
        doc.add_text(f.text, &chunk.text);
        doc.add_f64(f.word_boost, f64::from(chunk.word_boost));
        doc.add_u64(f.spell, u64::from(chunk.spell));
        writer.add_document(doc)?;
        Ok(())
    }

    pub fn add_summary(
        &self,
        writer: &IndexWriter,
        summary: &DocumentSummaryRecord,
    ) -> Result<()> {
        let f = self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_text(f.doc_info, "1");
        doc.add_text(f.key, &summary.key);
        if let Some(sub_document) = &summary.sub_document {
            doc.add_text(f.sub_document, sub_document);
        }
        doc.add_u64(f.chunk_count, summary.chunk_count as u64);
        doc.add_u64(f.file_date, summary.file_date);

        for field in &summary.meta {
            if field.store {
                doc.add_text(
                    f.meta,
                    format!("{}{META_SEPARATOR}{}", field.name, field.value),
                );
            }
            if !field.index {
                continue;
            }
            if field.tokenize && !field.facet {
                doc.add_text(f.meta_text, &field.value);
            } else {
                doc.add_text(
                    f.meta_term,
                    format!("{}:{}", field.name, field.value),
                );
            }
        }

        writer.add_document(doc)?;
        Ok(())
    }

    /// Remove every chunk and summary of a document.
    pub fn delete_document(&self, writer: &IndexWriter, key: &str) {
        let term = Term::from_field_text(self.fields.key, key);
        writer.delete_term(term);
    }

    fn summary_query(&self, key: Option<&str>) -> Box<dyn Query> {
        let f = self.fields;
        let doc_info: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(f.doc_info, "1"),
            IndexRecordOption::Basic,
        ));
        match key {
            Some(key) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, doc_info),
                (
                    Occur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_text(f.key, key),
                        IndexRecordOption::Basic,
                    )),
                ),
            ])),
            None => doc_info,
        }
    }

    fn summaries(&self, key: Option<&str>) -> Result<Vec<DocInfo>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let mut addresses: Vec<DocAddress> = searcher
            .search(&*self.summary_query(key), &DocSetCollector)?
            .into_iter()
            .collect();
        addresses.sort();

        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            out.push(self.to_doc_info(&doc));
        }
        Ok(out)
    }

    fn to_doc_info(&self, doc: &TantivyDocument) -> DocInfo {
        let f = self.fields;
        let meta = doc
            .get_all(f.meta)
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.split_once(META_SEPARATOR))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        DocInfo {
            key: extract_text(doc, f.key),
            sub_document: extract_opt_text(doc, f.sub_document),
            chunk_count: extract_u64(doc, f.chunk_count),
            file_date: extract_u64(doc, f.file_date),
            meta,
        }
    }

    /// The document-level summary of `key`, if the document was completely
    /// indexed.
    pub fn document_info(&self, key: &str) -> Result<Option<DocInfo>> {
        let mut summaries = self.summaries(Some(key))?;
        let pos = summaries
            .iter()
            .position(|s| s.sub_document.is_none())
            .unwrap_or(0);
        if summaries.is_empty() {
            return Ok(None);
        }
        Ok(Some(summaries.swap_remove(pos)))
    }

    /// Document-level summaries of every completely indexed document.
    pub fn list_documents(&self) -> Result<Vec<DocInfo>> {
        let mut docs: Vec<_> = self
            .summaries(None)?
            .into_iter()
            .filter(|s| s.sub_document.is_none())
            .collect();
        docs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(docs)
    }

    pub fn document_count(&self) -> Result<usize> {
        Ok(self.list_documents()?.len())
    }

    /// Rank chunks against `query` with BM25, scaled by each chunk's word
    /// boost.
    pub fn search_chunks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![f.text]);
        let (query, _errors) = parser.parse_query_lenient(query);

        let collector = TopDocs::with_limit(limit.max(1)).tweak_score(
            |segment: &tantivy::SegmentReader| {
                let boosts =
                    segment.fast_fields().f64(fields::WORD_BOOST).ok();
                move |doc: tantivy::DocId, score: tantivy::Score| {
                    let boost = boosts
                        .as_ref()
                        .and_then(|column| column.first(doc))
                        .unwrap_or(1.0);
                    score * boost as f32
                }
            },
        );
        let top_docs = searcher.search(&query, &collector)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(ChunkHit {
                score,
                key: extract_text(&doc, f.key),
                section_type: extract_opt_text(&doc, f.section_type),
                sub_document: extract_opt_text(&doc, f.sub_document),
                node: extract_u64(&doc, f.node),
                word_offset: extract_u64(&doc, f.word_offset),
                text: extract_text(&doc, f.text),
                word_boost: doc
                    .get_first(f.word_boost)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(1.0),
            });
        }
        Ok(hits)
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

/// [`IndexSink`] writing straight into a tantivy index. Nothing becomes
/// visible until the writer commits.
pub struct WriterSink<'a> {
    index: &'a SearchIndex,
    writer: &'a IndexWriter,
}

impl<'a> WriterSink<'a> {
    pub fn new(index: &'a SearchIndex, writer: &'a IndexWriter) -> Self {
        Self { index, writer }
    }
}

impl IndexSink for WriterSink<'_> {
    fn append_chunk(&mut self, chunk: ChunkRecord) -> Result<()> {
        self.index.add_chunk(self.writer, &chunk)
    }

    fn append_summary(&mut self, summary: DocumentSummaryRecord) -> Result<()> {
        self.index.add_summary(self.writer, &summary)
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_opt_text(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
