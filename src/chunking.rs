//! Streaming chunk accumulator.
//!
//! [`ChunkAccumulator`] consumes the parse events of one document and cuts
//! its indexable text into overlapping windows of `chunk_size` words. Each
//! window is anchored to the source node its first word came from and to
//! that word's offset inside the node, so a chunk hit can be traced back to
//! an exact spot in the document.
//!
//! Section boundaries, sentence ends and explicit breaks are encoded as
//! virtual words. They count toward the window like real words, which is
//! what pushes words on either side of a boundary apart, and are compacted
//! into bump markers before a chunk is handed to the sink.
//!
//! # Examples
//!
//! ```
//! use proxindex::{
//!     chunking::ChunkAccumulator,
//!     config::IndexerConfig,
//!     sink::MemorySink,
//!     xml_source::parse_document,
//! };
//!
//! let config = IndexerConfig {
//!     chunk_size: 3,
//!     chunk_overlap: 1,
//!     ..IndexerConfig::default()
//! };
//! let mut sink = MemorySink::new();
//! let mut acc = ChunkAccumulator::new(&config, "books:a.xml", 0, &mut sink);
//! parse_document("<doc><p>one two three four five</p></doc>", |e| {
//!     acc.handle(e)
//! })
//! .unwrap();
//! assert_eq!(acc.chunks_written(), 2);
//! drop(acc);
//!
//! assert_eq!(sink.texts(), ["one two three", "three four five"]);
//! assert_eq!(sink.chunks[1].word_offset, 2);
//! ```

use std::mem;

use tracing::{debug, warn};

use crate::{
    blurb::blurbify,
    bump::{bump_marker, compact_virtual_words, has_real_words},
    config::IndexerConfig,
    error::{Error, Result},
    lazy_tree::LazyTreeBuilder,
    markers::{FIELD_END_MARKER, FIELD_START_MARKER, NODE_MARKER},
    section::{IndexFlag, SectionAttrs, SectionFrame, SectionStack, SpellFlag},
    sink::{ChunkRecord, DocumentSummaryRecord, IndexSink, MetaField},
    tokenizer::Tokenizer,
    virtual_words::{LeadingBump, insert_virtual_words},
    xml_source::{Attribute, ParseEvent},
};

/// Element names that would collide with the index's own fields.
const RESERVED_META_NAMES: &[&str] = &[
    "text",
    "key",
    "docInfo",
    "chunkCount",
    "chunkOvlp",
    "chunkSize",
    "fileDate",
    "indexInfo",
    "stopWords",
    "tokenizedFields",
    "xtfIndexVersion",
];

/// Where the chunk after the current one starts, captured when the window
/// reaches its overlap point.
#[derive(Debug, Clone, Copy)]
struct NextStart {
    node: usize,
    word_offset: usize,
    word_count: usize,
    /// Byte index in the window text of the next chunk's first word.
    text_idx: usize,
}

#[derive(Debug, Default)]
struct ChunkWindow {
    /// Node and in-node word offset of the window's first word.
    start: Option<(usize, usize)>,
    word_count: usize,
    next: Option<NextStart>,
    /// Real words added since the last emission.
    fresh: usize,
    text: String,
}

impl ChunkWindow {
    /// Strip trailing spaces, then with `one_space` put a single one back on
    /// non-empty text. Returns the resulting length.
    fn trim(&mut self, one_space: bool) -> usize {
        let len = self.text.trim_end_matches(' ').len();
        self.text.truncate(len);
        if one_space && !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.len()
    }

    /// Make the precomputed next chunk current, keeping only its text.
    fn roll(&mut self) {
        match self.next.take() {
            Some(next) => {
                self.start = Some((next.node, next.word_offset));
                self.word_count = next.word_count;
                self.text.drain(..next.text_idx);
            }
            None => {
                self.start = None;
                self.word_count = 0;
                self.text.clear();
            }
        }
    }

    fn clear(&mut self) {
        self.start = None;
        self.word_count = 0;
        self.next = None;
        self.fresh = 0;
        self.text.clear();
    }
}

/// A meta-data field being collected.
#[derive(Debug)]
struct MetaCapture {
    field: MetaField,
    /// 1 inside the meta element itself, +1 per nested element.
    depth: usize,
    buf: String,
}

/// Chunking state machine for a single document.
///
/// Feed it events through [`handle`](Self::handle) (or the individual
/// event methods) in document order. Every chunk goes to the sink as soon as
/// it is complete; the document summary follows after the last chunk of each
/// (sub-)document. An error leaves the accumulator in an unspecified state
/// and it must be dropped.
pub struct ChunkAccumulator<'a> {
    config: &'a IndexerConfig,
    key: String,
    file_date: u64,
    sink: &'a mut dyn IndexSink,
    lazy: Option<&'a mut dyn LazyTreeBuilder>,
    sections: SectionStack,
    pending_text: String,
    cur_node: usize,
    /// Real words seen so far in `cur_node`.
    node_word_count: usize,
    window: ChunkWindow,
    forced_chunk: bool,
    /// Chunks emitted since the last summary.
    chunk_count: usize,
    total_chunks: usize,
    open_elements: Vec<String>,
    meta: Option<MetaCapture>,
    /// Meta fields per open (sub-)document, innermost last.
    meta_scopes: Vec<Vec<MetaField>>,
}

impl std::fmt::Debug for ChunkAccumulator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkAccumulator")
            .field("key", &self.key)
            .field("cur_node", &self.cur_node)
            .field("total_chunks", &self.total_chunks)
            .finish_non_exhaustive()
    }
}

impl<'a> ChunkAccumulator<'a> {
    pub fn new(
        config: &'a IndexerConfig,
        key: impl Into<String>,
        file_date: u64,
        sink: &'a mut dyn IndexSink,
    ) -> Self {
        Self {
            config,
            key: key.into(),
            file_date,
            sink,
            lazy: None,
            sections: SectionStack::from_config(config),
            pending_text: String::new(),
            cur_node: 0,
            node_word_count: 0,
            window: ChunkWindow::default(),
            forced_chunk: false,
            chunk_count: 0,
            total_chunks: 0,
            open_elements: Vec::new(),
            meta: None,
            meta_scopes: vec![Vec::new()],
        }
    }

    /// Forward every event to `lazy` as well, and verify after each element
    /// that both sides agree on the node count.
    pub fn with_lazy_tree(mut self, lazy: &'a mut dyn LazyTreeBuilder) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// Chunks handed to the sink so far.
    pub fn chunks_written(&self) -> usize {
        self.total_chunks
    }

    pub fn handle(&mut self, event: ParseEvent) -> Result<()> {
        match event {
            ParseEvent::StartDocument => self.start_document(),
            ParseEvent::StartElement { name, attributes } => {
                self.start_element(&name, &attributes)
            }
            ParseEvent::Characters(text) => {
                self.characters(&text);
                Ok(())
            }
            ParseEvent::ProcessingInstruction { target, data } => {
                self.processing_instruction(&target, &data)
            }
            ParseEvent::EndElement { name } => self.end_element(&name),
            ParseEvent::EndDocument => self.end_document(),
        }
    }

    pub fn start_document(&mut self) -> Result<()> {
        if let Some(lazy) = &mut self.lazy {
            lazy.start_document()?;
        }
        self.sections.push_default();
        Ok(())
    }

    /// Buffer text. Adjacent calls are joined and processed as one run when
    /// the next structural event arrives.
    pub fn characters(&mut self, text: &str) {
        self.pending_text.push_str(text);
    }

    pub fn start_element(
        &mut self,
        name: &str,
        attributes: &[Attribute],
    ) -> Result<()> {
        self.flush_characters()?;
        if let Some(lazy) = &mut self.lazy {
            lazy.start_element(name, attributes)?;
        }
        self.open_elements.push(name.to_string());

        if starts_meta_field(attributes) {
            if self.meta.is_some() {
                return Err(Error::NestedMeta {
                    element: name.to_string(),
                });
            }
            self.meta = Some(start_meta_field(name, attributes)?);
        } else if let Some(meta) = &mut self.meta {
            meta.depth += 1;
            meta.buf.push('<');
            meta.buf.push_str(name);
            let attrs = plain_attributes(attributes);
            if !attrs.is_empty() {
                meta.buf.push(' ');
                meta.buf.push_str(&attrs);
            }
            meta.buf.push('>');
        } else {
            self.start_section(attributes)?;
        }

        self.increment_node();
        Ok(())
    }

    pub fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
    ) -> Result<()> {
        self.flush_characters()?;
        if let Some(lazy) = &mut self.lazy {
            lazy.processing_instruction(target, data)?;
        }
        self.increment_node();
        Ok(())
    }

    pub fn end_element(&mut self, name: &str) -> Result<()> {
        self.flush_characters()?;
        if let Some(lazy) = &mut self.lazy {
            lazy.end_element(name)?;
        }
        match self.open_elements.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(Error::Malformed(format!(
                    "</{name}> closes <{open}>"
                )));
            }
            None => {
                return Err(Error::Malformed(format!(
                    "</{name}> without an open element"
                )));
            }
        }

        if let Some(meta) = self.meta.as_mut()
            && meta.depth > 1
        {
            meta.depth -= 1;
            meta.buf.push_str("</");
            meta.buf.push_str(name);
            meta.buf.push('>');
        } else if let Some(meta) = self.meta.take() {
            self.finish_meta_field(meta);
        } else {
            self.end_section()?;
        }

        self.check_lazy_sync()
    }

    /// Emit whatever is left and write the document summary.
    pub fn end_document(&mut self) -> Result<()> {
        self.flush_characters()?;
        if let Some(lazy) = &mut self.lazy {
            lazy.end_document()?;
        }
        if let Some(open) = self.open_elements.last() {
            return Err(Error::Malformed(format!("<{open}> was never closed")));
        }

        let frame = self.sections.snapshot();
        if self.window.fresh > 0 {
            self.emit_chunk(&frame)?;
        }
        self.window.clear();

        let meta = mem::take(&mut self.meta_scopes)
            .into_iter()
            .next()
            .unwrap_or_default();
        self.save_summary(frame.sub_document, meta)?;

        debug!(
            key = %self.key,
            chunks = self.total_chunks,
            nodes = self.cur_node + 1,
            "document chunked"
        );
        Ok(())
    }

    fn start_section(&mut self, attributes: &[Attribute]) -> Result<()> {
        let prev = self.sections.snapshot();
        let (attrs, proximity_break) = section_attrs(&prev, attributes)?;
        if proximity_break {
            self.force_new_chunk(&prev)?;
        }
        self.sections.push(attrs);

        if self.sections.sub_document() != prev.sub_document.as_deref() {
            self.force_new_chunk(&prev)?;
            let enclosing = self.meta_scopes.last().cloned().unwrap_or_default();
            if self.chunk_count > 0 {
                self.save_summary(prev.sub_document.clone(), enclosing.clone())?;
            }
            self.meta_scopes.push(enclosing);
        } else if boundary_changed(&prev, &self.sections) {
            self.force_new_chunk(&prev)?;
        }
        Ok(())
    }

    fn end_section(&mut self) -> Result<()> {
        let prev = self.sections.snapshot();
        if !self.sections.pop() {
            return Err(Error::Malformed(
                "more sections closed than opened".to_string(),
            ));
        }

        if boundary_changed(&prev, &self.sections) {
            self.force_new_chunk(&prev)?;
        }
        if self.sections.sub_document() != prev.sub_document.as_deref() {
            self.force_new_chunk(&prev)?;
            let meta = self.meta_scopes.pop().unwrap_or_default();
            if self.chunk_count > 0 {
                self.save_summary(prev.sub_document.clone(), meta)?;
            }
        }
        Ok(())
    }

    fn increment_node(&mut self) {
        self.cur_node += 1;
        self.node_word_count = 0;
        if !self.window.text.is_empty() {
            self.window.text.push(NODE_MARKER);
        }
    }

    fn check_lazy_sync(&self) -> Result<()> {
        if let Some(lazy) = &self.lazy
            && lazy.node_count() != self.cur_node + 1
        {
            return Err(Error::Malformed(format!(
                "node table has {} nodes, chunker expects {}",
                lazy.node_count(),
                self.cur_node + 1
            )));
        }
        Ok(())
    }

    /// Process the buffered text run.
    fn flush_characters(&mut self) -> Result<()> {
        if self.pending_text.is_empty() {
            return Ok(());
        }
        let raw = mem::take(&mut self.pending_text);
        if self.config.strip_whitespace && raw.chars().all(char::is_whitespace)
        {
            return Ok(());
        }

        if let Some(lazy) = &mut self.lazy {
            lazy.characters(&raw)?;
        }
        self.increment_node();

        if let Some(meta) = &mut self.meta {
            escape_markup_into(&mut meta.buf, &raw);
            return Ok(());
        }
        if self.sections.index_flag() == IndexFlag::NoIndex {
            return Ok(());
        }

        let blurb = blurbify(&raw, true);
        let leading = LeadingBump::resolve(
            self.sections.use_section_bump(),
            mem::take(&mut self.forced_chunk),
            self.config.chunk_size,
        );
        let text =
            insert_virtual_words(&blurb, self.sections.sentence_bump(), leading);
        if text.is_empty() {
            return Ok(());
        }
        self.add_words(&text)
    }

    /// Run the words of one prepared text run through the window.
    fn add_words(&mut self, text: &str) -> Result<()> {
        let chunk_size = self.config.chunk_size;
        let overlap_start = chunk_size.saturating_sub(self.config.chunk_overlap);
        let mut tokens = Tokenizer::new(text).peekable();
        let mut punct_start = 0;
        let mut accum_len = self.window.trim(true);

        while let Some(word) = tokens.next() {
            let window = &mut self.window;
            if window.start.is_none() {
                window.start = Some((self.cur_node, self.node_word_count));
            }
            if window.word_count == overlap_start {
                window.next = Some(NextStart {
                    node: self.cur_node,
                    word_offset: self.node_word_count,
                    word_count: 0,
                    text_idx: accum_len + word.start - punct_start,
                });
            }

            window.text.push_str(&text[punct_start..word.end]);
            punct_start = word.end;

            window.word_count += 1;
            if let Some(next) = &mut window.next {
                next.word_count += 1;
            }
            if !word.is_virtual() {
                self.node_word_count += 1;
                window.fresh += 1;
            }

            if window.word_count < chunk_size {
                accum_len = window.trim(false);
                continue;
            }

            // Trailing punctuation up to the next word belongs to this chunk.
            let punct_end = tokens.peek().map_or(text.len(), |t| t.start);
            window.text.push_str(&text[punct_start..punct_end]);
            window.trim(false);
            punct_start = punct_end;

            let frame = self.sections.snapshot();
            self.emit_chunk(&frame)?;
            self.window.roll();
            accum_len = self.window.trim(true);
        }

        self.window.text.push_str(&text[punct_start..]);
        self.window.trim(false);
        Ok(())
    }

    /// Hand the window to the sink as one chunk, attributed to `frame`.
    fn emit_chunk(&mut self, frame: &SectionFrame) -> Result<()> {
        self.window.fresh = 0;
        let Some((node, word_offset)) = self.window.start else {
            return Ok(());
        };
        let text = compact_virtual_words(&self.window.text);
        if !has_real_words(&text) {
            return Ok(());
        }

        self.sink.append_chunk(ChunkRecord {
            key: self.key.clone(),
            section_type: (!frame.section_type.is_empty())
                .then(|| frame.section_type.clone()),
            sub_document: frame.sub_document.clone(),
            node,
            word_offset,
            text,
            word_boost: frame.word_boost,
            spell: frame.spell == SpellFlag::Spell,
        })?;
        self.chunk_count += 1;
        self.total_chunks += 1;
        Ok(())
    }

    /// End the current chunk early. Text that follows starts a new chunk
    /// behind a full chunk's worth of padding, so it never overlaps what came
    /// before.
    fn force_new_chunk(&mut self, frame: &SectionFrame) -> Result<()> {
        if self.window.fresh > 0 {
            self.emit_chunk(frame)?;
        }
        self.window.clear();
        self.forced_chunk = true;
        Ok(())
    }

    fn finish_meta_field(&mut self, meta: MetaCapture) {
        let MetaCapture { mut field, buf, .. } = meta;
        let value = buf.trim();
        field.value = if field.tokenize && !field.facet {
            let split = if value.starts_with("<$ ") {
                value.find('>').map_or(0, |i| i + 1)
            } else {
                0
            };
            format!(
                "{}{FIELD_START_MARKER}{}{FIELD_END_MARKER}",
                &value[..split],
                &value[split..]
            )
        } else {
            value.to_string()
        };
        if field.facet && field.index {
            field.tokenize = true;
        }

        if self.meta_scopes.is_empty() {
            self.meta_scopes.push(Vec::new());
        }
        let Some(scope) = self.meta_scopes.last_mut() else {
            return;
        };
        if let Some(existing) = scope
            .iter_mut()
            .find(|m| m.name == field.name && m.tokenize && !m.facet)
        {
            // Keep separate values out of each other's proximity.
            existing.value.push_str(&bump_marker(self.config.chunk_size));
            existing.value.push(' ');
            existing.value.push_str(&field.value);
            return;
        }
        if scope.iter().any(|m| m.name == field.name) {
            field.word_boost = 1.0;
        }
        scope.push(field);
    }

    fn save_summary(
        &mut self,
        sub_document: Option<String>,
        meta: Vec<MetaField>,
    ) -> Result<()> {
        if meta.is_empty() {
            warn!(key = %self.key, "no meta-data found for document");
        }
        self.sink.append_summary(DocumentSummaryRecord {
            key: self.key.clone(),
            sub_document,
            chunk_count: mem::take(&mut self.chunk_count),
            file_date: self.file_date,
            meta,
        })
    }
}

fn boundary_changed(prev: &SectionFrame, sections: &SectionStack) -> bool {
    prev.section_type != sections.section_type()
        || prev.word_boost != sections.word_boost()
        || prev.spell != sections.spell_flag()
}

/// `true`/`yes` and `false`/`no` in any case; anything else is `None`.
fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("no")
    {
        Some(false)
    } else {
        None
    }
}

fn parse_count(attr: &Attribute) -> Result<usize> {
    attr.value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAttribute {
            name: attr.local_name.clone(),
            value: attr.value.clone(),
            reason: "expected a non-negative whole number",
        })
}

fn parse_boost(attr: &Attribute) -> Result<f32> {
    match attr.value.trim().parse::<f32>() {
        Ok(boost) if boost.is_finite() && boost > 0.0 => Ok(boost),
        _ => Err(Error::InvalidAttribute {
            name: attr.local_name.clone(),
            value: attr.value.clone(),
            reason: "expected a positive number",
        }),
    }
}

fn xtf_attributes(
    attributes: &[Attribute],
) -> impl Iterator<Item = (String, &Attribute)> {
    attributes
        .iter()
        .filter(|a| a.is_xtf())
        .map(|a| (a.local_name.to_ascii_lowercase(), a))
}

fn starts_meta_field(attributes: &[Attribute]) -> bool {
    xtf_attributes(attributes)
        .any(|(name, a)| name == "meta" && parse_flag(&a.value) == Some(true))
}

/// Resolve the section an element opens, starting from the enclosing one.
/// Also reports whether the element asks for a proximity break.
fn section_attrs(
    current: &SectionFrame,
    attributes: &[Attribute],
) -> Result<(SectionAttrs, bool)> {
    let mut attrs = SectionAttrs {
        index: None,
        section_type: current.section_type.clone(),
        section_bump: 0,
        word_boost: current.word_boost,
        sentence_bump: current.sentence_bump,
        spell: None,
        sub_document: None,
    };
    let mut proximity_break = false;

    for (name, attr) in xtf_attributes(attributes) {
        let value = attr.value.as_str();
        match name.as_str() {
            "sectiontype" => attrs.section_type = value.to_string(),
            "sectiontypeadd" => {
                attrs.section_type.push(' ');
                attrs.section_type.push_str(value);
            }
            "sectionbump" => attrs.section_bump = parse_count(attr)?,
            "wordboost" => attrs.word_boost = parse_boost(attr)?,
            "sentencebump" => attrs.sentence_bump = parse_count(attr)?,
            "noindex" => {
                if let Some(no_index) = parse_flag(value) {
                    attrs.index = Some(if no_index {
                        IndexFlag::NoIndex
                    } else {
                        IndexFlag::Index
                    });
                }
            }
            "index" => {
                if let Some(index) = parse_flag(value) {
                    attrs.index = Some(if index {
                        IndexFlag::Index
                    } else {
                        IndexFlag::NoIndex
                    });
                }
            }
            "spell" => {
                if let Some(spell) = parse_flag(value) {
                    attrs.spell = Some(if spell {
                        SpellFlag::Spell
                    } else {
                        SpellFlag::NoSpell
                    });
                }
            }
            "proximitybreak" => {
                proximity_break |= parse_flag(value).unwrap_or(false);
            }
            "subdocument" => attrs.sub_document = Some(value.to_string()),
            // meta="no" is allowed and means an ordinary element.
            "meta" => {}
            _ => warn!(
                attribute = %attr.local_name,
                value,
                "unrecognized indexing attribute"
            ),
        }
    }
    Ok((attrs, proximity_break))
}

fn start_meta_field(name: &str, attributes: &[Attribute]) -> Result<MetaCapture> {
    if RESERVED_META_NAMES.contains(&name) {
        return Err(Error::ReservedMetaName(name.to_string()));
    }

    let mut field = MetaField {
        name: name.to_string(),
        value: String::new(),
        store: true,
        index: true,
        tokenize: true,
        facet: false,
        spell: true,
        word_boost: 1.0,
    };
    for (attr_name, attr) in xtf_attributes(attributes) {
        let flag = parse_flag(&attr.value);
        match attr_name.as_str() {
            "store" => field.store = flag.unwrap_or(field.store),
            "index" => field.index = flag.unwrap_or(field.index),
            "noindex" => {
                if flag == Some(true) {
                    field.index = false;
                }
            }
            "tokenize" => field.tokenize = flag.unwrap_or(field.tokenize),
            "facet" => field.facet = flag.unwrap_or(field.facet),
            "spell" => field.spell = flag.unwrap_or(field.spell),
            "wordboost" => field.word_boost = parse_boost(attr)?,
            "meta" => {}
            _ => warn!(
                field = name,
                attribute = %attr.local_name,
                value = %attr.value,
                "unrecognized meta-data attribute"
            ),
        }
    }

    let attrs = plain_attributes(attributes);
    let buf = if attrs.is_empty() {
        String::new()
    } else {
        format!("<$ {attrs}>")
    };
    Ok(MetaCapture {
        field,
        depth: 1,
        buf,
    })
}

/// `name="value"` pairs for every attribute outside the reserved namespace.
fn plain_attributes(attributes: &[Attribute]) -> String {
    attributes
        .iter()
        .filter(|a| !a.is_xtf())
        .map(|a| format!("{}=\"{}\"", a.local_name, a.value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_markup_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        bump::{BumpDecoder, word_count},
        lazy_tree::NodeTable,
        markers::{BUMP_MARKER, VIRTUAL_WORD},
        sink::MemorySink,
        tokenizer::{Tokenizer, is_virtual_word},
        xml_source::parse_document,
    };

    const NS: &str = r#"xmlns:xtf="http://cdlib.org/xtf""#;

    fn config(chunk_size: usize, chunk_overlap: usize) -> IndexerConfig {
        IndexerConfig {
            chunk_size,
            chunk_overlap,
            stop_words: None,
            ..IndexerConfig::default()
        }
    }

    fn chunk_xml(config: &IndexerConfig, xml: &str) -> Result<MemorySink> {
        let mut sink = MemorySink::new();
        let mut nodes = NodeTable::new();
        let mut acc = ChunkAccumulator::new(config, "test:doc.xml", 42, &mut sink)
            .with_lazy_tree(&mut nodes);
        parse_document(xml, |e| acc.handle(e))?;
        drop(acc);
        Ok(sink)
    }

    /// Real words of a chunk, bumps removed.
    fn words(text: &str) -> Vec<String> {
        BumpDecoder::new(text, Tokenizer::new(text))
            .map(|t| t.text.into_owned())
            .collect()
    }

    #[test]
    fn overlapping_chunks_in_one_run() {
        let sink = chunk_xml(
            &config(3, 1),
            "<doc><p>one two three four five</p></doc>",
        )
        .unwrap();

        assert_eq!(sink.texts(), ["one two three", "three four five"]);
        assert_eq!(sink.chunks[0].node, 3);
        assert_eq!(sink.chunks[0].word_offset, 0);
        assert_eq!(sink.chunks[1].node, 3);
        assert_eq!(sink.chunks[1].word_offset, 2);

        assert_eq!(sink.summaries.len(), 1);
        assert_eq!(sink.summaries[0].chunk_count, 2);
        assert_eq!(sink.summaries[0].file_date, 42);
    }

    #[test]
    fn proximity_break_prevents_overlap() {
        let xml = format!(
            r#"<doc {NS}><p>one two three</p><p xtf:proximityBreak="true">four five</p></doc>"#
        );
        let sink = chunk_xml(&config(3, 1), &xml).unwrap();

        assert_eq!(sink.chunks.len(), 2);
        assert_eq!(words(&sink.chunks[0].text), ["one", "two", "three"]);
        assert_eq!(words(&sink.chunks[1].text), ["four", "five"]);
        assert!(sink.chunks[1].text.starts_with(BUMP_MARKER));
        assert_eq!(sink.chunks[1].node, 5);
        assert_eq!(sink.chunks[1].word_offset, 0);
        for chunk in &sink.chunks {
            let w = words(&chunk.text);
            assert!(
                !(w.contains(&"three".to_string())
                    && w.contains(&"four".to_string()))
            );
        }
    }

    #[test]
    fn overlap_follows_words_into_the_next_node() {
        let sink = chunk_xml(
            &config(3, 1),
            "<doc><p>one two</p><p>three four five</p></doc>",
        )
        .unwrap();

        assert_eq!(sink.chunks.len(), 2);
        assert_eq!(words(&sink.chunks[0].text), ["one", "two", "three"]);
        assert!(sink.chunks[0].text.contains(NODE_MARKER));
        assert_eq!((sink.chunks[0].node, sink.chunks[0].word_offset), (3, 0));
        assert_eq!((sink.chunks[1].node, sink.chunks[1].word_offset), (5, 0));
    }

    #[test]
    fn sentence_bump_survives_compaction() {
        let sink =
            chunk_xml(&config(100, 50), "<doc><p>A cat sat. A dog ran.</p></doc>")
                .unwrap();
        assert_eq!(sink.chunks.len(), 1);

        let text = &sink.chunks[0].text;
        let gaps: Vec<_> = BumpDecoder::new(text, Tokenizer::new(text))
            .map(|t| (t.text.into_owned(), t.position_increment))
            .collect();
        assert_eq!(gaps[3], ("A".to_string(), 6));
        assert_eq!(word_count(text), 16);
    }

    #[test]
    fn runs_of_only_virtual_words_emit_nothing() {
        let xml = format!(r#"<doc {NS}><p xtf:sectionBump="7">!</p></doc>"#);
        let sink = chunk_xml(&config(3, 1), &xml).unwrap();
        assert!(sink.chunks.is_empty());
        assert_eq!(sink.summaries.len(), 1);
        assert_eq!(sink.summaries[0].chunk_count, 0);
    }

    #[test]
    fn section_type_change_forces_a_chunk() {
        let xml = format!(
            r#"<doc {NS}><head xtf:sectionType="title">The Title</head><body>Some body text</body></doc>"#
        );
        let sink = chunk_xml(&config(100, 50), &xml).unwrap();

        assert_eq!(sink.chunks.len(), 2);
        assert_eq!(sink.chunks[0].section_type.as_deref(), Some("title"));
        assert_eq!(words(&sink.chunks[0].text), ["The", "Title"]);
        assert_eq!(sink.chunks[1].section_type, None);
        assert_eq!(words(&sink.chunks[1].text), ["Some", "body", "text"]);
        assert!(word_count(&sink.chunks[1].text) <= 100);
    }

    #[test]
    fn section_type_add_extends_inherited_type() {
        let xml = format!(
            r#"<doc {NS}><div xtf:sectionType="chapter"><p xtf:sectionTypeAdd="intro">hello</p></div></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        assert_eq!(sink.chunks[0].section_type.as_deref(), Some("chapter intro"));
    }

    #[test]
    fn identical_nested_boost_keeps_one_chunk() {
        let xml = format!(
            r#"<doc {NS}><p xtf:wordBoost="2.5">a b <i xtf:wordBoost="2.5">c</i> d</p></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();

        assert_eq!(sink.chunks.len(), 1);
        assert_eq!(sink.chunks[0].word_boost, 2.5);
        assert_eq!(words(&sink.chunks[0].text), ["a", "b", "c", "d"]);
    }

    #[test]
    fn word_boost_change_splits_chunks() {
        let xml = format!(
            r#"<doc {NS}><p>plain words</p><p xtf:wordBoost="3">boosted</p></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        let boosts: Vec<_> = sink.chunks.iter().map(|c| c.word_boost).collect();
        assert_eq!(boosts, [1.0, 3.0]);
    }

    #[test]
    fn no_index_sections_are_skipped() {
        let xml = format!(
            r#"<doc {NS}><p>kept</p><note xtf:noIndex="true">hidden words</note><p>also kept</p></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        assert_eq!(sink.chunks.len(), 1);
        assert_eq!(words(&sink.chunks[0].text), ["kept", "also", "kept"]);
    }

    #[test]
    fn spell_flag_is_recorded() {
        let xml = format!(
            r#"<doc {NS}><p>normal</p><code xtf:spell="no">xyzzy</code></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        let flags: Vec<_> = sink.chunks.iter().map(|c| c.spell).collect();
        assert_eq!(flags, [true, false]);
    }

    #[test]
    fn meta_fields_go_to_the_summary() {
        let xml = format!(
            r#"<doc {NS}><title xtf:meta="true">A &amp; B</title><author xtf:meta="yes" xtf:tokenize="no" role="ed">Smith</author><author xtf:meta="true" xtf:tokenize="no" xtf:wordBoost="2">Jones</author><p>text</p></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();

        assert_eq!(sink.texts(), ["text"]);
        let meta = &sink.summaries[0].meta;
        assert_eq!(meta.len(), 3);
        assert_eq!(
            meta[0].value,
            format!("{FIELD_START_MARKER}A &amp; B{FIELD_END_MARKER}")
        );
        assert_eq!(meta[1].value, r#"<$ role="ed">Smith"#);
        assert!(!meta[1].tokenize);
        assert_eq!(meta[2].value, "Jones");
        assert_eq!(meta[2].word_boost, 1.0);
    }

    #[test]
    fn nested_markup_in_meta_is_serialized() {
        let xml = format!(
            r#"<doc {NS}><title xtf:meta="true" lang="en">The <i>Big</i> Sleep</title></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        assert_eq!(
            sink.summaries[0].meta[0].value,
            format!(
                r#"<$ lang="en">{FIELD_START_MARKER}The <i>Big</i> Sleep{FIELD_END_MARKER}"#
            )
        );
    }

    #[test]
    fn repeated_tokenized_meta_is_merged_with_a_bump() {
        let xml = format!(
            r#"<doc {NS}><subject xtf:meta="true">cats</subject><subject xtf:meta="true">dogs</subject></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        let meta = &sink.summaries[0].meta;
        assert_eq!(meta.len(), 1);
        assert_eq!(
            meta[0].value,
            format!(
                "{FIELD_START_MARKER}cats{FIELD_END_MARKER}{} {FIELD_START_MARKER}dogs{FIELD_END_MARKER}",
                bump_marker(10)
            )
        );
    }

    #[test]
    fn facets_are_indexed_whole() {
        let xml = format!(
            r#"<doc {NS}><genre xtf:meta="true" xtf:facet="true">Science Fiction</genre></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        let field = &sink.summaries[0].meta[0];
        assert!(field.facet);
        assert!(field.tokenize);
        assert_eq!(field.value, "Science Fiction");
    }

    #[test]
    fn nested_meta_is_fatal() {
        let xml = format!(
            r#"<doc {NS}><a xtf:meta="true"><b xtf:meta="true">x</b></a></doc>"#
        );
        let err = chunk_xml(&config(10, 5), &xml).unwrap_err();
        assert!(matches!(err, Error::NestedMeta { element } if element == "b"));
    }

    #[test]
    fn reserved_meta_name_is_fatal() {
        let xml = format!(r#"<doc {NS}><key xtf:meta="true">x</key></doc>"#);
        let err = chunk_xml(&config(10, 5), &xml).unwrap_err();
        assert!(matches!(err, Error::ReservedMetaName(name) if name == "key"));
    }

    #[test]
    fn bad_numeric_attributes_are_fatal() {
        for attr in [
            r#"xtf:sectionBump="lots""#,
            r#"xtf:sectionBump="-2""#,
            r#"xtf:wordBoost="0""#,
            r#"xtf:sentenceBump="1.5""#,
        ] {
            let xml = format!(r#"<doc {NS}><p {attr}>x</p></doc>"#);
            let err = chunk_xml(&config(10, 5), &xml).unwrap_err();
            assert!(
                matches!(err, Error::InvalidAttribute { .. }),
                "{attr}: {err}"
            );
        }
    }

    #[test]
    fn unknown_reserved_attribute_is_ignored() {
        let xml = format!(r#"<doc {NS}><p xtf:colour="red">x</p></doc>"#);
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        assert_eq!(sink.texts(), ["x"]);
    }

    #[test]
    fn unknown_meta_attribute_keeps_the_field() {
        let xml = format!(
            r#"<doc {NS}><title xtf:meta="true" xtf:tokenise="no">Moby Dick</title><p>x</p></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();
        let meta = &sink.summaries[0].meta;
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].name, "title");
        assert!(meta[0].tokenize);
    }

    #[test]
    fn sub_documents_get_their_own_summaries() {
        let xml = format!(
            r#"<doc {NS}><title xtf:meta="true">T</title><part xtf:subDocument="p1"><p>alpha beta</p></part><part xtf:subDocument="p2"><p>gamma</p></part></doc>"#
        );
        let sink = chunk_xml(&config(10, 5), &xml).unwrap();

        let subs: Vec<_> =
            sink.chunks.iter().map(|c| c.sub_document.as_deref()).collect();
        assert_eq!(subs, [Some("p1"), Some("p2")]);

        let summaries: Vec<_> = sink
            .summaries
            .iter()
            .map(|s| (s.sub_document.as_deref(), s.chunk_count, s.meta.len()))
            .collect();
        assert_eq!(summaries, [
            (Some("p1"), 1, 1),
            (Some("p2"), 1, 1),
            (None, 0, 1)
        ]);
    }

    #[test]
    fn processing_instructions_take_a_node() {
        let sink =
            chunk_xml(&config(10, 5), "<doc><?page 2?><p>text</p></doc>").unwrap();
        // doc, <doc>, PI, <p>, text
        assert_eq!(sink.chunks[0].node, 4);
    }

    #[test]
    fn whitespace_runs_are_not_nodes() {
        let sink = chunk_xml(
            &config(10, 5),
            "<doc>\n  <p>a</p>\n  <p>b</p>\n</doc>",
        )
        .unwrap();
        assert_eq!(sink.chunks[0].node, 3);
    }

    struct Miscounting;

    impl LazyTreeBuilder for Miscounting {
        fn start_document(&mut self) -> Result<()> {
            Ok(())
        }
        fn start_element(&mut self, _: &str, _: &[Attribute]) -> Result<()> {
            Ok(())
        }
        fn characters(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn processing_instruction(&mut self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        fn end_element(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn end_document(&mut self) -> Result<()> {
            Ok(())
        }
        fn node_count(&self) -> usize {
            0
        }
    }

    #[test]
    fn lazy_tree_desync_is_detected() {
        let config = config(10, 5);
        let mut sink = MemorySink::new();
        let mut lazy = Miscounting;
        let mut acc = ChunkAccumulator::new(&config, "k", 0, &mut sink)
            .with_lazy_tree(&mut lazy);
        let result = parse_document("<doc>x</doc>", |e| acc.handle(e));
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn unbalanced_end_is_malformed() {
        let config = config(10, 5);
        let mut sink = MemorySink::new();
        let mut acc = ChunkAccumulator::new(&config, "k", 0, &mut sink);
        acc.start_document().unwrap();
        acc.start_element("a", &[]).unwrap();
        assert!(matches!(acc.end_element("b"), Err(Error::Malformed(_))));
    }

    struct FullSink;

    impl IndexSink for FullSink {
        fn append_chunk(&mut self, _: ChunkRecord) -> Result<()> {
            Err(Error::Config("sink is full".into()))
        }
        fn append_summary(&mut self, _: DocumentSummaryRecord) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_errors_propagate() {
        let config = config(2, 1);
        let mut sink = FullSink;
        let mut acc = ChunkAccumulator::new(&config, "k", 0, &mut sink);
        let result =
            parse_document("<doc>one two three</doc>", |e| acc.handle(e));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    fn word_stream() -> impl Strategy<Value = (Vec<String>, usize, usize)> {
        (2usize..20).prop_flat_map(|size| {
            (
                proptest::collection::vec("[a-z]{1,8}", 1..200),
                Just(size),
                0..=size / 2,
            )
        })
    }

    proptest! {
        #[test]
        fn chunks_are_full_and_overlap_exactly(
            (input, size, overlap) in word_stream()
        ) {
            let xml = format!("<doc><p>{}</p></doc>", input.join(" "));
            let sink = chunk_xml(&config(size, overlap), &xml).unwrap();
            let chunks: Vec<Vec<String>> =
                sink.chunks.iter().map(|c| words(&c.text)).collect();

            prop_assert!(!chunks.is_empty());
            let (last, full) = chunks.split_last().unwrap();
            for chunk in full {
                prop_assert_eq!(chunk.len(), size);
            }
            prop_assert!(last.len() <= size);

            for pair in chunks.windows(2) {
                let tail = &pair[0][pair[0].len() - overlap..];
                prop_assert_eq!(tail, &pair[1][..overlap]);
            }

            let mut rebuilt = chunks[0].clone();
            for chunk in &chunks[1..] {
                rebuilt.extend_from_slice(&chunk[overlap..]);
            }
            prop_assert_eq!(rebuilt, input);
        }
    }

    /// Every word slot of a chunk, each bump expanded into that many
    /// virtual words.
    fn slots(text: &str) -> Vec<String> {
        let mut expanded = String::with_capacity(text.len());
        let mut parts = text.split(BUMP_MARKER);
        if let Some(head) = parts.next() {
            expanded.push_str(head);
        }
        while let (Some(count), Some(rest)) = (parts.next(), parts.next()) {
            let count: usize = count.parse().unwrap();
            for _ in 0..count {
                expanded.push(' ');
                expanded.push(VIRTUAL_WORD);
            }
            expanded.push(' ');
            expanded.push_str(rest);
        }
        Tokenizer::new(&expanded).map(|t| t.text.into_owned()).collect()
    }

    fn sentence_stream()
    -> impl Strategy<Value = (Vec<Vec<String>>, usize, usize, usize)> {
        let word = prop_oneof![
            3 => "[a-z]{1,8}",
            1 => "[a-z]{1,6}[.!?]",
        ];
        (2usize..12).prop_flat_map(move |size| {
            (
                proptest::collection::vec(
                    proptest::collection::vec(word.clone(), 1..30),
                    1..8,
                ),
                Just(size),
                0..=size / 2,
                0usize..8,
            )
        })
    }

    proptest! {
        #[test]
        fn virtual_words_fill_chunks_and_overlaps(
            (nodes, size, overlap, sentence_bump) in sentence_stream()
        ) {
            let config = IndexerConfig {
                sentence_bump,
                ..config(size, overlap)
            };
            let body: String = nodes
                .iter()
                .map(|words| format!("<p>{}</p>", words.join(" ")))
                .collect();
            let xml = format!("<doc>{body}</doc>");
            let sink = chunk_xml(&config, &xml).unwrap();
            let chunks: Vec<Vec<String>> =
                sink.chunks.iter().map(|c| slots(&c.text)).collect();

            prop_assert!(!chunks.is_empty());
            let (last, full) = chunks.split_last().unwrap();
            for chunk in full {
                prop_assert_eq!(chunk.len(), size);
            }
            prop_assert!(last.len() <= size);

            for pair in chunks.windows(2) {
                let tail = &pair[0][pair[0].len() - overlap..];
                prop_assert_eq!(tail, &pair[1][..overlap]);
            }

            let mut real: Vec<&str> = chunks[0].iter().map(String::as_str).collect();
            for chunk in &chunks[1..] {
                real.extend(chunk[overlap..].iter().map(String::as_str));
            }
            real.retain(|w| !is_virtual_word(w));
            let expected: Vec<&str> = nodes
                .iter()
                .flatten()
                .map(|w| w.trim_end_matches(['.', '!', '?']))
                .collect();
            prop_assert_eq!(real, expected);
        }
    }
}
