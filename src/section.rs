//! Nested section attributes.
//!
//! Every element that isn't part of a meta-data field pushes a frame when it
//! starts and pops one when it ends. Runs of nested elements that resolve to
//! identical attributes share a single frame whose `depth` counts the
//! repeats, so a deep but uniform document keeps the stack short.

use crate::config::IndexerConfig;

/// Whether text inside a section is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFlag {
    Index,
    NoIndex,
}

/// Whether words inside a section may feed the spelling dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellFlag {
    Spell,
    NoSpell,
}

/// One entry on the [`SectionStack`].
#[derive(Debug, Clone, PartialEq)]
pub struct SectionFrame {
    pub section_type: String,
    pub index: IndexFlag,
    pub spell: SpellFlag,
    /// Virtual words still owed to the next text in this section.
    pub section_bump: usize,
    prev_section_bump: usize,
    pub word_boost: f32,
    pub sentence_bump: usize,
    /// Number of identical pushes folded into this frame beyond the first.
    pub depth: usize,
    pub sub_document: Option<String>,
}

impl SectionFrame {
    fn defaults(sentence_bump: usize, word_boost: f32) -> Self {
        Self {
            section_type: String::new(),
            index: IndexFlag::Index,
            spell: SpellFlag::Spell,
            section_bump: 0,
            prev_section_bump: 0,
            word_boost,
            sentence_bump,
            depth: 0,
            sub_document: None,
        }
    }

    fn save_section_bump(&mut self) -> usize {
        self.prev_section_bump = self.section_bump;
        self.section_bump = 0;
        self.prev_section_bump
    }

    fn restore_section_bump(&mut self) {
        self.section_bump = self.prev_section_bump;
    }
}

/// Attributes requested for a new section, before inheritance.
///
/// `None` (or an empty `section_type`) means "same as the enclosing
/// section".
#[derive(Debug, Clone, PartialEq)]
pub struct SectionAttrs {
    pub index: Option<IndexFlag>,
    pub section_type: String,
    pub section_bump: usize,
    pub word_boost: f32,
    pub sentence_bump: usize,
    pub spell: Option<SpellFlag>,
    pub sub_document: Option<String>,
}

/// Stack of [`SectionFrame`]s with repeat compaction.
#[derive(Debug, Clone)]
pub struct SectionStack {
    frames: Vec<SectionFrame>,
    defaults: SectionFrame,
}

impl SectionStack {
    pub fn new(sentence_bump: usize, word_boost: f32) -> Self {
        Self {
            frames: Vec::new(),
            defaults: SectionFrame::defaults(sentence_bump, word_boost),
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        Self::new(config.sentence_bump, config.word_boost)
    }

    /// Push the document-level frame, or deepen the current one.
    pub fn push_default(&mut self) {
        match self.frames.last_mut() {
            Some(top) => top.depth += 1,
            None => self.frames.push(self.defaults.clone()),
        }
    }

    /// Push a section, resolving inherited values against the current top.
    pub fn push(&mut self, attrs: SectionAttrs) {
        let SectionAttrs {
            index,
            mut section_type,
            section_bump,
            word_boost,
            sentence_bump,
            spell,
            sub_document,
        } = attrs;

        let mut carried_bump = 0;
        let (index, spell, sub_document) = match self.frames.last_mut() {
            Some(top) => {
                let index = index.unwrap_or(top.index);
                let spell = spell.unwrap_or(top.spell);
                let sub_document = sub_document.or_else(|| top.sub_document.clone());
                if section_type.is_empty() {
                    section_type.clone_from(&top.section_type);
                }

                // An explicit bump always makes a new frame so that nested
                // bumps with no text between them add up.
                let unchanged = section_bump == 0
                    && index == top.index
                    && spell == top.spell
                    && section_type == top.section_type
                    && word_boost == top.word_boost
                    && sentence_bump == top.sentence_bump
                    && sub_document == top.sub_document;
                if unchanged {
                    top.depth += 1;
                    return;
                }

                carried_bump = top.save_section_bump();
                (index, spell, sub_document)
            }
            None => (
                index.unwrap_or(self.defaults.index),
                spell.unwrap_or(self.defaults.spell),
                sub_document,
            ),
        };

        self.frames.push(SectionFrame {
            section_type,
            index,
            spell,
            section_bump: carried_bump + section_bump,
            prev_section_bump: 0,
            word_boost,
            sentence_bump,
            depth: 0,
            sub_document,
        });
    }

    /// Undo one push. Returns `false` if the stack was already empty.
    ///
    /// When a frame is removed with its bump still unused, the enclosing
    /// frame gets back the bump it handed over when the frame was pushed.
    pub fn pop(&mut self) -> bool {
        let Some(top) = self.frames.last_mut() else {
            return false;
        };
        if top.depth > 0 {
            top.depth -= 1;
            return true;
        }

        let unused_bump = top.section_bump != 0;
        self.frames.pop();
        if unused_bump && let Some(top) = self.frames.last_mut() {
            top.restore_section_bump();
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of distinct frames, ignoring folded repeats.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&SectionFrame> {
        self.frames.last()
    }

    /// A copy of the current top, or the defaults when empty.
    pub fn snapshot(&self) -> SectionFrame {
        self.top().unwrap_or(&self.defaults).clone()
    }

    fn current(&self) -> &SectionFrame {
        self.top().unwrap_or(&self.defaults)
    }

    /// Repeat depth of the top frame, `None` when empty.
    pub fn depth(&self) -> Option<usize> {
        self.top().map(|f| f.depth)
    }

    pub fn section_type(&self) -> &str {
        &self.current().section_type
    }

    pub fn index_flag(&self) -> IndexFlag {
        self.current().index
    }

    pub fn spell_flag(&self) -> SpellFlag {
        self.current().spell
    }

    pub fn section_bump(&self) -> usize {
        self.current().section_bump
    }

    pub fn word_boost(&self) -> f32 {
        self.current().word_boost
    }

    pub fn sentence_bump(&self) -> usize {
        self.current().sentence_bump
    }

    pub fn sub_document(&self) -> Option<&str> {
        self.current().sub_document.as_deref()
    }

    /// Take the pending section bump so it's applied only once.
    pub fn use_section_bump(&mut self) -> usize {
        match self.frames.last_mut() {
            Some(top) => std::mem::take(&mut top.section_bump),
            None => 0,
        }
    }
}
