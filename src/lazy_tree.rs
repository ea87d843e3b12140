//! Random-access node table built alongside the chunk index.
//!
//! The accumulator forwards every parse event to a [`LazyTreeBuilder`]
//! before acting on it, and both sides number nodes the same way: the
//! document is node 0, then every element, flushed text run and processing
//! instruction takes the next number in document order. Chunk records
//! refer to nodes by that number.

use crate::{
    error::{Error, Result},
    xml_source::Attribute,
};

/// Receives parse events in lock-step with the chunk accumulator.
pub trait LazyTreeBuilder {
    fn start_document(&mut self) -> Result<()>;

    fn start_element(&mut self, name: &str, attributes: &[Attribute])
    -> Result<()>;

    /// One complete text run. Called once per run, never per fragment.
    fn characters(&mut self, text: &str) -> Result<()>;

    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<()>;

    fn end_element(&mut self, name: &str) -> Result<()>;

    fn end_document(&mut self) -> Result<()>;

    /// Nodes created so far, including the document node.
    fn node_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Document,
    Element {
        name: String,
        parent: usize,
        attributes: Vec<Attribute>,
    },
    Text {
        parent: usize,
        text: String,
    },
    ProcessingInstruction {
        parent: usize,
        target: String,
        data: String,
    },
}

impl Node {
    pub fn parent(&self) -> Option<usize> {
        match self {
            Self::Document => None,
            Self::Element { parent, .. }
            | Self::Text { parent, .. }
            | Self::ProcessingInstruction { parent, .. } => Some(*parent),
        }
    }
}

/// Flat, in-memory [`LazyTreeBuilder`].
#[derive(Debug, Default, Clone)]
pub struct NodeTable {
    nodes: Vec<Node>,
    open: Vec<usize>,
    finished: bool,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: usize) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// `true` once `end_document` has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Concatenated text of `node` and everything below it.
    pub fn text_of(&self, node: usize) -> String {
        let mut out = String::new();
        for (i, n) in self.nodes.iter().enumerate().skip(node) {
            if i != node && !self.is_descendant(i, node) {
                // Nodes are stored in document order, so the subtree is a
                // contiguous run.
                break;
            }
            if let Node::Text { text, .. } = n {
                out.push_str(text);
            }
        }
        out
    }

    fn is_descendant(&self, mut node: usize, ancestor: usize) -> bool {
        while let Some(parent) = self.nodes.get(node).and_then(Node::parent) {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    fn parent(&self) -> Result<usize> {
        self.open.last().copied().ok_or_else(|| {
            Error::Malformed("node outside the document".to_string())
        })
    }
}

impl LazyTreeBuilder for NodeTable {
    fn start_document(&mut self) -> Result<()> {
        self.nodes.clear();
        self.finished = false;
        self.nodes.push(Node::Document);
        self.open = vec![0];
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &str,
        attributes: &[Attribute],
    ) -> Result<()> {
        let parent = self.parent()?;
        self.open.push(self.nodes.len());
        self.nodes.push(Node::Element {
            name: name.to_string(),
            parent,
            attributes: attributes.to_vec(),
        });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        let parent = self.parent()?;
        self.nodes.push(Node::Text {
            parent,
            text: text.to_string(),
        });
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
    ) -> Result<()> {
        let parent = self.parent()?;
        self.nodes.push(Node::ProcessingInstruction {
            parent,
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<()> {
        if self.open.len() < 2 {
            return Err(Error::Malformed(format!(
                "</{name}> without an open element"
            )));
        }
        let idx = self.open.pop().unwrap_or_default();
        match &self.nodes[idx] {
            Node::Element { name: open, .. } if open == name => Ok(()),
            Node::Element { name: open, .. } => Err(Error::Malformed(format!(
                "</{name}> closes <{open}>"
            ))),
            _ => Err(Error::Malformed(format!("</{name}> closes a non-element"))),
        }
    }

    fn end_document(&mut self) -> Result<()> {
        if self.open.len() != 1 {
            return Err(Error::Malformed(
                "document ended with open elements".to_string(),
            ));
        }
        self.open.clear();
        self.finished = true;
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
