//! Merge one or more coverage documents into a single [`CoverageTree`].
//!
//! Hierarchy nodes are merged by name path across documents: the first
//! document creates a node, later ones add their measurements into it.
//! Inside a single document a repeated name path replaces the earlier node.
//! Root-level `combined-coverage` figures replace the root value instead of
//! adding to it, since they are already whole-build numbers.
//!
//! Decoding does no I/O and no logging; data-quality problems are returned
//! as [`Diagnostic`]s for the caller to report.

use std::collections::HashSet;

use crate::error::{CovError, Result};
use crate::model::{CoverageDocument, DocumentEvent, MetricKind, Ratio};
use crate::parsers::vectorcast::VectorCastParser;
use crate::parsers::Parser;
use crate::tree::{CoverageTree, Level, NodeId};

/// A non-fatal problem found while decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Zero-based index of the document in the batch.
    pub document: usize,
    /// Name path of the node the element belonged to (empty for the root).
    pub path: Vec<String>,
    pub kind: MetricKind,
    pub message: String,
}

/// A decoded build report.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub tree: CoverageTree,
    pub diagnostics: Vec<Diagnostic>,
}

/// Incremental decoder. Documents are fed one at a time; a document that
/// fails to parse contributes nothing, while documents merged before it stay
/// in the tree.
pub struct Decoder {
    tree: CoverageTree,
    diagnostics: Vec<Diagnostic>,
    fed: usize,
    merged: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            tree: CoverageTree::new(),
            diagnostics: Vec::new(),
            fed: 0,
            merged: 0,
        }
    }

    /// Parse one document and merge it into the tree.
    pub fn feed(&mut self, input: &[u8]) -> Result<()> {
        let index = self.fed;
        self.fed += 1;
        let doc = VectorCastParser.parse(input)?;
        self.merge_document(index, &doc);
        self.merged += 1;
        Ok(())
    }

    /// Number of documents merged successfully so far.
    pub fn merged(&self) -> usize {
        self.merged
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Finish the batch: wire parent handles and hand out the tree.
    pub fn finish(mut self) -> Result<Decoded> {
        if self.fed == 0 {
            return Err(CovError::NoReportsFound);
        }
        self.tree.link_parents();
        Ok(Decoded {
            tree: self.tree,
            diagnostics: self.diagnostics,
        })
    }

    fn merge_document(&mut self, index: usize, doc: &CoverageDocument) {
        let root = self.tree.root();
        let mut stack: Vec<NodeId> = vec![root];
        // Nodes opened by this document; reopening one of them replaces it.
        let mut opened: HashSet<NodeId> = HashSet::new();

        for event in &doc.events {
            let current = *stack.last().unwrap_or(&root);
            match event {
                DocumentEvent::Enter { scope, name } => {
                    let id = match self.tree.child(current, name) {
                        Some(existing) if !opened.contains(&existing) => existing,
                        _ => self.tree.add_child(current, name, Level::from(*scope)),
                    };
                    opened.insert(id);
                    stack.push(id);
                }
                DocumentEvent::Leave => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                DocumentEvent::Coverage { kind, value } => {
                    self.check_consistency(index, &stack, *kind, value);
                    self.tree.ratio_mut(current, *kind).merge(*value);
                }
                DocumentEvent::Combined { kind, value } => {
                    self.check_consistency(index, &[root], *kind, value);
                    self.tree.ratio_mut(root, *kind).set(*value);
                }
                DocumentEvent::Malformed { kind, value } => {
                    let path = self.names(&stack);
                    self.diagnostics.push(Diagnostic {
                        document: index,
                        path,
                        kind: *kind,
                        message: CovError::MalformedValue {
                            kind: kind.type_attr().to_string(),
                            value: value.clone(),
                        }
                        .to_string(),
                    });
                }
            }
        }
    }

    fn check_consistency(&mut self, index: usize, stack: &[NodeId], kind: MetricKind, value: &Ratio) {
        if !value.is_consistent() {
            let path = self.names(stack);
            self.diagnostics.push(Diagnostic {
                document: index,
                path,
                kind,
                message: format!("{kind} coverage {value} covers more than it measures"),
            });
        }
    }

    fn names(&self, stack: &[NodeId]) -> Vec<String> {
        stack
            .iter()
            .skip(1)
            .map(|&id| self.tree.node(id).name().to_string())
            .collect()
    }
}

/// Decode a whole batch, stopping at the first document that fails.
pub fn decode<I, D>(documents: I) -> Result<Decoded>
where
    I: IntoIterator<Item = D>,
    D: AsRef<[u8]>,
{
    let mut decoder = Decoder::new();
    for doc in documents {
        decoder.feed(doc.as_ref())?;
    }
    decoder.finish()
}

/// Outcome of [`decode_partial`].
#[derive(Debug)]
pub struct PartialDecode {
    /// Documents merged before the first failure; `None` if none were.
    pub decoded: Option<Decoded>,
    /// The error that stopped the batch. Always set when `decoded` is `None`.
    pub error: Option<CovError>,
}

/// Decode a batch, keeping the documents merged before the first one that
/// fails.
pub fn decode_partial<I, D>(documents: I) -> PartialDecode
where
    I: IntoIterator<Item = D>,
    D: AsRef<[u8]>,
{
    let mut decoder = Decoder::new();
    let mut error = None;
    for doc in documents {
        if let Err(e) = decoder.feed(doc.as_ref()) {
            error = Some(e);
            break;
        }
    }
    if decoder.merged() == 0 {
        return PartialDecode {
            decoded: None,
            error: Some(error.unwrap_or(CovError::NoReportsFound)),
        };
    }
    match decoder.finish() {
        Ok(decoded) => PartialDecode {
            decoded: Some(decoded),
            error,
        },
        Err(e) => PartialDecode {
            decoded: None,
            error: Some(e),
        },
    }
}
