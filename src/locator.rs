//! Subtitle element location and text extraction.
//!
//! Lookup runs in two phases. The selector is first run against the whole
//! light DOM. Only when that finds nothing does a depth-first walk visit every
//! attached shadow tree (nested ones included) and run the same query scoped
//! to each, collecting matches from all of them.

use crate::dom::DocumentTree;
use crate::types::{ExtractionError, SubtitleSnapshot};
use tracing::{debug, trace, warn};

/// Maximum tree depth visited while searching shadow roots
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Elements found for a selector and their joined text
#[derive(Debug, Clone, PartialEq)]
pub struct Located<N> {
    pub text: String,
    pub elements: Vec<N>,
}

/// Find the elements matching `selector` and join their text.
pub fn locate<D: DocumentTree>(
    tree: &D,
    selector: &str,
) -> Result<Located<D::Node>, ExtractionError> {
    if selector.trim().is_empty() {
        return Err(ExtractionError::NoExpression);
    }

    let mut elements = tree
        .query_selector_all(tree.root(), selector)
        .map_err(|e| ExtractionError::InvalidSelector(e.to_string()))?;

    if elements.is_empty() {
        let mut search = ShadowSearch::new(tree, selector);
        search.visit(tree.root(), 0);
        trace!(
            "Shadow search for {} visited {} shadow root(s), {} failed",
            selector,
            search.shadow_roots,
            search.failures
        );
        elements = search.found;
    }

    if elements.is_empty() {
        return Err(ExtractionError::NoMatch {
            selector: selector.to_string(),
        });
    }

    let text = join_text(tree, &elements);
    if text.is_empty() {
        return Err(ExtractionError::EmptyText {
            count: elements.len(),
        });
    }

    debug!("Located {} element(s) for {}", elements.len(), selector);
    Ok(Located { text, elements })
}

/// Run [`locate`] and fold the outcome into a snapshot record
pub fn snapshot<D: DocumentTree>(tree: &D, selector: &str) -> SubtitleSnapshot {
    match locate(tree, selector) {
        Ok(located) => SubtitleSnapshot::success(located.text, located.elements.len()),
        Err(e) => SubtitleSnapshot::failure(e),
    }
}

fn join_text<D: DocumentTree>(tree: &D, elements: &[D::Node]) -> String {
    elements
        .iter()
        .map(|&el| tree.text_content(el))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Depth-first visitor that queries every shadow root it reaches.
///
/// A failed query inside one shadow tree is logged and skipped so the rest of
/// the search still runs.
struct ShadowSearch<'a, D: DocumentTree> {
    tree: &'a D,
    selector: &'a str,
    found: Vec<D::Node>,
    shadow_roots: usize,
    failures: usize,
}

impl<'a, D: DocumentTree> ShadowSearch<'a, D> {
    fn new(tree: &'a D, selector: &'a str) -> Self {
        Self {
            tree,
            selector,
            found: Vec::new(),
            shadow_roots: 0,
            failures: 0,
        }
    }

    fn visit(&mut self, node: D::Node, depth: usize) {
        if depth > MAX_TRAVERSAL_DEPTH {
            warn!("Shadow search depth limit reached at {:?}", node);
            return;
        }

        if let Some(shadow_root) = self.tree.shadow_root(node) {
            self.shadow_roots += 1;
            match self.tree.query_selector_all(shadow_root, self.selector) {
                Ok(matches) => self.found.extend(matches),
                Err(e) => {
                    self.failures += 1;
                    warn!("Shadow DOM query failed under {:?}: {}", node, e);
                }
            }
            self.visit(shadow_root, depth + 1);
        }

        for child in self.tree.children(node) {
            self.visit(child, depth + 1);
        }
    }
}
