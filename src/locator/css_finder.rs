//! Minimal CSS selector search
//!
//! The `css` strategy asks a [`CssMinimizer`] for a short selector that picks out
//! exactly one element. [`PathFinder`] tries the element's own signals first and
//! then climbs the ancestor chain, anchoring on the nearest ancestor signal it can.

use crate::dom::css::{is_plain_ident, quote_attr_value};
use crate::dom::{Document, NodeId};
use crate::error::{InspectorError, Result};
use crate::utils::InspectorConfig;

/// Search-space limits for a minimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinderOptions {
    /// Maximum ancestor levels to climb
    pub threshold: usize,
    /// Maximum selectors to test before giving up
    pub max_number_of_tries: usize,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            threshold: 1000,
            max_number_of_tries: 10000,
        }
    }
}

impl From<&InspectorConfig> for FinderOptions {
    fn from(config: &InspectorConfig) -> Self {
        Self {
            threshold: config.finder_threshold,
            max_number_of_tries: config.finder_max_tries,
        }
    }
}

/// Produces a CSS selector that matches only the given element
pub trait CssMinimizer: Send + Sync {
    fn minimal_css(&self, doc: &Document, node: NodeId, options: &FinderOptions) -> Result<String>;
}

/// Bounded bottom-up selector search
#[derive(Debug, Default, Clone, Copy)]
pub struct PathFinder;

impl PathFinder {
    /// Candidate selectors for one element, most specific signal first
    fn segments(doc: &Document, node: NodeId) -> Vec<String> {
        let Some(tag) = doc.tag_name(node) else {
            return Vec::new();
        };
        let mut out = Vec::new();

        if let Some(id) = doc.attribute(node, "id").filter(|v| is_plain_ident(v)) {
            out.push(format!("#{}", id));
        }
        if let Some(name) = doc.attribute(node, "name").filter(|v| !v.is_empty()) {
            out.push(format!("{}[name={}]", tag, quote_attr_value(name)));
        }
        let classes: Vec<&str> = doc
            .classes(node)
            .into_iter()
            .filter(|c| is_plain_ident(c))
            .take(2)
            .collect();
        if let Some(first) = classes.first() {
            out.push(format!("{}.{}", tag, first));
        }
        if classes.len() > 1 {
            out.push(format!("{}.{}", tag, classes.join(".")));
        }
        out.push(tag.to_string());
        out.push(Self::nth_child(doc, node, tag));
        out
    }

    fn nth_child(doc: &Document, node: NodeId, tag: &str) -> String {
        format!("{}:nth-child({})", tag, doc.sibling_index(node))
    }

    fn is_unique(doc: &Document, node: NodeId, selector: &str) -> bool {
        match doc.query_selector_all(selector) {
            Ok(found) => found.len() == 1 && found[0] == node,
            Err(e) => {
                log::debug!("finder skipped '{}': {}", selector, e);
                false
            }
        }
    }
}

impl CssMinimizer for PathFinder {
    fn minimal_css(&self, doc: &Document, node: NodeId, options: &FinderOptions) -> Result<String> {
        if !doc.is_element(node) {
            return Err(InspectorError::NotAnElement(node.index()));
        }

        let mut tail: Vec<String> = Vec::new();
        let mut current = node;
        let mut tries = 0;

        for _level in 0..=options.threshold {
            for segment in Self::segments(doc, current) {
                tries += 1;
                if tries > options.max_number_of_tries {
                    return Err(InspectorError::NoSelectors(format!(
                        "{} (gave up after {} tries)",
                        doc.describe(node),
                        options.max_number_of_tries
                    )));
                }
                let mut parts = vec![segment];
                parts.extend(tail.iter().cloned());
                let selector = parts.join(" > ");
                if Self::is_unique(doc, node, &selector) {
                    return Ok(selector);
                }
            }

            let tag = doc.tag_name(current).unwrap_or("*");
            tail.insert(0, Self::nth_child(doc, current, tag));
            match doc.parent_element(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(InspectorError::NoSelectors(doc.describe(node)))
    }
}
