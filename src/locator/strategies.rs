//! Locator strategies
//!
//! Thirteen independent strategies each try to derive selectors for one element
//! from a single signal (id, name, link text, attributes, position...). Every
//! candidate is checked against the document before it is kept: the first node it
//! resolves to must be the element itself. A strategy that errors only loses its
//! own candidates.
//!
//! Priority order: id > link > name > css > css:attributes > xpath:link-text >
//! xpath:image > xpath:attributes > xpath:relative-id > xpath:href >
//! xpath:position > xpath:inner-text > xpath:input-label

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use super::css_finder::{CssMinimizer, FinderOptions, PathFinder};
use super::screenshot::{Screenshot, ScreenshotCapture};
use crate::dom::css::quote_attr_value;
use crate::dom::xpath::{normalize_space, xpath_literal};
use crate::dom::{Document, NodeId, Page, HIGHLIGHT_ATTR};
use crate::error::{InspectorError, Result};
use crate::utils::InspectorConfig;

/// Patterns that indicate auto-generated attribute values (less stable)
static AUTO_GENERATED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}").unwrap(), // UUID pattern
        Regex::new(r"_\d{10,}").unwrap(),                // Timestamp suffix
        Regex::new(r"[A-Za-z]+\d{5,}").unwrap(),         // Random number suffix
        Regex::new(r"^(ember|react-|:r)").unwrap(),      // Framework generated prefix
    ]
});

fn looks_generated(value: &str) -> bool {
    AUTO_GENERATED_PATTERNS.iter().any(|re| re.is_match(value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "link")]
    Link,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "css")]
    Css,
    #[serde(rename = "css:attributes")]
    CssAttributes,
    #[serde(rename = "xpath:link-text")]
    XPathLinkText,
    #[serde(rename = "xpath:image")]
    XPathImage,
    #[serde(rename = "xpath:attributes")]
    XPathAttributes,
    #[serde(rename = "xpath:relative-id")]
    XPathRelativeId,
    #[serde(rename = "xpath:href")]
    XPathHref,
    #[serde(rename = "xpath:position")]
    XPathPosition,
    #[serde(rename = "xpath:inner-text")]
    XPathInnerText,
    #[serde(rename = "xpath:input-label")]
    XPathInputLabel,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Id => "id",
            StrategyKind::Link => "link",
            StrategyKind::Name => "name",
            StrategyKind::Css => "css",
            StrategyKind::CssAttributes => "css:attributes",
            StrategyKind::XPathLinkText => "xpath:link-text",
            StrategyKind::XPathImage => "xpath:image",
            StrategyKind::XPathAttributes => "xpath:attributes",
            StrategyKind::XPathRelativeId => "xpath:relative-id",
            StrategyKind::XPathHref => "xpath:href",
            StrategyKind::XPathPosition => "xpath:position",
            StrategyKind::XPathInnerText => "xpath:inner-text",
            StrategyKind::XPathInputLabel => "xpath:input-label",
        }
    }

    pub fn is_xpath(self) -> bool {
        self.as_str().starts_with("xpath:")
    }

    pub fn is_css(self) -> bool {
        matches!(self, StrategyKind::Css | StrategyKind::CssAttributes)
    }

    /// Strategies whose values share a syntax; duplicates are dropped within one
    fn family(self) -> &'static str {
        if self.is_xpath() {
            "xpath"
        } else if self.is_css() {
            "css"
        } else {
            self.as_str()
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selector produced by one strategy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub strategy: StrategyKind,
    pub value: String,
}

impl SelectorCandidate {
    pub fn new(strategy: StrategyKind, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    /// Nodes this selector finds, in document order
    pub fn resolve(&self, doc: &Document) -> Result<Vec<NodeId>> {
        match self.strategy {
            StrategyKind::Id => Ok(doc.get_element_by_id(&self.value).into_iter().collect()),
            StrategyKind::Link => Ok(doc
                .all_elements()
                .into_iter()
                .filter(|n| {
                    doc.tag_name(*n) == Some("a") && link_text(doc, *n) == self.value
                })
                .collect()),
            StrategyKind::Name => {
                doc.query_selector_all(&format!("[name={}]", quote_attr_value(&self.value)))
            }
            StrategyKind::Css | StrategyKind::CssAttributes => doc.query_selector_all(&self.value),
            _ => doc.evaluate_xpath(&self.value),
        }
    }

    /// Short representation for terminal output
    pub fn short_repr(&self) -> String {
        match self.strategy {
            StrategyKind::Id => format!("id=\"{}\"", self.value),
            StrategyKind::Link => format!("link=\"{}\"", self.value),
            StrategyKind::Name => format!("name=\"{}\"", self.value),
            StrategyKind::Css | StrategyKind::CssAttributes => format!("css={}", self.value),
            _ => format!("xpath={}", self.value),
        }
    }
}

/// A candidate as handed to the host, with the nominal match count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternative {
    #[serde(flatten)]
    pub candidate: SelectorCandidate,
    pub matches: u32,
}

impl From<SelectorCandidate> for Alternative {
    fn from(candidate: SelectorCandidate) -> Self {
        Self {
            candidate,
            matches: 1,
        }
    }
}

/// Everything needed to find one element again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locator {
    pub source: String,
    pub element_tag: String,
    pub alternatives: Vec<Alternative>,
    pub screenshot: Screenshot,
}

type StrategyFn = fn(&StrategyBuilder, &Document, NodeId) -> Result<Vec<String>>;

/// Strategies in priority order
const STRATEGIES: [(StrategyKind, StrategyFn); 13] = [
    (StrategyKind::Id, StrategyBuilder::build_id),
    (StrategyKind::Link, StrategyBuilder::build_link),
    (StrategyKind::Name, StrategyBuilder::build_name),
    (StrategyKind::Css, StrategyBuilder::build_css),
    (StrategyKind::CssAttributes, StrategyBuilder::build_css_attributes),
    (StrategyKind::XPathLinkText, StrategyBuilder::build_xpath_link),
    (StrategyKind::XPathImage, StrategyBuilder::build_xpath_image),
    (StrategyKind::XPathAttributes, StrategyBuilder::build_xpath_attributes),
    (StrategyKind::XPathRelativeId, StrategyBuilder::build_xpath_relative_id),
    (StrategyKind::XPathHref, StrategyBuilder::build_xpath_href),
    (StrategyKind::XPathPosition, StrategyBuilder::build_xpath_position),
    (StrategyKind::XPathInnerText, StrategyBuilder::build_xpath_inner_text),
    (StrategyKind::XPathInputLabel, StrategyBuilder::build_xpath_input_label),
];

/// Normalised visible text of a link
fn link_text(doc: &Document, node: NodeId) -> String {
    normalize_space(&doc.text_content(node))
}

/// Rewrite `expr` so it selects only `node`
///
/// Returns `None` when `expr` does not select `node` at all.
pub fn get_unique_xpath(doc: &Document, node: NodeId, expr: &str) -> Result<Option<String>> {
    let found = doc.evaluate_xpath(expr)?;
    let Some(index) = found.iter().position(|n| *n == node) else {
        return Ok(None);
    };
    if found.len() == 1 {
        Ok(Some(expr.to_string()))
    } else {
        Ok(Some(format!("({})[{}]", expr, index + 1)))
    }
}

fn unique(doc: &Document, node: NodeId, expr: &str) -> Result<Vec<String>> {
    Ok(get_unique_xpath(doc, node, expr)?.into_iter().collect())
}

/// `tag` or `tag[k]` when the parent has several children with this tag
fn position_segment(doc: &Document, node: NodeId) -> String {
    let tag = doc.tag_name(node).unwrap_or("*");
    let (index, count) = doc.same_tag_position(node);
    if count > 1 {
        format!("{}[{}]", tag, index)
    } else {
        tag.to_string()
    }
}

fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn walk(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            walk(i + 1, n, k, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    walk(0, n, k, &mut Vec::new(), &mut out);
    out
}

fn attribute_predicate(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("@{}={}", k, xpath_literal(v)))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Runs the locator strategies for an element
#[derive(Clone)]
pub struct StrategyBuilder {
    minimizer: Arc<dyn CssMinimizer>,
    finder_options: FinderOptions,
    data_attributes: Vec<String>,
    preferred_attributes: Vec<String>,
    inner_text_max_length: usize,
}

impl Default for StrategyBuilder {
    fn default() -> Self {
        Self::new(&InspectorConfig::default())
    }
}

impl StrategyBuilder {
    pub fn new(config: &InspectorConfig) -> Self {
        Self {
            minimizer: Arc::new(PathFinder),
            finder_options: FinderOptions::from(config),
            data_attributes: config.data_attributes.clone(),
            preferred_attributes: config.preferred_attributes.clone(),
            inner_text_max_length: config.inner_text_max_length,
        }
    }

    pub fn with_minimizer(mut self, minimizer: Arc<dyn CssMinimizer>) -> Self {
        self.minimizer = minimizer;
        self
    }

    /// Run every strategy and keep the candidates that resolve to `node`
    pub fn build_strategies(&self, doc: &Document, node: NodeId) -> Vec<SelectorCandidate> {
        if !doc.is_element(node) {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        STRATEGIES
            .iter()
            .flat_map(|(kind, build)| match build(self, doc, node) {
                Ok(values) => values
                    .into_iter()
                    .map(|value| SelectorCandidate::new(*kind, value))
                    .collect(),
                Err(e) => {
                    log::debug!("[{}] strategy failed for {}: {}", kind, doc.describe(node), e);
                    Vec::new()
                }
            })
            .filter(|candidate| Self::validate(doc, node, candidate))
            .filter(|candidate| {
                seen.insert((candidate.strategy.family(), candidate.value.clone()))
            })
            .collect()
    }

    fn validate(doc: &Document, node: NodeId, candidate: &SelectorCandidate) -> bool {
        match candidate.resolve(doc) {
            Ok(found) if found.first() == Some(&node) => {
                log::debug!("[{}] {} PASSED", candidate.strategy, candidate.value);
                true
            }
            Ok(found) => {
                log::debug!(
                    "[{}] {} FAILED ({} matches, first is not the element)",
                    candidate.strategy,
                    candidate.value,
                    found.len()
                );
                false
            }
            Err(e) => {
                log::debug!("[{}] {} FAILED: {}", candidate.strategy, candidate.value, e);
                false
            }
        }
    }

    /// Build a full locator for `node`, including a screenshot
    pub async fn build_locator(
        &self,
        page: &Page,
        node: NodeId,
        capture: &dyn ScreenshotCapture,
    ) -> Result<Locator> {
        let (element_tag, candidates) = {
            let doc = page.read();
            let tag = doc
                .tag_name(node)
                .ok_or(InspectorError::NotAnElement(node.index()))?
                .to_ascii_uppercase();
            (tag, self.build_strategies(&doc, node))
        };

        let screenshot = capture
            .capture(page, node)
            .await
            .map_err(InspectorError::Screenshot)?;

        Ok(Locator {
            source: page.url().to_string(),
            element_tag,
            alternatives: candidates.into_iter().map(Alternative::from).collect(),
            screenshot,
        })
    }

    // ---- strategies ----

    fn build_id(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        Ok(doc
            .attribute(node, "id")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .into_iter()
            .collect())
    }

    fn build_link(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        if doc.tag_name(node) != Some("a") {
            return Ok(Vec::new());
        }
        let text = link_text(doc, node);
        Ok(if text.is_empty() { Vec::new() } else { vec![text] })
    }

    fn build_name(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        Ok(doc
            .attribute(node, "name")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .into_iter()
            .collect())
    }

    fn build_css(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        Ok(vec![self
            .minimizer
            .minimal_css(doc, node, &self.finder_options)?])
    }

    fn build_css_attributes(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        let tag = doc.tag_name(node).unwrap_or("*");
        let mut found: Vec<(bool, String)> = self
            .data_attributes
            .iter()
            .filter_map(|attr| {
                let value = doc.attribute(node, attr).filter(|v| !v.is_empty())?;
                Some((
                    looks_generated(value),
                    format!("{}[{}={}]", tag, attr, quote_attr_value(value)),
                ))
            })
            .collect();
        // Stable values first; sort is stable so configured order holds otherwise
        found.sort_by_key(|(generated, _)| *generated);
        Ok(found.into_iter().map(|(_, selector)| selector).collect())
    }

    fn build_xpath_link(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        if doc.tag_name(node) != Some("a") {
            return Ok(Vec::new());
        }
        let Some(text) = doc
            .children(node)
            .iter()
            .find_map(|c| doc.text(*c))
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return Ok(Vec::new());
        };
        unique(
            doc,
            node,
            &format!("//a[contains(text(),{})]", xpath_literal(text)),
        )
    }

    fn build_xpath_image(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        if doc.tag_name(node) != Some("img") {
            return Ok(Vec::new());
        }
        let non_empty = |attr: &str| doc.attribute(node, attr).filter(|v| !v.is_empty());
        let expr = if let Some(alt) = non_empty("alt") {
            format!("//img[@alt={}]", xpath_literal(alt))
        } else if let Some(title) = non_empty("title") {
            format!("//img[@title={}]", xpath_literal(title))
        } else if let Some(src) = non_empty("src") {
            format!("//img[contains(@src,{})]", xpath_literal(src))
        } else {
            return Ok(Vec::new());
        };
        unique(doc, node, &expr)
    }

    fn build_xpath_attributes(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        let tag = doc.tag_name(node).unwrap_or("*");
        let preferred: Vec<(&str, &str)> = self
            .preferred_attributes
            .iter()
            .filter_map(|attr| {
                doc.attribute(node, attr)
                    .filter(|v| !v.is_empty())
                    .map(|v| (attr.as_str(), v))
            })
            .collect();

        // Smallest combination of preferred attributes that is unique
        for size in 1..=preferred.len() {
            for combo in combinations(preferred.len(), size) {
                let pairs: Vec<(&str, &str)> = combo.iter().map(|i| preferred[*i]).collect();
                let expr = format!("//{}[{}]", tag, attribute_predicate(&pairs));
                if doc.evaluate_xpath(&expr)? == [node] {
                    return Ok(vec![expr]);
                }
            }
        }

        let all: Vec<(&str, &str)> = doc
            .attributes(node)
            .iter()
            .filter(|(k, _)| k != "style" && k != HIGHLIGHT_ATTR)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if all.is_empty() {
            return Ok(Vec::new());
        }
        unique(doc, node, &format!("//{}[{}]", tag, attribute_predicate(&all)))
    }

    fn build_xpath_relative_id(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        let mut below = vec![node];
        for ancestor in doc.ancestors(node) {
            if let Some(id) = doc.attribute(ancestor, "id").filter(|v| !v.is_empty()) {
                let anchor_tag = doc.tag_name(ancestor).unwrap_or("*");
                let steps: Vec<String> = below
                    .iter()
                    .rev()
                    .map(|n| position_segment(doc, *n))
                    .collect();
                let expr = format!(
                    "//{}[@id={}]/{}",
                    anchor_tag,
                    xpath_literal(id),
                    steps.join("/")
                );
                return unique(doc, node, &expr);
            }
            below.push(ancestor);
        }
        Ok(Vec::new())
    }

    fn build_xpath_href(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        if doc.tag_name(node) != Some("a") {
            return Ok(Vec::new());
        }
        let Some(href) = doc.attribute(node, "href").filter(|v| !v.is_empty()) else {
            return Ok(Vec::new());
        };
        unique(
            doc,
            node,
            &format!("//a[contains(@href,{})]", xpath_literal(href)),
        )
    }

    fn build_xpath_position(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        let mut chain = vec![node];
        chain.extend(doc.ancestors(node));
        let segments: Vec<String> = chain.iter().map(|n| position_segment(doc, *n)).collect();

        // Shortest unique suffix of the positional path
        for len in 1..=segments.len() {
            let suffix: Vec<&str> = segments[..len].iter().rev().map(String::as_str).collect();
            let expr = format!("//{}", suffix.join("/"));
            if doc.evaluate_xpath(&expr)? == [node] {
                return Ok(vec![expr]);
            }
        }

        let absolute: Vec<&str> = segments.iter().rev().map(String::as_str).collect();
        unique(doc, node, &format!("/{}", absolute.join("/")))
    }

    fn build_xpath_inner_text(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        let tag = doc.tag_name(node).unwrap_or("*");
        let raw = doc.text_content(node);
        let text = normalize_space(&raw);
        if text.is_empty() || text.chars().count() > self.inner_text_max_length {
            return Ok(Vec::new());
        }
        let expr = if raw.contains(&text) {
            format!("//{}[contains(.,{})]", tag, xpath_literal(&text))
        } else {
            format!("//{}[contains(normalize-space(.),{})]", tag, xpath_literal(&text))
        };
        unique(doc, node, &expr)
    }

    fn build_xpath_input_label(&self, doc: &Document, node: NodeId) -> Result<Vec<String>> {
        let tag = match doc.tag_name(node) {
            Some(tag @ ("input" | "select" | "textarea")) => tag,
            _ => return Ok(Vec::new()),
        };

        if let Some(id) = doc.attribute(node, "id").filter(|v| !v.is_empty()) {
            let label = doc.all_elements().into_iter().find(|n| {
                doc.tag_name(*n) == Some("label") && doc.attribute(*n, "for") == Some(id)
            });
            if let Some(label) = label {
                let text = normalize_space(&doc.text_content(label));
                if !text.is_empty() {
                    let expr = format!(
                        "//{}[@id=//label[normalize-space(.)={}]/@for]",
                        tag,
                        xpath_literal(&text)
                    );
                    return unique(doc, node, &expr);
                }
            }
        }

        let wrapping = doc
            .ancestors(node)
            .into_iter()
            .find(|n| doc.tag_name(*n) == Some("label"));
        if let Some(label) = wrapping {
            let text = normalize_space(&doc.text_content(label));
            if !text.is_empty() {
                let expr = format!(
                    "//label[normalize-space(.)={}]//{}",
                    xpath_literal(&text),
                    tag
                );
                return unique(doc, node, &expr);
            }
        }
        Ok(Vec::new())
    }
}
