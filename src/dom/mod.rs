//! In-memory page document
//!
//! The locator strategies and the recorder never talk to a browser directly. They
//! read and mutate this arena tree, which hosts populate from markup and keep in sync
//! with the live page (form values, checked state, injected overlay elements).

pub mod css;
pub mod events;
pub mod markup;
pub mod page;
pub mod xpath;

pub use events::{DomEvent, EventKind, EventOutcome};
pub use page::Page;

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{InspectorError, Result};

/// Marker attribute set on the element currently highlighted by the overlay
pub const HIGHLIGHT_ATTR: &str = "data-inspector-highlight";

/// Handle to a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Element payload: tag, ordered attributes and live form state
#[derive(Debug, Clone)]
pub struct Element {
    tag_name: String,
    attributes: Vec<(String, String)>,
    /// Value typed by the user; `None` until the control is edited
    value: Option<String>,
    /// Checkedness after user interaction; `None` falls back to the attribute
    checked: Option<bool>,
    /// Option selectedness after user interaction
    selected: Option<bool>,
}

impl Element {
    fn new(tag_name: &str, attributes: Vec<(String, String)>) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            value: None,
            checked: None,
            selected: None,
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Arena-backed document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    click_handlers: HashSet<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            root: NodeId(0),
            click_handlers: HashSet::new(),
        }
    }

    /// Parse well-formed markup into a new document
    pub fn parse(markup: &str) -> Result<Self> {
        markup::parse_document(markup)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    // ---- construction ----

    /// Create a detached element
    pub fn create_element(&mut self, tag_name: &str, attributes: Vec<(String, String)>) -> NodeId {
        self.push_node(NodeData::Element(Element::new(tag_name, attributes)))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Append `child` as the last child of `parent`, detaching it first if needed
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Remove a node (and its subtree) from the tree
    pub fn remove_node(&mut self, id: NodeId) {
        self.detach(id);
        self.click_handlers.remove(&id);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    // ---- structure ----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Parent if it is an element (the document node is excluded)
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| self.is_element(*p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Element ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.parent_element(id);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.parent_element(current);
        }
        out
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Descendants of `id` in document order (excluding `id`)
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// All connected elements in document order
    pub fn all_elements(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|n| self.is_element(*n))
            .collect()
    }

    /// Position of every connected node in document order
    pub fn document_order(&self) -> HashMap<NodeId, usize> {
        let mut order = HashMap::new();
        order.insert(self.root, 0);
        for (i, node) in self.descendants(self.root).into_iter().enumerate() {
            order.insert(node, i + 1);
        }
        order
    }

    pub fn body(&self) -> Option<NodeId> {
        self.all_elements()
            .into_iter()
            .find(|n| self.tag_name(*n) == Some("body"))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.all_elements()
            .into_iter()
            .find(|n| self.tag_name(*n) == Some("head"))
    }

    /// 1-based position among element siblings
    pub fn sibling_index(&self, id: NodeId) -> usize {
        match self.parent(id) {
            Some(parent) => self
                .element_children(parent)
                .iter()
                .position(|c| *c == id)
                .map(|p| p + 1)
                .unwrap_or(1),
            None => 1,
        }
    }

    /// 1-based position among siblings with the same tag, and how many there are
    pub fn same_tag_position(&self, id: NodeId) -> (usize, usize) {
        let (Some(parent), Some(tag)) = (self.parent(id), self.tag_name(id)) else {
            return (1, 1);
        };
        let same: Vec<NodeId> = self
            .element_children(parent)
            .into_iter()
            .filter(|c| self.tag_name(*c) == Some(tag))
            .collect();
        let index = same.iter().position(|c| *c == id).map(|p| p + 1).unwrap_or(1);
        (index, same.len())
    }

    // ---- element access ----

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Element(_))
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id).data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(element) => Ok(element),
            _ => Err(InspectorError::NotAnElement(id.0)),
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag_name())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.element(id).map(|e| e.attributes()).unwrap_or(&[])
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let element = self.element_mut(id)?;
        let name = name.to_ascii_lowercase();
        match element.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => element.attributes.push((name, value.to_string())),
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        let element = self.element_mut(id)?;
        element.attributes.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        Ok(())
    }

    /// Class list split on whitespace
    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attribute(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    // ---- text ----

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.node(id).data {
            NodeData::Text(text) => text.clone(),
            _ => {
                let mut out = String::new();
                for child in self.children(id) {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
        }
    }

    /// Text of the direct text-node children only, trimmed and space-joined
    pub fn own_text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|c| self.text(*c))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ---- lookup ----

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.all_elements()
            .into_iter()
            .find(|n| self.attribute(*n, "id") == Some(id))
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let groups = css::parse(selector)?;
        Ok(self
            .all_elements()
            .into_iter()
            .filter(|n| css::matches_any(self, *n, &groups))
            .collect())
    }

    /// Evaluate an XPath expression against the document node
    pub fn evaluate_xpath(&self, expr: &str) -> Result<Vec<NodeId>> {
        xpath::evaluate(self, expr)
    }

    // ---- form state ----

    /// Lowercased `type` of an `<input>`, defaulting to `text`
    pub fn input_type(&self, id: NodeId) -> Option<String> {
        if self.tag_name(id)? != "input" {
            return None;
        }
        Some(
            self.attribute(id, "type")
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".to_string()),
        )
    }

    /// Current value of a form control
    pub fn value(&self, id: NodeId) -> Option<String> {
        let element = self.element(id)?;
        if let Some(value) = &element.value {
            return Some(value.clone());
        }
        match element.tag_name() {
            "input" => {
                let default = match self.input_type(id).as_deref() {
                    Some("checkbox") | Some("radio") => "on",
                    _ => "",
                };
                Some(element.attribute("value").unwrap_or(default).to_string())
            }
            "textarea" => Some(self.text_content(id)),
            "select" => self.selected_value(id),
            "option" => Some(self.option_value(id)),
            "button" => Some(element.attribute("value").unwrap_or_default().to_string()),
            _ => None,
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<()> {
        if self.tag_name(id) == Some("select") {
            return self.select_option(id, value);
        }
        self.element_mut(id)?.value = Some(value.to_string());
        Ok(())
    }

    pub fn checked(&self, id: NodeId) -> bool {
        self.element(id)
            .map(|e| e.checked.unwrap_or_else(|| e.attribute("checked").is_some()))
            .unwrap_or(false)
    }

    /// Set checkedness; checking a radio unchecks the other radios of its group
    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> Result<()> {
        if checked && self.input_type(id).as_deref() == Some("radio") {
            if let Some(name) = self.attribute(id, "name").map(str::to_string) {
                let group: Vec<NodeId> = self
                    .all_elements()
                    .into_iter()
                    .filter(|n| {
                        *n != id
                            && self.input_type(*n).as_deref() == Some("radio")
                            && self.attribute(*n, "name") == Some(name.as_str())
                    })
                    .collect();
                for other in group {
                    self.element_mut(other)?.checked = Some(false);
                }
            }
        }
        self.element_mut(id)?.checked = Some(checked);
        Ok(())
    }

    fn options(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|n| self.tag_name(*n) == Some("option"))
            .collect()
    }

    fn option_value(&self, option: NodeId) -> String {
        match self.attribute(option, "value") {
            Some(value) => value.to_string(),
            None => self.text_content(option).trim().to_string(),
        }
    }

    fn option_selected(&self, option: NodeId) -> bool {
        self.element(option)
            .map(|e| e.selected.unwrap_or_else(|| e.attribute("selected").is_some()))
            .unwrap_or(false)
    }

    /// Select the option whose value (or text) matches
    pub fn select_option(&mut self, select: NodeId, value: &str) -> Result<()> {
        let options = self.options(select);
        let target = options
            .iter()
            .copied()
            .find(|o| self.option_value(*o) == value)
            .or_else(|| {
                options
                    .iter()
                    .copied()
                    .find(|o| self.text_content(*o).trim() == value)
            })
            .ok_or_else(|| {
                InspectorError::InvalidState(format!("no option '{}' in select {}", value, select))
            })?;
        for option in options {
            self.element_mut(option)?.selected = Some(option == target);
        }
        Ok(())
    }

    /// Value of the selected option, or of the first option when none is selected
    pub fn selected_value(&self, select: NodeId) -> Option<String> {
        let options = self.options(select);
        options
            .iter()
            .copied()
            .find(|o| self.option_selected(*o))
            .or_else(|| options.first().copied())
            .map(|o| self.option_value(o))
    }

    // ---- handlers ----

    /// Register a native click handler on an element
    pub fn add_click_handler(&mut self, id: NodeId) {
        self.click_handlers.insert(id);
    }

    pub fn has_click_handler(&self, id: NodeId) -> bool {
        self.click_handlers.contains(&id)
            || self.has_attribute(id, "onclick")
            || self.has_attribute(id, "onmousedown")
    }

    /// Short human label such as `button#save.primary`
    pub fn describe(&self, id: NodeId) -> String {
        let Some(tag) = self.tag_name(id) else {
            return id.to_string();
        };
        let mut label = tag.to_string();
        if let Some(element_id) = self.attribute(id, "id").filter(|v| !v.is_empty()) {
            label.push('#');
            label.push_str(element_id);
        }
        for class in self.classes(id).into_iter().take(2) {
            label.push('.');
            label.push_str(class);
        }
        label
    }
}
