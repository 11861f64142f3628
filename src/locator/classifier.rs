//! Element classification
//!
//! Maps an element to the kind of interaction it stands for and reads its current
//! value. Classification reflects live form state, so classifying the same element
//! again after the user edits it yields the new value.

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::dom::xpath::normalize_space;

/// `<input type=..>` values that behave like free text
const TEXT_INPUT_TYPES: &[&str] = &[
    "password",
    "email",
    "tel",
    "url",
    "number",
    "search",
    "text",
    "time",
    "date",
    "datetime-local",
    "week",
    "month",
    "color",
];

/// Interaction kind of a classified element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Radio,
    Checkbox,
    File,
    Select,
    #[serde(rename = "a")]
    Link,
    Button,
    Submit,
    Image,
    Range,
    /// Anything else that carries a native click handler
    Reset,
    /// Assertion target chosen with a right click
    Verify,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Text => "text",
            ElementKind::Radio => "radio",
            ElementKind::Checkbox => "checkbox",
            ElementKind::File => "file",
            ElementKind::Select => "select",
            ElementKind::Link => "a",
            ElementKind::Button => "button",
            ElementKind::Submit => "submit",
            ElementKind::Image => "image",
            ElementKind::Range => "range",
            ElementKind::Reset => "reset",
            ElementKind::Verify => "verify",
        }
    }

    /// Kinds whose commit is driven by `change`; every other kind commits on click
    pub fn is_handled_by_change(self) -> bool {
        match self {
            ElementKind::Text | ElementKind::File | ElementKind::Select => true,
            ElementKind::Radio
            | ElementKind::Checkbox
            | ElementKind::Link
            | ElementKind::Button
            | ElementKind::Submit
            | ElementKind::Image
            | ElementKind::Range
            | ElementKind::Reset
            | ElementKind::Verify => false,
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value carried by a classified element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Flag(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedValue {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

impl ClassifiedValue {
    fn new(kind: ElementKind, value: Option<FieldValue>) -> Self {
        Self { kind, value }
    }

    fn text(kind: ElementKind, value: Option<String>) -> Self {
        Self::new(kind, Some(FieldValue::Text(value.unwrap_or_default())))
    }

    /// True for a text entry whose value is empty
    pub fn is_empty_text(&self) -> bool {
        self.kind == ElementKind::Text
            && self
                .value
                .as_ref()
                .and_then(FieldValue::as_text)
                .is_none_or(str::is_empty)
    }
}

/// Classify an element, or `None` if it is not something a user interacts with
pub fn classify(doc: &Document, node: NodeId) -> Option<ClassifiedValue> {
    let tag = doc.tag_name(node)?;
    match tag {
        "input" => classify_input(doc, node),
        "textarea" => Some(ClassifiedValue::text(ElementKind::Text, doc.value(node))),
        "select" => Some(ClassifiedValue::text(ElementKind::Select, doc.value(node))),
        "a" => Some(ClassifiedValue::text(
            ElementKind::Link,
            doc.attribute(node, "href").map(str::to_string),
        )),
        "button" => Some(ClassifiedValue::text(ElementKind::Button, doc.value(node))),
        _ if doc.has_click_handler(node) => Some(ClassifiedValue::new(ElementKind::Reset, None)),
        _ => None,
    }
}

fn classify_input(doc: &Document, node: NodeId) -> Option<ClassifiedValue> {
    let input_type = doc.input_type(node)?;
    let classified = match input_type.as_str() {
        t if TEXT_INPUT_TYPES.contains(&t) => {
            ClassifiedValue::text(ElementKind::Text, doc.value(node))
        }
        "radio" => ClassifiedValue::text(ElementKind::Radio, doc.value(node)),
        "checkbox" => ClassifiedValue::new(
            ElementKind::Checkbox,
            Some(FieldValue::Flag(doc.checked(node))),
        ),
        "file" => ClassifiedValue::text(ElementKind::File, doc.value(node)),
        "submit" => ClassifiedValue::new(ElementKind::Submit, None),
        "image" => ClassifiedValue::new(ElementKind::Image, None),
        "range" => ClassifiedValue::new(ElementKind::Range, None),
        "reset" => ClassifiedValue::new(ElementKind::Reset, None),
        _ if doc.has_click_handler(node) => ClassifiedValue::new(ElementKind::Reset, None),
        _ => return None,
    };
    Some(classified)
}

/// Classify `node`, retrying once on its parent element
///
/// Returns the node that was actually classified along with its value.
pub fn classify_with_fallback(doc: &Document, node: NodeId) -> Option<(NodeId, ClassifiedValue)> {
    if let Some(classified) = classify(doc, node) {
        return Some((node, classified));
    }
    let parent = doc.parent_element(node)?;
    classify(doc, parent).map(|classified| (parent, classified))
}

/// Classification used for assertions: the element's visible text is the value
pub fn classify_verify(doc: &Document, node: NodeId) -> ClassifiedValue {
    ClassifiedValue::text(
        ElementKind::Verify,
        Some(normalize_space(&doc.text_content(node))),
    )
}

/// Classification with the kind imposed by the caller
pub fn classify_as(doc: &Document, node: NodeId, kind: ElementKind) -> ClassifiedValue {
    match kind {
        ElementKind::Verify => classify_verify(doc, node),
        _ => ClassifiedValue::new(kind, classify(doc, node).and_then(|c| c.value)),
    }
}
