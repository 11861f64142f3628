//! Compact per-event locator
//!
//! Describes a classified element by its ancestor attribute tree and one short
//! XPath `path`, without running the full strategy search.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::classifier::{classify_as, classify_with_fallback, ClassifiedValue, ElementKind};
use super::strategies::SelectorCandidate;
use crate::dom::xpath::xpath_literal;
use crate::dom::{Document, NodeId};

/// Attributes that anchor a path, checked in this order on each frame
const PATH_ANCHORS: &[&str] = &["for", "class", "title", "href", "name", "id"];

/// Anchors considered stable even when the path matches several nodes
const STABLE_ANCHORS: &[&str] = &["id", "for", "name"];

/// Tag name of one element on the way to the root, with its captured attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorFrame {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

/// Serialized as `{"tag": [{"attr": "value"}, ...]}`
impl Serialize for AncestorFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Pairs<'a>(&'a [(String, String)]);

        impl Serialize for Pairs<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
                for (key, value) in self.0 {
                    let mut single = std::collections::BTreeMap::new();
                    single.insert(key.as_str(), value.as_str());
                    seq.serialize_element(&single)?;
                }
                seq.end()
            }
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.tag, &Pairs(&self.attributes))?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedNode {
    #[serde(flatten)]
    pub classified: ClassifiedValue,
    pub selectors: Vec<SelectorCandidate>,
    pub tree: Vec<AncestorFrame>,
    pub path: String,
    /// Element that was classified (the parent when the target itself was not)
    #[serde(skip)]
    pub node: NodeId,
}

/// Describe `node` for the recorder
///
/// Classification falls back to the parent element once; when that fails too the
/// node is not recordable and `None` is returned.
pub fn parse_node(
    doc: &Document,
    node: NodeId,
    selectors: Vec<SelectorCandidate>,
    attribute_names: &[String],
    forced: Option<ElementKind>,
) -> Option<ParsedNode> {
    if !doc.is_element(node) {
        log::error!("parse_node: {} is not an element", node);
        return None;
    }

    let (node, classified) = match forced {
        Some(kind) => (node, classify_as(doc, node, kind)),
        None => match classify_with_fallback(doc, node) {
            Some(found) => found,
            None => {
                log::error!("parse_node: cannot classify {}", doc.describe(node));
                return None;
            }
        },
    };

    Some(ParsedNode {
        classified,
        selectors,
        tree: build_tree(doc, node, attribute_names),
        path: build_path(doc, node),
        node,
    })
}

/// Frames from the element up to the document node (exclusive)
pub fn build_tree(doc: &Document, node: NodeId, attribute_names: &[String]) -> Vec<AncestorFrame> {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .map(|current| AncestorFrame {
            tag: doc.tag_name(current).unwrap_or_default().to_string(),
            attributes: attribute_names
                .iter()
                .filter_map(|name| {
                    doc.attribute(current, name)
                        .map(|value| (name.clone(), value.to_string()))
                })
                .collect(),
        })
        .collect()
}

/// Short XPath for `node`, anchored on the nearest attribute or sibling index
pub fn build_path(doc: &Document, node: NodeId) -> String {
    let mut segments = Vec::new();
    let mut anchor: Option<&str> = None;
    let mut anchored = false;

    for current in std::iter::once(node).chain(doc.ancestors(node)) {
        let tag = doc.tag_name(current).unwrap_or("*");
        let attr = PATH_ANCHORS.iter().copied().find_map(|attr| {
            doc.attribute(current, attr)
                .filter(|v| !v.is_empty())
                .map(|value| (attr, value))
        });
        if let Some((attr, value)) = attr {
            segments.push(format!("{}[@{}={}]", tag, attr, xpath_literal(value)));
            anchor = Some(attr);
            anchored = true;
            break;
        }
        let (index, count) = doc.same_tag_position(current);
        if count > 1 {
            segments.push(format!("{}[{}]", tag, index));
            anchored = true;
            break;
        }
        segments.push(tag.to_string());
    }

    segments.reverse();
    let path = format!("{}{}", if anchored { "//" } else { "/" }, segments.join("/"));

    if anchor.is_some_and(|a| STABLE_ANCHORS.contains(&a)) {
        return path;
    }
    match doc.evaluate_xpath(&path) {
        Ok(found) if found.len() > 1 => match found.iter().position(|n| *n == node) {
            Some(index) => format!("xpath=({})[{}]", path, index + 1),
            None => path,
        },
        Ok(_) => path,
        Err(e) => {
            log::warn!("scanner path '{}' does not evaluate: {}", path, e);
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::InspectorConfig;

    const PAGE: &str = r#"
<html><body>
  <div id="main">
    <ul><li>a</li><li>b</li></ul>
    <span><b>bold</b></span>
  </div>
  <section><button class="btn">One</button></section>
  <section><button class="btn">Two</button></section>
  <form><label for="q">Query</label><input name="q"><input name="q"></form>
  <main><p>only</p></main>
</body></html>"#;

    fn at(doc: &Document, xpath: &str) -> NodeId {
        doc.evaluate_xpath(xpath).unwrap()[0]
    }

    #[test]
    fn test_path_anchors() {
        let doc = Document::parse(PAGE).unwrap();
        assert_eq!(build_path(&doc, at(&doc, "//li[2]")), "//li[2]");
        assert_eq!(build_path(&doc, at(&doc, "//b")), "//div[@id='main']/span/b");
        assert_eq!(build_path(&doc, at(&doc, "//label")), "//label[@for='q']");
        assert_eq!(build_path(&doc, at(&doc, "//p")), "/html/body/main/p");
    }

    #[test]
    fn test_ambiguous_paths_get_index() {
        let doc = Document::parse(PAGE).unwrap();
        let second = at(&doc, "//section[2]/button");
        let path = build_path(&doc, second);
        assert_eq!(path, "xpath=(//button[@class='btn'])[2]");
        assert_eq!(doc.evaluate_xpath(&path).unwrap(), vec![second]);

        // name anchors are kept as they are
        let input = at(&doc, "(//input)[2]");
        assert_eq!(build_path(&doc, input), "//input[@name='q']");
    }

    #[test]
    fn test_anchor_order_on_one_frame() {
        let doc = Document::parse(
            r#"<div>
  <button id="ok" class="primary" title="Confirm">OK</button>
  <input id="mail" name="email">
  <a id="docs" href="/docs" title="Docs">Docs</a>
  <button id="no" class="secondary">No</button><button id="later" class="secondary">Later</button>
</div>"#,
        )
        .unwrap();
        let by_id = |id: &str| doc.get_element_by_id(id).unwrap();
        assert_eq!(build_path(&doc, by_id("ok")), "//button[@class='primary']");
        assert_eq!(build_path(&doc, by_id("mail")), "//input[@name='email']");
        assert_eq!(build_path(&doc, by_id("docs")), "//a[@title='Docs']");
        assert_eq!(
            build_path(&doc, by_id("later")),
            "xpath=(//button[@class='secondary'])[2]"
        );
    }

    #[test]
    fn test_tree_frames() {
        let doc = Document::parse(PAGE).unwrap();
        let names = InspectorConfig::default().attribute_names;
        let tree = build_tree(&doc, at(&doc, "//li[1]"), &names);
        let tags: Vec<&str> = tree.iter().map(|f| f.tag.as_str()).collect();
        assert_eq!(tags, vec!["li", "ul", "div", "body", "html"]);
        let json = serde_json::to_value(&tree[..3]).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"li": []}, {"ul": []}, {"div": [{"id": "main"}]}])
        );
    }

    #[test]
    fn test_parse_node_falls_back_to_parent_once() {
        let doc = Document::parse(
            r#"<div><button id="go"><span>Go</span></button><p><i>x</i></p></div>"#,
        )
        .unwrap();
        let names = InspectorConfig::default().attribute_names;
        let span = at(&doc, "//span");
        let parsed = parse_node(&doc, span, Vec::new(), &names, None).unwrap();
        assert_eq!(parsed.node, doc.get_element_by_id("go").unwrap());
        assert_eq!(parsed.classified.kind, ElementKind::Button);
        assert_eq!(parsed.path, "//button[@id='go']");

        assert!(parse_node(&doc, at(&doc, "//i"), Vec::new(), &names, None).is_none());
    }

    #[test]
    fn test_forced_verify() {
        let doc = Document::parse("<div><p>  Total:   42 </p></div>").unwrap();
        let names = InspectorConfig::default().attribute_names;
        let parsed =
            parse_node(&doc, at(&doc, "//p"), Vec::new(), &names, Some(ElementKind::Verify))
                .unwrap();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["type"], "verify");
        assert_eq!(json["value"], "Total: 42");
        assert_eq!(json["path"], "/div/p");
    }
}
