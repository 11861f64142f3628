//! Raw DOM event to recordable node
//!
//! Composes classification, the strategy builder and the scanner. Failures are
//! reported as `None`; an empty text entry is a valid event that is deliberately
//! not recorded and comes back as [`EventClassification::Skip`].

use crate::dom::{Document, DomEvent};
use crate::locator::classifier::{classify_with_fallback, ElementKind};
use crate::locator::scanner::{parse_node, ParsedNode};
use crate::locator::strategies::StrategyBuilder;

#[derive(Debug, Clone, PartialEq)]
pub enum EventClassification {
    /// The event maps to an element worth recording
    Node(ParsedNode),
    /// Valid event, intentionally not recorded (no error indicator)
    Skip,
}

pub fn classify_event(
    doc: &Document,
    event: &DomEvent,
    builder: &StrategyBuilder,
    attribute_names: &[String],
    forced: Option<ElementKind>,
) -> Option<EventClassification> {
    let target = event.target;
    if !doc.is_element(target) {
        log::debug!("{:?} target {} is not an element", event.kind, target);
        return None;
    }

    // Selectors describe the element that gets classified, which may be the parent
    let node = match forced {
        Some(_) => target,
        None => classify_with_fallback(doc, target)?.0,
    };

    let selectors = builder.build_strategies(doc, node);
    if selectors.is_empty() {
        log::warn!("no selectors found for {}", doc.describe(node));
        return None;
    }

    let parsed = parse_node(doc, node, selectors, attribute_names, forced)?;
    if forced.is_none() && parsed.classified.is_empty_text() {
        log::debug!("skipping empty text entry on {}", doc.describe(node));
        return Some(EventClassification::Skip);
    }
    Some(EventClassification::Node(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::classifier::FieldValue;
    use crate::utils::InspectorConfig;

    const PAGE: &str = r#"
<form>
  <input id="name" name="name">
  <input id="agree" type="checkbox">
  <button id="go"><span id="label">Go</span></button>
  <p id="note">Plain <b id="bold">text</b></p>
</form>"#;

    fn run(doc: &Document, event: DomEvent, forced: Option<ElementKind>) -> Option<EventClassification> {
        let config = InspectorConfig::default();
        classify_event(
            doc,
            &event,
            &StrategyBuilder::new(&config),
            &config.attribute_names,
            forced,
        )
    }

    fn id(doc: &Document, id: &str) -> crate::dom::NodeId {
        doc.get_element_by_id(id).unwrap()
    }

    #[test]
    fn test_empty_text_is_skipped() {
        let mut doc = Document::parse(PAGE).unwrap();
        let name = id(&doc, "name");
        assert_eq!(
            run(&doc, DomEvent::change(name), None),
            Some(EventClassification::Skip)
        );

        doc.set_value(name, "Ada").unwrap();
        let Some(EventClassification::Node(parsed)) = run(&doc, DomEvent::change(name), None)
        else {
            panic!("expected a node");
        };
        assert_eq!(parsed.classified.value, Some(FieldValue::Text("Ada".to_string())));
        assert_eq!(parsed.selectors[0].value, "name");
    }

    #[test]
    fn test_target_resolves_to_classifiable_parent() {
        let doc = Document::parse(PAGE).unwrap();
        let Some(EventClassification::Node(parsed)) =
            run(&doc, DomEvent::click(id(&doc, "label")), None)
        else {
            panic!("expected a node");
        };
        assert_eq!(parsed.node, id(&doc, "go"));
        assert_eq!(parsed.classified.kind, ElementKind::Button);
        assert_eq!(parsed.selectors[0].value, "go");
    }

    #[test]
    fn test_unclassifiable_and_non_elements() {
        let doc = Document::parse(PAGE).unwrap();
        assert_eq!(run(&doc, DomEvent::click(id(&doc, "bold")), None), None);
        let text = doc.children(id(&doc, "bold"))[0];
        assert_eq!(run(&doc, DomEvent::click(text), None), None);
    }

    #[test]
    fn test_forced_verify_on_plain_element() {
        let doc = Document::parse(PAGE).unwrap();
        let Some(EventClassification::Node(parsed)) = run(
            &doc,
            DomEvent::context_menu(id(&doc, "note")),
            Some(ElementKind::Verify),
        ) else {
            panic!("expected a node");
        };
        assert_eq!(parsed.classified.kind, ElementKind::Verify);
        assert_eq!(
            parsed.classified.value,
            Some(FieldValue::Text("Plain text".to_string()))
        );
    }
}
