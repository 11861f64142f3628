//! Scripted gestures
//!
//! An event script is a YAML list of gestures. Each gesture applies its DOM
//! mutations and expands into the event sequence a browser would fire, so a
//! recording can be reproduced without one:
//!
//! ```yaml
//! - hover: "#name"
//! - type: { target: "#name", text: "Ada" }
//! - key: { target: "#name", key: Tab }
//! - check: "//input[@id='agree']"
//! - select: { target: "#plan", value: pro }
//! - click: "button.save"
//! - contextmenu: "#total"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc::UnboundedReceiver;

use super::event_recorder::Recorder;
use crate::dom::{Document, DomEvent, NodeId, Page};
use crate::error::{InspectorError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStep {
    /// Pointer click; toggles checkboxes and checks radios
    Click(String),
    /// Typed text, one input event per character
    Type { target: String, text: String },
    /// Bare change event
    Change(String),
    /// Click a checkbox or radio only when it is unchecked
    Check(String),
    Select { target: String, value: String },
    Key {
        #[serde(default)]
        target: Option<String>,
        key: String,
        #[serde(default)]
        shift: bool,
    },
    ContextMenu(String),
    Hover(String),
}

/// Parse a script; each step is a single-key map naming the gesture
pub fn parse_script(yaml: &str) -> Result<Vec<ScriptStep>> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml);
    serde_yaml::with::singleton_map_recursive::deserialize(deserializer)
        .map_err(|e| InspectorError::Script(e.to_string()))
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| InspectorError::Script(format!("{}: {}", path.display(), e)))?;
    parse_script(&content)
}

fn is_xpath(target: &str) -> bool {
    target.starts_with('/') || target.starts_with('(') || target.starts_with("xpath=")
}

/// First element matched by a CSS selector or an XPath expression
pub fn resolve_target(doc: &Document, target: &str) -> Result<NodeId> {
    let found = if is_xpath(target) {
        doc.evaluate_xpath(target)?.into_iter().next()
    } else {
        doc.query_selector(target)?
    };
    found.ok_or_else(|| InspectorError::TargetNotFound(target.to_string()))
}

fn is_toggle(doc: &Document, node: NodeId) -> bool {
    matches!(doc.input_type(node).as_deref(), Some("checkbox") | Some("radio"))
}

/// Click on a checkbox or radio: the state flips before `click` and `change` fire
fn toggle_click(doc: &mut Document, node: NodeId) -> Result<Vec<DomEvent>> {
    let checked = match doc.input_type(node).as_deref() {
        Some("radio") => true,
        _ => !doc.checked(node),
    };
    doc.set_checked(node, checked)?;
    Ok(vec![
        DomEvent::mouse_move(node),
        DomEvent::click(node),
        DomEvent::change(node),
    ])
}

/// Apply the step to the page and return the events it fires, in order
pub fn expand(step: &ScriptStep, page: &Page) -> Result<Vec<DomEvent>> {
    let mut doc = page.write();
    match step {
        ScriptStep::Click(target) => {
            let node = resolve_target(&doc, target)?;
            if is_toggle(&doc, node) {
                toggle_click(&mut doc, node)
            } else {
                Ok(vec![DomEvent::mouse_move(node), DomEvent::click(node)])
            }
        }
        ScriptStep::Type { target, text } => {
            let node = resolve_target(&doc, target)?;
            let mut events = vec![DomEvent::mouse_move(node), DomEvent::click(node)];
            let mut typed = doc.value(node).unwrap_or_default();
            for ch in text.chars() {
                typed.push(ch);
                events.push(DomEvent::input(node));
            }
            doc.set_value(node, &typed)?;
            Ok(events)
        }
        ScriptStep::Change(target) => {
            let node = resolve_target(&doc, target)?;
            Ok(vec![DomEvent::change(node)])
        }
        ScriptStep::Check(target) => {
            let node = resolve_target(&doc, target)?;
            if !is_toggle(&doc, node) {
                return Err(InspectorError::Script(format!(
                    "'{}' is not a checkbox or radio",
                    target
                )));
            }
            if doc.checked(node) {
                return Ok(Vec::new());
            }
            toggle_click(&mut doc, node)
        }
        ScriptStep::Select { target, value } => {
            let node = resolve_target(&doc, target)?;
            doc.select_option(node, value)?;
            Ok(vec![
                DomEvent::mouse_move(node),
                DomEvent::click(node),
                DomEvent::input(node),
                DomEvent::change(node),
            ])
        }
        ScriptStep::Key { target, key, shift } => {
            let node = match target {
                Some(target) => resolve_target(&doc, target)?,
                None => doc.body().unwrap_or_else(|| doc.root()),
            };
            let event = DomEvent::key_down(node, key);
            Ok(vec![if *shift { event.with_shift() } else { event }])
        }
        ScriptStep::ContextMenu(target) => {
            let node = resolve_target(&doc, target)?;
            Ok(vec![DomEvent::mouse_move(node), DomEvent::context_menu(node)])
        }
        ScriptStep::Hover(target) => {
            let node = resolve_target(&doc, target)?;
            Ok(vec![DomEvent::mouse_move(node)])
        }
    }
}

/// Drive `recorder` with a script; returns the number of events delivered
///
/// Clicks the recorder re-dispatches are fed back through `redispatched` after
/// each step, as a browser would deliver them.
pub async fn play(
    page: &Page,
    recorder: &Recorder,
    steps: &[ScriptStep],
    mut redispatched: Option<&mut UnboundedReceiver<DomEvent>>,
) -> Result<usize> {
    let mut delivered = 0;
    for (index, step) in steps.iter().enumerate() {
        let events = expand(step, page)
            .map_err(|e| InspectorError::Script(format!("step {}: {}", index + 1, e)))?;
        log::debug!("step {}: {:?} -> {} events", index + 1, step, events.len());
        for event in &events {
            recorder.handle_event(event).await;
            delivered += 1;
        }
        if let Some(rx) = redispatched.as_deref_mut() {
            while let Ok(event) = rx.try_recv() {
                recorder.handle_event(&event).await;
                delivered += 1;
            }
        }
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::EventKind;

    const PAGE: &str = r#"<html><body>
  <input id="name">
  <input id="agree" type="checkbox">
  <input type="radio" name="size" id="s" checked="checked"><input type="radio" name="size" id="m">
  <select id="plan"><option value="free">Free</option><option value="pro">Pro</option></select>
  <button class="save">Save</button>
</body></html>"#;

    fn page() -> Page {
        Page::from_markup("https://example.test", PAGE).unwrap()
    }

    fn kinds(events: &[DomEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_parse_script() {
        let steps = parse_script(
            r##"
- click: "button.save"
- type: { target: "#name", text: "Ada" }
- key: { key: Escape, shift: true }
- contextmenu: "//button"
"##,
        )
        .unwrap();
        assert_eq!(steps[0], ScriptStep::Click("button.save".into()));
        assert_eq!(
            steps[2],
            ScriptStep::Key {
                target: None,
                key: "Escape".into(),
                shift: true
            }
        );
        assert_eq!(steps[3], ScriptStep::ContextMenu("//button".into()));
        assert!(parse_script("- wiggle: \"#name\"").is_err());
    }

    #[test]
    fn test_parse_every_gesture() {
        let steps = parse_script(
            r##"
- hover: "#name"
- type: { target: "#name", text: "Ada" }
- key: { target: "#name", key: Tab }
- check: "//input[@id='agree']"
- select: { target: "#plan", value: pro }
- change: "#plan"
- click: "button.save"
- contextmenu: "#total"
"##,
        )
        .unwrap();
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0], ScriptStep::Hover("#name".into()));
        assert_eq!(
            steps[1],
            ScriptStep::Type {
                target: "#name".into(),
                text: "Ada".into()
            }
        );
        assert_eq!(
            steps[2],
            ScriptStep::Key {
                target: Some("#name".into()),
                key: "Tab".into(),
                shift: false
            }
        );
        assert_eq!(steps[3], ScriptStep::Check("//input[@id='agree']".into()));
        assert_eq!(
            steps[4],
            ScriptStep::Select {
                target: "#plan".into(),
                value: "pro".into()
            }
        );
        assert_eq!(steps[5], ScriptStep::Change("#plan".into()));
        assert_eq!(steps[7], ScriptStep::ContextMenu("#total".into()));
    }

    #[test]
    fn test_checkbox_click_toggles_before_events() {
        let page = page();
        let events = expand(&ScriptStep::Click("#agree".into()), &page).unwrap();
        assert_eq!(
            kinds(&events),
            vec![EventKind::MouseMove, EventKind::Click, EventKind::Change]
        );
        let agree = page.read().get_element_by_id("agree").unwrap();
        assert!(page.read().checked(agree));

        expand(&ScriptStep::Click("#agree".into()), &page).unwrap();
        assert!(!page.read().checked(agree));

        // check is a no-op once checked
        expand(&ScriptStep::Check("#agree".into()), &page).unwrap();
        assert!(expand(&ScriptStep::Check("#agree".into()), &page).unwrap().is_empty());
    }

    #[test]
    fn test_radio_click_switches_group() {
        let page = page();
        expand(&ScriptStep::Click("//input[@id='m']".into()), &page).unwrap();
        let doc = page.read();
        assert!(doc.checked(doc.get_element_by_id("m").unwrap()));
        assert!(!doc.checked(doc.get_element_by_id("s").unwrap()));
    }

    #[test]
    fn test_type_and_select() {
        let page = page();
        let events = expand(
            &ScriptStep::Type {
                target: "#name".into(),
                text: "Ada".into(),
            },
            &page,
        )
        .unwrap();
        assert_eq!(events.iter().filter(|e| e.kind == EventKind::Input).count(), 3);
        let name = page.read().get_element_by_id("name").unwrap();
        assert_eq!(page.read().value(name).as_deref(), Some("Ada"));

        expand(
            &ScriptStep::Select {
                target: "#plan".into(),
                value: "Pro".into(),
            },
            &page,
        )
        .unwrap();
        let plan = page.read().get_element_by_id("plan").unwrap();
        assert_eq!(page.read().selected_value(plan).as_deref(), Some("pro"));
    }

    #[test]
    fn test_missing_target() {
        let page = page();
        let err = expand(&ScriptStep::Hover("#nope".into()), &page).unwrap_err();
        assert!(matches!(err, InspectorError::TargetNotFound(_)));
        assert!(expand(&ScriptStep::Check("#name".into()), &page).is_err());
    }
}
