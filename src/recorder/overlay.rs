//! Inspector overlay
//!
//! Owns the elements the inspector injects into the page: a style sheet, a frame
//! whose `data-state` reflects the session state, and an info box naming the
//! highlighted element. Picker and recorder share one overlay per session and the
//! owner calls [`UiOverlay::dispose`] when done.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::dom::{Document, NodeId, Page, HIGHLIGHT_ATTR};
use crate::error::{InspectorError, Result};

pub const STYLE_ID: &str = "inspector-style";
pub const FRAME_ID: &str = "inspector-frame";
pub const INFO_BOX_ID: &str = "inspector-info-box";

const STYLE_SHEET: &str = "[data-inspector-highlight]{outline:2px solid #4f8ef7;}\
#inspector-frame{position:fixed;inset:0;pointer-events:none;border:3px solid #4f8ef7;}\
#inspector-frame[data-state=error]{border-color:#e5484d;}\
#inspector-info-box{position:fixed;bottom:4px;right:4px;font:12px monospace;}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlayState {
    #[default]
    Idle,
    Picking,
    Paused,
    Recording,
    Error,
}

impl OverlayState {
    pub fn as_str(self) -> &'static str {
        match self {
            OverlayState::Idle => "idle",
            OverlayState::Picking => "picking",
            OverlayState::Paused => "paused",
            OverlayState::Recording => "recording",
            OverlayState::Error => "error",
        }
    }
}

#[derive(Debug, Default)]
struct OverlayInner {
    style: Option<NodeId>,
    frame: Option<NodeId>,
    info_box: Option<NodeId>,
    highlighted: Option<NodeId>,
    state: OverlayState,
    /// State to return to after an error flash
    resting: OverlayState,
    flash_generation: u64,
    disposed: bool,
}

#[derive(Debug)]
pub struct UiOverlay {
    page: Page,
    inner: Mutex<OverlayInner>,
}

fn find_or_create(doc: &mut Document, id: &str, tag: &str, parent: NodeId) -> NodeId {
    if let Some(existing) = doc.get_element_by_id(id) {
        return existing;
    }
    let node = doc.create_element(tag, vec![("id".to_string(), id.to_string())]);
    doc.append_child(parent, node);
    node
}

fn set_text(doc: &mut Document, node: NodeId, text: &str) {
    for child in doc.children(node).to_vec() {
        doc.remove_node(child);
    }
    if !text.is_empty() {
        let text_node = doc.create_text(text);
        doc.append_child(node, text_node);
    }
}

impl UiOverlay {
    /// Inject (or adopt already injected) overlay elements into the page
    pub fn install(page: &Page) -> Result<Arc<Self>> {
        let mut inner = OverlayInner::default();
        {
            let mut doc = page.write();
            let root = doc.root();
            let head = doc.head().or_else(|| doc.body()).unwrap_or(root);
            let body = doc.body().unwrap_or(root);

            let style = find_or_create(&mut doc, STYLE_ID, "style", head);
            set_text(&mut doc, style, STYLE_SHEET);
            let frame = find_or_create(&mut doc, FRAME_ID, "div", body);
            doc.set_attribute(frame, "data-state", OverlayState::Idle.as_str())?;
            let info_box = find_or_create(&mut doc, INFO_BOX_ID, "div", body);

            inner.style = Some(style);
            inner.frame = Some(frame);
            inner.info_box = Some(info_box);
        }
        log::debug!("overlay installed on {}", page.url());
        Ok(Arc::new(Self {
            page: page.clone(),
            inner: Mutex::new(inner),
        }))
    }

    fn inner(&self) -> MutexGuard<'_, OverlayInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> OverlayState {
        self.inner().state
    }

    pub fn highlighted(&self) -> Option<NodeId> {
        self.inner().highlighted
    }

    pub fn is_disposed(&self) -> bool {
        self.inner().disposed
    }

    /// Whether `node` is one of the overlay's own elements or inside one
    ///
    /// Takes the page read lock; callers must not hold a page guard.
    pub fn contains(&self, node: NodeId) -> bool {
        let own = {
            let inner = self.inner();
            [inner.style, inner.frame, inner.info_box]
        };
        let doc = self.page.read();
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .any(|n| own.contains(&Some(n)))
    }

    /// Mark `node` as the highlighted element, clearing the previous one
    pub fn highlight(&self, node: NodeId) -> Result<()> {
        let mut inner = self.inner();
        if inner.disposed || inner.highlighted == Some(node) {
            return Ok(());
        }
        let mut doc = self.page.write();
        if !doc.is_element(node) {
            return Err(InspectorError::NotAnElement(node.index()));
        }
        if let Some(previous) = inner.highlighted.take() {
            doc.remove_attribute(previous, HIGHLIGHT_ATTR)?;
        }
        doc.set_attribute(node, HIGHLIGHT_ATTR, "true")?;
        if let Some(info_box) = inner.info_box {
            let label = doc.describe(node);
            set_text(&mut doc, info_box, &label);
        }
        inner.highlighted = Some(node);
        Ok(())
    }

    pub fn clear_highlight(&self) -> Result<()> {
        let mut inner = self.inner();
        let mut doc = self.page.write();
        Self::clear_highlight_locked(&mut inner, &mut doc)
    }

    fn clear_highlight_locked(inner: &mut OverlayInner, doc: &mut Document) -> Result<()> {
        if let Some(previous) = inner.highlighted.take() {
            doc.remove_attribute(previous, HIGHLIGHT_ATTR)?;
        }
        if let Some(info_box) = inner.info_box {
            set_text(doc, info_box, "");
        }
        Ok(())
    }

    fn write_state(inner: &mut OverlayInner, doc: &mut Document, state: OverlayState) -> Result<()> {
        inner.state = state;
        match inner.frame {
            Some(frame) => doc.set_attribute(frame, "data-state", state.as_str()),
            None => Ok(()),
        }
    }

    /// Switch the session state shown by the frame
    pub fn set_state(&self, state: OverlayState) -> Result<()> {
        let mut inner = self.inner();
        if inner.disposed {
            return Ok(());
        }
        inner.resting = state;
        let mut doc = self.page.write();
        Self::write_state(&mut inner, &mut doc, state)
    }

    /// Clear the highlight and end any error flash
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner();
        if inner.disposed {
            return Ok(());
        }
        let mut doc = self.page.write();
        Self::clear_highlight_locked(&mut inner, &mut doc)?;
        let resting = inner.resting;
        Self::write_state(&mut inner, &mut doc, resting)
    }

    /// Show the error state for `duration`, then return to the previous state
    pub fn flash_error(self: &Arc<Self>, duration: Duration) {
        let generation = {
            let mut inner = self.inner();
            if inner.disposed {
                return;
            }
            inner.flash_generation += 1;
            let mut doc = self.page.write();
            if let Err(e) = Self::write_state(&mut inner, &mut doc, OverlayState::Error) {
                log::warn!("overlay: cannot show error state: {}", e);
            }
            inner.flash_generation
        };

        let overlay = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            overlay.end_flash(generation);
        });
    }

    fn end_flash(&self, generation: u64) {
        let mut inner = self.inner();
        // A newer flash or a reset already took over
        if inner.disposed || inner.flash_generation != generation || inner.state != OverlayState::Error
        {
            return;
        }
        let resting = inner.resting;
        let mut doc = self.page.write();
        if let Err(e) = Self::write_state(&mut inner, &mut doc, resting) {
            log::warn!("overlay: cannot restore state: {}", e);
        }
    }

    /// Remove everything the overlay added to the page
    pub fn dispose(&self) -> Result<()> {
        let mut inner = self.inner();
        if inner.disposed {
            return Ok(());
        }
        let mut doc = self.page.write();
        if let Some(previous) = inner.highlighted.take() {
            doc.remove_attribute(previous, HIGHLIGHT_ATTR)?;
        }
        for node in [inner.style.take(), inner.frame.take(), inner.info_box.take()]
            .into_iter()
            .flatten()
        {
            doc.remove_node(node);
        }
        inner.state = OverlayState::Idle;
        inner.disposed = true;
        log::debug!("overlay disposed on {}", self.page.url());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head></head><body><p id="a">A</p><p id="b" class="x">B</p></body></html>"#;

    fn setup() -> (Page, Arc<UiOverlay>) {
        let page = Page::from_markup("https://example.test", PAGE).unwrap();
        let overlay = UiOverlay::install(&page).unwrap();
        (page, overlay)
    }

    #[test]
    fn test_install_is_idempotent() {
        let (page, _overlay) = setup();
        let _again = UiOverlay::install(&page).unwrap();
        let doc = page.read();
        assert_eq!(doc.query_selector_all("#inspector-frame").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("#inspector-info-box").unwrap().len(), 1);
        let style = doc.get_element_by_id(STYLE_ID).unwrap();
        assert_eq!(doc.tag_name(doc.parent(style).unwrap()), Some("head"));
    }

    #[test]
    fn test_single_highlight_and_info_box() {
        let (page, overlay) = setup();
        let (a, b) = {
            let doc = page.read();
            (doc.get_element_by_id("a").unwrap(), doc.get_element_by_id("b").unwrap())
        };
        overlay.highlight(a).unwrap();
        overlay.highlight(b).unwrap();

        let info = {
            let doc = page.read();
            assert!(!doc.has_attribute(a, HIGHLIGHT_ATTR));
            assert!(doc.has_attribute(b, HIGHLIGHT_ATTR));
            let info = doc.get_element_by_id(INFO_BOX_ID).unwrap();
            assert_eq!(doc.text_content(info), "p#b.x");
            info
        };
        assert!(overlay.contains(info));
        assert!(!overlay.contains(a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_flash_reverts() {
        let (page, overlay) = setup();
        overlay.set_state(OverlayState::Recording).unwrap();
        overlay.flash_error(Duration::from_millis(1250));
        assert_eq!(overlay.state(), OverlayState::Error);
        {
            let doc = page.read();
            let frame = doc.get_element_by_id(FRAME_ID).unwrap();
            assert_eq!(doc.attribute(frame, "data-state"), Some("error"));
        }

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(overlay.state(), OverlayState::Recording);
    }

    #[test]
    fn test_dispose_removes_everything() {
        let (page, overlay) = setup();
        let a = page.read().get_element_by_id("a").unwrap();
        overlay.highlight(a).unwrap();
        overlay.dispose().unwrap();
        overlay.dispose().unwrap();

        let doc = page.read();
        assert!(doc.get_element_by_id(FRAME_ID).is_none());
        assert!(doc.get_element_by_id(INFO_BOX_ID).is_none());
        assert!(doc.get_element_by_id(STYLE_ID).is_none());
        assert!(!doc.has_attribute(a, HIGHLIGHT_ATTR));
        assert!(overlay.is_disposed());
    }
}
