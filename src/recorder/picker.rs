//! Single element picker
//!
//! Idle -> Active -> (Paused <-> Active) -> Removed. While active the element under
//! the pointer is highlighted; a click builds a full locator and hands it to the
//! pick callback. Shift+Escape toggles pause.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::overlay::{OverlayState, UiOverlay};
use crate::dom::{Document, DomEvent, EventKind, EventOutcome, NodeId, Page};
use crate::error::{InspectorError, Result};
use crate::locator::classifier::classify_with_fallback;
use crate::locator::screenshot::ScreenshotCapture;
use crate::locator::strategies::{Locator, StrategyBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerState {
    Idle,
    Active,
    Paused,
    Removed,
}

pub type PickCallback = Box<dyn Fn(Locator) + Send + Sync>;

pub struct Picker {
    page: Page,
    overlay: Arc<UiOverlay>,
    builder: StrategyBuilder,
    capture: Arc<dyn ScreenshotCapture>,
    state: Mutex<PickerState>,
    on_pick: Mutex<Option<PickCallback>>,
    non_stop: AtomicBool,
    /// Only highlight classifiable elements, never pick
    recorder_mode: bool,
}

/// The element an event is about: text nodes defer to their parent element
fn event_element(doc: &Document, target: NodeId) -> Option<NodeId> {
    if doc.is_element(target) {
        Some(target)
    } else {
        doc.parent_element(target)
    }
}

impl Picker {
    pub fn new(
        page: Page,
        overlay: Arc<UiOverlay>,
        builder: StrategyBuilder,
        capture: Arc<dyn ScreenshotCapture>,
    ) -> Self {
        Self {
            page,
            overlay,
            builder,
            capture,
            state: Mutex::new(PickerState::Idle),
            on_pick: Mutex::new(None),
            non_stop: AtomicBool::new(false),
            recorder_mode: false,
        }
    }

    /// Picker used by the recorder for pointer highlighting only
    pub fn for_recorder(
        page: Page,
        overlay: Arc<UiOverlay>,
        builder: StrategyBuilder,
        capture: Arc<dyn ScreenshotCapture>,
    ) -> Self {
        Self {
            recorder_mode: true,
            ..Self::new(page, overlay, builder, capture)
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, PickerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PickerState {
        *self.state_guard()
    }

    fn set_state(&self, state: PickerState) {
        *self.state_guard() = state;
    }

    /// Start picking; `non_stop_run` keeps the picker active after each pick
    pub fn start(&self, on_pick: PickCallback, non_stop_run: bool) -> Result<()> {
        {
            let mut state = self.state_guard();
            if *state != PickerState::Idle {
                return Err(InspectorError::InvalidState(format!(
                    "picker cannot start from {:?}",
                    *state
                )));
            }
            *state = PickerState::Active;
        }
        *self.on_pick.lock().unwrap_or_else(|e| e.into_inner()) = Some(on_pick);
        self.non_stop.store(non_stop_run, Ordering::SeqCst);
        if !self.recorder_mode {
            self.overlay.set_state(OverlayState::Picking)?;
        }
        log::info!("picker started on {}", self.page.url());
        Ok(())
    }

    /// Highlight the element under the pointer
    pub fn highlight(&self, target: NodeId) -> Result<()> {
        let element = {
            let doc = self.page.read();
            let Some(element) = event_element(&doc, target) else {
                return Ok(());
            };
            if self.recorder_mode && classify_with_fallback(&doc, element).is_none() {
                None
            } else {
                Some(element)
            }
        };

        match element {
            Some(element) if !self.overlay.contains(element) => self.overlay.highlight(element),
            Some(_) => Ok(()),
            None => self.overlay.clear_highlight(),
        }
    }

    pub async fn handle_event(&self, event: &DomEvent) -> Result<EventOutcome> {
        let state = self.state();
        let is_pause_chord = event.is_key("Escape") && event.shift_key;

        match state {
            PickerState::Idle | PickerState::Removed => Ok(EventOutcome::default()),
            PickerState::Paused => {
                if is_pause_chord {
                    self.set_state(PickerState::Active);
                    self.overlay.set_state(OverlayState::Picking)?;
                    log::info!("picker resumed");
                }
                Ok(EventOutcome::default())
            }
            PickerState::Active => match event.kind {
                EventKind::MouseMove => {
                    self.highlight(event.target)?;
                    Ok(EventOutcome::default())
                }
                EventKind::Click if !self.recorder_mode => self.pick(event.target).await,
                EventKind::KeyDown if is_pause_chord => {
                    self.set_state(PickerState::Paused);
                    self.overlay.set_state(OverlayState::Paused)?;
                    log::info!("picker paused");
                    Ok(EventOutcome::default())
                }
                _ => Ok(EventOutcome::default()),
            },
        }
    }

    async fn pick(&self, target: NodeId) -> Result<EventOutcome> {
        let element = {
            let doc = self.page.read();
            event_element(&doc, target)
        };
        let Some(element) = element.filter(|e| !self.overlay.contains(*e)) else {
            return Ok(EventOutcome::prevented());
        };

        let locator = self
            .builder
            .build_locator(&self.page, element, self.capture.as_ref())
            .await?;
        log::info!(
            "picked <{}> with {} alternatives",
            locator.element_tag,
            locator.alternatives.len()
        );

        if let Some(on_pick) = self.on_pick.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            on_pick(locator);
        }
        if !self.non_stop.load(Ordering::SeqCst) {
            self.remove()?;
        }
        Ok(EventOutcome::prevented())
    }

    /// Stop listening and tear down the overlay
    pub fn remove(&self) -> Result<()> {
        self.set_state(PickerState::Removed);
        self.on_pick.lock().unwrap_or_else(|e| e.into_inner()).take();
        if self.recorder_mode {
            self.overlay.clear_highlight()
        } else {
            self.overlay.dispose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::screenshot::PlaceholderCapture;
    use crate::dom::HIGHLIGHT_ATTR;

    const PAGE: &str = r#"<html><body>
  <a id="home" href="/">Home</a>
  <p id="para">Just <b id="bold">text</b></p>
</body></html>"#;

    fn setup(recorder_mode: bool) -> (Page, Arc<UiOverlay>, Picker) {
        let page = Page::from_markup("https://example.test", PAGE).unwrap();
        let overlay = UiOverlay::install(&page).unwrap();
        let builder = StrategyBuilder::default();
        let capture: Arc<dyn ScreenshotCapture> = Arc::new(PlaceholderCapture);
        let picker = if recorder_mode {
            Picker::for_recorder(page.clone(), overlay.clone(), builder, capture)
        } else {
            Picker::new(page.clone(), overlay.clone(), builder, capture)
        };
        (page, overlay, picker)
    }

    fn id(page: &Page, id: &str) -> NodeId {
        page.read().get_element_by_id(id).unwrap()
    }

    fn collector() -> (PickCallback, Arc<Mutex<Vec<Locator>>>) {
        let picked = Arc::new(Mutex::new(Vec::new()));
        let sink = picked.clone();
        (Box::new(move |l| sink.lock().unwrap().push(l)), picked)
    }

    #[tokio::test]
    async fn test_pick_once_then_removed() {
        let (page, overlay, picker) = setup(false);
        let (callback, picked) = collector();
        picker.start(callback, false).unwrap();
        assert_eq!(overlay.state(), OverlayState::Picking);

        let home = id(&page, "home");
        picker.handle_event(&DomEvent::mouse_move(home)).await.unwrap();
        assert_eq!(overlay.highlighted(), Some(home));

        let outcome = picker.handle_event(&DomEvent::click(home)).await.unwrap();
        assert!(outcome.default_prevented);
        assert_eq!(picked.lock().unwrap().len(), 1);
        assert_eq!(picked.lock().unwrap()[0].alternatives[0].candidate.value, "home");
        assert_eq!(picker.state(), PickerState::Removed);
        assert!(overlay.is_disposed());
        assert!(!page.read().has_attribute(home, HIGHLIGHT_ATTR));

        // Removed is terminal
        picker.handle_event(&DomEvent::click(home)).await.unwrap();
        assert_eq!(picked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_stop_and_pause_chord() {
        let (page, _overlay, picker) = setup(false);
        let (callback, picked) = collector();
        picker.start(callback, true).unwrap();
        let home = id(&page, "home");
        let para = id(&page, "para");

        picker.handle_event(&DomEvent::click(home)).await.unwrap();
        picker.handle_event(&DomEvent::click(para)).await.unwrap();
        assert_eq!(picked.lock().unwrap().len(), 2);
        assert_eq!(picker.state(), PickerState::Active);

        let chord = DomEvent::key_down(home, "Escape").with_shift();
        picker.handle_event(&chord).await.unwrap();
        assert_eq!(picker.state(), PickerState::Paused);
        let outcome = picker.handle_event(&DomEvent::click(home)).await.unwrap();
        assert!(!outcome.default_prevented);
        assert_eq!(picked.lock().unwrap().len(), 2);

        // Plain Escape does not resume
        picker.handle_event(&DomEvent::key_down(home, "Escape")).await.unwrap();
        assert_eq!(picker.state(), PickerState::Paused);
        picker.handle_event(&chord).await.unwrap();
        assert_eq!(picker.state(), PickerState::Active);
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let (_page, _overlay, picker) = setup(false);
        let (callback, _) = collector();
        picker.start(callback, false).unwrap();
        let (callback, _) = collector();
        assert!(picker.start(callback, false).is_err());
    }

    #[tokio::test]
    async fn test_recorder_mode_highlights_classifiable_only() {
        let (page, overlay, picker) = setup(true);
        let (callback, picked) = collector();
        picker.start(callback, true).unwrap();

        let home = id(&page, "home");
        picker.handle_event(&DomEvent::mouse_move(home)).await.unwrap();
        assert_eq!(overlay.highlighted(), Some(home));

        picker.handle_event(&DomEvent::mouse_move(id(&page, "bold"))).await.unwrap();
        assert_eq!(overlay.highlighted(), None);

        picker.handle_event(&DomEvent::click(home)).await.unwrap();
        assert!(picked.lock().unwrap().is_empty());
    }
}
