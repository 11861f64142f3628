//! Event Recorder for capturing user interactions on a page
//!
//! Listens to DOM events, classifies them and keeps an ordered list of actions that
//! is flushed to the host after every commit. Click and change commits for one
//! gesture are serialised through the [`CommitLock`]: whichever handler gets the
//! lock decides, and the element kind settles which of the two records it.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::classify_event::{classify_event, EventClassification};
use super::lock::CommitLock;
use super::overlay::{OverlayState, UiOverlay};
use super::picker::{Picker, PickerState};
use crate::dom::{DomEvent, EventKind, EventOutcome, Page};
use crate::error::{InspectorError, Result};
use crate::locator::classifier::{ClassifiedValue, ElementKind};
use crate::locator::scanner::{AncestorFrame, ParsedNode};
use crate::locator::screenshot::PlaceholderCapture;
use crate::locator::strategies::{SelectorCandidate, StrategyBuilder};
use crate::utils::InspectorConfig;

/// Event that committed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Click,
    Change,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Click => "click",
            Trigger::Change => "change",
        }
    }
}

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionNode {
    #[serde(flatten)]
    pub classified: ClassifiedValue,
    pub selectors: Vec<SelectorCandidate>,
    pub tree: Vec<AncestorFrame>,
    pub path: String,
    /// Epoch milliseconds
    pub time: i64,
    pub trigger: Trigger,
}

impl ActionNode {
    fn new(parsed: ParsedNode, trigger: Trigger) -> Self {
        Self {
            classified: parsed.classified,
            selectors: parsed.selectors,
            tree: parsed.tree,
            path: parsed.path,
            time: chrono::Utc::now().timestamp_millis(),
            trigger,
        }
    }

    /// Same element, same value, same trigger
    fn repeats(&self, other: &ActionNode) -> bool {
        self.trigger == other.trigger
            && self.path == other.path
            && self.classified == other.classified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Event,
    Stop,
}

/// Payload handed to the host on every flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedBatch {
    pub action_type: ActionType,
    pub actions: Option<Vec<ActionNode>>,
    pub url: String,
    pub session_id: Uuid,
}

pub type FlushCallback = Arc<dyn Fn(RecordedBatch) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopped,
}

/// Recording session over one page
pub struct Recorder {
    page: Page,
    overlay: Arc<UiOverlay>,
    picker: Picker,
    builder: StrategyBuilder,
    config: InspectorConfig,
    lock: CommitLock,
    /// Recording state
    state: Arc<Mutex<RecorderState>>,
    /// Recorded actions
    actions: Arc<Mutex<Vec<ActionNode>>>,
    /// Last input event not yet confirmed by change, click or Tab
    input_event: Arc<Mutex<Option<DomEvent>>>,
    callback: Arc<Mutex<Option<FlushCallback>>>,
    session_id: Arc<Mutex<Uuid>>,
    /// Re-dispatched clicks still to be ignored
    suppressed_clicks: AtomicUsize,
    redispatch: Option<mpsc::UnboundedSender<DomEvent>>,
}

impl Recorder {
    pub fn new(page: Page, overlay: Arc<UiOverlay>, config: InspectorConfig) -> Self {
        let builder = StrategyBuilder::new(&config);
        let picker = Picker::for_recorder(
            page.clone(),
            overlay.clone(),
            builder.clone(),
            Arc::new(PlaceholderCapture),
        );
        Self {
            lock: CommitLock::from_config(&config),
            page,
            overlay,
            picker,
            builder,
            config,
            state: Arc::new(Mutex::new(RecorderState::Idle)),
            actions: Arc::new(Mutex::new(Vec::new())),
            input_event: Arc::new(Mutex::new(None)),
            callback: Arc::new(Mutex::new(None)),
            session_id: Arc::new(Mutex::new(Uuid::new_v4())),
            suppressed_clicks: AtomicUsize::new(0),
            redispatch: None,
        }
    }

    /// Channel the committed clicks are re-dispatched on so the page sees them
    ///
    /// Clicks coming back through the host are ignored once each.
    pub fn with_redispatch(mut self, sender: mpsc::UnboundedSender<DomEvent>) -> Self {
        self.redispatch = Some(sender);
        self
    }

    pub async fn state(&self) -> RecorderState {
        *self.state.lock().await
    }

    /// Snapshot of the recorded actions
    pub async fn actions(&self) -> Vec<ActionNode> {
        self.actions.lock().await.clone()
    }

    pub async fn session_id(&self) -> Uuid {
        *self.session_id.lock().await
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Start a recording session; the action list starts empty
    pub async fn record_event(&self, callback: FlushCallback) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == RecorderState::Recording {
            return Err(InspectorError::InvalidState("already recording".to_string()));
        }

        self.actions.lock().await.clear();
        *self.input_event.lock().await = None;
        *self.callback.lock().await = Some(callback);
        let session_id = Uuid::new_v4();
        *self.session_id.lock().await = session_id;
        self.suppressed_clicks.store(0, Ordering::SeqCst);

        if self.picker.state() == PickerState::Idle {
            self.picker.start(Box::new(|_| {}), true)?;
        }
        self.overlay.set_state(OverlayState::Recording)?;
        *state = RecorderState::Recording;
        log::info!("recording started on {} (session {})", self.page.url(), session_id);
        Ok(())
    }

    /// Stop recording and send the final `stop` batch
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if *state != RecorderState::Recording {
                return Ok(());
            }
            *state = RecorderState::Stopped;
        }
        *self.input_event.lock().await = None;
        self.overlay.clear_highlight()?;
        self.overlay.set_state(OverlayState::Idle)?;

        let batch = RecordedBatch {
            action_type: ActionType::Stop,
            actions: None,
            url: self.page.url().to_string(),
            session_id: self.session_id().await,
        };
        let callback = self.callback.lock().await.clone();
        if let Some(callback) = callback {
            callback(batch);
        }
        log::info!("recording stopped on {}", self.page.url());
        Ok(())
    }

    /// Feed one DOM event to the recorder
    ///
    /// Failures never end the session; they are logged and flashed on the overlay.
    pub async fn handle_event(&self, event: &DomEvent) -> EventOutcome {
        if self.state().await != RecorderState::Recording {
            return EventOutcome::default();
        }

        let result = match event.kind {
            EventKind::MouseMove => self.picker.highlight(event.target).map(|_| EventOutcome::default()),
            EventKind::Input => {
                *self.input_event.lock().await = Some(event.clone());
                Ok(EventOutcome::default())
            }
            EventKind::Change => self.handle_change(event).await,
            EventKind::Click => self.handle_click(event).await,
            EventKind::ContextMenu => self.handle_context_menu(event).await,
            EventKind::KeyDown => self.handle_key(event).await,
        };

        result.unwrap_or_else(|e| {
            self.report_error(&e);
            EventOutcome::default()
        })
    }

    fn report_error(&self, error: &InspectorError) {
        log::error!("recorder: {}", error);
        self.overlay.flash_error(self.config.error_flash());
    }

    fn classify(&self, event: &DomEvent, forced: Option<ElementKind>) -> Result<EventClassification> {
        let doc = self.page.read();
        classify_event(
            &doc,
            event,
            &self.builder,
            &self.config.attribute_names,
            forced,
        )
        .ok_or_else(|| {
            let label = if doc.is_element(event.target) {
                doc.describe(event.target)
            } else {
                event.target.to_string()
            };
            InspectorError::Unclassifiable(label)
        })
    }

    async fn handle_key(&self, event: &DomEvent) -> Result<EventOutcome> {
        if event.is_key("Escape") {
            self.stop().await?;
        } else if event.is_key("Tab") {
            let pending = self.input_event.lock().await.take();
            if let Some(input) = pending {
                self.handle_change(&input).await?;
            }
        }
        Ok(EventOutcome::default())
    }

    async fn handle_change(&self, event: &DomEvent) -> Result<EventOutcome> {
        {
            let mut pending = self.input_event.lock().await;
            if pending.as_ref().is_some_and(|input| input.target == event.target) {
                *pending = None;
            }
        }

        let permit = self.lock.acquire().await?;
        let parsed = match self.classify(event, None)? {
            EventClassification::Skip => return Ok(EventOutcome::default()),
            EventClassification::Node(parsed) => parsed,
        };
        if !parsed.classified.kind.is_handled_by_change() {
            // The click handler records this kind
            permit.release();
            return Ok(EventOutcome::default());
        }

        self.commit(parsed, Trigger::Change).await;
        self.flush().await;
        tokio::time::sleep(self.config.settle_delay()).await;
        self.overlay.reset()?;
        permit.release();
        Ok(EventOutcome::default())
    }

    async fn handle_click(&self, event: &DomEvent) -> Result<EventOutcome> {
        if event.detail == -1 {
            return Ok(EventOutcome::default());
        }
        let suppressed = self
            .suppressed_clicks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if suppressed {
            log::debug!("ignoring re-dispatched click on {}", event.target);
            return Ok(EventOutcome::default());
        }

        // An input that never fired its own change is committed first
        if !self.lock.is_locked() {
            let pending = self.input_event.lock().await.take();
            if let Some(input) = pending {
                if let Err(e) = self.handle_change(&input).await {
                    self.report_error(&e);
                }
            }
        }

        let permit = self.lock.acquire().await?;
        let parsed = match self.classify(event, None)? {
            EventClassification::Skip => return Ok(EventOutcome::default()),
            EventClassification::Node(parsed) => parsed,
        };
        if parsed.classified.kind.is_handled_by_change() {
            // The change handler records this kind
            permit.release();
            return Ok(EventOutcome::default());
        }

        self.commit(parsed, Trigger::Click).await;
        self.flush().await;
        tokio::time::sleep(self.config.settle_delay()).await;

        if let Some(sender) = &self.redispatch {
            self.suppressed_clicks.fetch_add(1, Ordering::SeqCst);
            if sender.send(event.clone()).is_err() {
                self.suppressed_clicks.fetch_sub(1, Ordering::SeqCst);
                log::warn!("click re-dispatch channel closed");
            }
        }
        self.overlay.reset()?;
        permit.release();
        Ok(EventOutcome::prevented())
    }

    async fn handle_context_menu(&self, event: &DomEvent) -> Result<EventOutcome> {
        match self.classify(event, Some(ElementKind::Verify))? {
            EventClassification::Node(parsed) => {
                self.commit(parsed, Trigger::Click).await;
                self.flush().await;
            }
            EventClassification::Skip => {}
        }
        Ok(EventOutcome::prevented())
    }

    /// Append an action; a change identical to the last action is dropped
    async fn commit(&self, parsed: ParsedNode, trigger: Trigger) {
        let action = ActionNode::new(parsed, trigger);
        let mut actions = self.actions.lock().await;
        if trigger == Trigger::Change && actions.last().is_some_and(|last| last.repeats(&action)) {
            log::debug!("collapsing repeated change on {}", action.path);
            return;
        }
        log::info!(
            "recorded {} {} on {}",
            action.trigger.as_str(),
            action.classified.kind,
            action.path
        );
        actions.push(action);
    }

    async fn flush(&self) {
        let actions = {
            let mut actions = self.actions.lock().await;
            let snapshot = actions.clone();
            if self.config.clear_on_flush {
                actions.clear();
            }
            snapshot
        };
        let batch = RecordedBatch {
            action_type: ActionType::Event,
            actions: Some(actions),
            url: self.page.url().to_string(),
            session_id: self.session_id().await,
        };
        let callback = self.callback.lock().await.clone();
        if let Some(callback) = callback {
            callback(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::classifier::FieldValue;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const PAGE: &str = r#"<html><body>
  <form>
    <input id="name" name="name">
    <input id="agree" type="checkbox">
    <select id="plan"><option value="free">Free</option><option value="pro">Pro</option></select>
    <button id="save" type="button">Save</button>
  </form>
  <p id="total">Total: 42</p>
  <p id="plain">nothing to see</p>
</body></html>"#;

    struct Session {
        page: Page,
        overlay: Arc<UiOverlay>,
        recorder: Arc<Recorder>,
        batches: Arc<StdMutex<Vec<RecordedBatch>>>,
    }

    impl Session {
        fn id(&self, id: &str) -> crate::dom::NodeId {
            self.page.read().get_element_by_id(id).unwrap()
        }
    }

    async fn start_with(config: InspectorConfig) -> Session {
        let page = Page::from_markup("https://example.test/form", PAGE).unwrap();
        let overlay = UiOverlay::install(&page).unwrap();
        let recorder = Arc::new(Recorder::new(page.clone(), overlay.clone(), config));
        let batches = Arc::new(StdMutex::new(Vec::new()));
        let sink = batches.clone();
        recorder
            .record_event(Arc::new(move |batch| sink.lock().unwrap().push(batch)))
            .await
            .unwrap();
        Session {
            page,
            overlay,
            recorder,
            batches,
        }
    }

    async fn start() -> Session {
        start_with(InspectorConfig::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkbox_gesture_records_one_click() {
        let s = start().await;
        let agree = s.id("agree");
        s.page.write().set_checked(agree, true).unwrap();

        let click_event = DomEvent::click(agree);
        let change_event = DomEvent::change(agree);
        let (click, change) = tokio::join!(
            s.recorder.handle_event(&click_event),
            s.recorder.handle_event(&change_event),
        );
        assert!(click.default_prevented);
        assert!(!change.default_prevented);

        let actions = s.recorder.actions().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].classified.kind, ElementKind::Checkbox);
        assert_eq!(actions[0].classified.value, Some(FieldValue::Flag(true)));
        assert_eq!(actions[0].trigger, Trigger::Click);
        assert!(!s.recorder.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_change_records_one_change() {
        let s = start().await;
        let name = s.id("name");
        s.page.write().set_value(name, "Ada").unwrap();

        s.recorder.handle_event(&DomEvent::input(name)).await;
        let change_event = DomEvent::change(name);
        let click_event = DomEvent::click(name);
        let (change, click) = tokio::join!(
            s.recorder.handle_event(&change_event),
            s.recorder.handle_event(&click_event),
        );
        assert!(!change.default_prevented);
        assert!(!click.default_prevented);

        let actions = s.recorder.actions().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].trigger, Trigger::Change);
        assert_eq!(actions[0].classified.value, Some(FieldValue::Text("Ada".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_commits_pending_input_once() {
        let s = start().await;
        let name = s.id("name");
        for value in ["A", "Ad", "Ada"] {
            s.page.write().set_value(name, value).unwrap();
            s.recorder.handle_event(&DomEvent::input(name)).await;
        }
        s.recorder.handle_event(&DomEvent::key_down(name, "Tab")).await;
        // The browser's own change on blur repeats the same commit
        s.recorder.handle_event(&DomEvent::change(name)).await;

        let actions = s.recorder.actions().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].classified.kind, ElementKind::Text);
        assert_eq!(actions[0].trigger, Trigger::Change);
        assert_eq!(actions[0].classified.value, Some(FieldValue::Text("Ada".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_flushes_pending_input_first() {
        let s = start().await;
        let name = s.id("name");
        let save = s.id("save");
        s.page.write().set_value(name, "Grace").unwrap();
        s.recorder.handle_event(&DomEvent::input(name)).await;
        s.recorder.handle_event(&DomEvent::click(save)).await;

        let actions = s.recorder.actions().await;
        let kinds: Vec<_> = actions.iter().map(|a| (a.classified.kind, a.trigger)).collect();
        assert_eq!(
            kinds,
            vec![
                (ElementKind::Text, Trigger::Change),
                (ElementKind::Button, Trigger::Click)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_change_is_silent() {
        let s = start().await;
        let name = s.id("name");
        s.recorder.handle_event(&DomEvent::change(name)).await;
        assert!(s.recorder.actions().await.is_empty());
        assert_ne!(s.overlay.state(), OverlayState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_is_change_handled() {
        let s = start().await;
        let plan = s.id("plan");
        s.recorder.handle_event(&DomEvent::click(plan)).await;
        s.page.write().select_option(plan, "pro").unwrap();
        s.recorder.handle_event(&DomEvent::change(plan)).await;

        let actions = s.recorder.actions().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].classified.kind, ElementKind::Select);
        assert_eq!(actions[0].classified.value, Some(FieldValue::Text("pro".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_menu_records_verify() {
        let s = start().await;
        let outcome = s
            .recorder
            .handle_event(&DomEvent::context_menu(s.id("total")))
            .await;
        assert!(outcome.default_prevented);
        let actions = s.recorder.actions().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].classified.kind, ElementKind::Verify);
        assert_eq!(actions[0].classified.value, Some(FieldValue::Text("Total: 42".into())));
        assert_eq!(actions[0].trigger, Trigger::Click);
        assert!(!s.recorder.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassifiable_click_flashes_error() {
        let s = start().await;
        s.recorder.handle_event(&DomEvent::click(s.id("plain"))).await;
        assert!(s.recorder.actions().await.is_empty());
        assert_eq!(s.overlay.state(), OverlayState::Error);
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(s.overlay.state(), OverlayState::Recording);
        assert_eq!(s.recorder.state().await, RecorderState::Recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redispatched_click_is_ignored_once() {
        let page = Page::from_markup("https://example.test/form", PAGE).unwrap();
        let overlay = UiOverlay::install(&page).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder =
            Recorder::new(page.clone(), overlay, InspectorConfig::default()).with_redispatch(tx);
        recorder.record_event(Arc::new(|_| {})).await.unwrap();
        let save = page.read().get_element_by_id("save").unwrap();

        recorder.handle_event(&DomEvent::click(save)).await;
        let echoed = rx.try_recv().unwrap();
        assert_eq!(echoed.target, save);
        recorder.handle_event(&echoed).await;
        assert_eq!(recorder.actions().await.len(), 1);

        // A genuine second click is recorded again
        recorder.handle_event(&DomEvent::click(save)).await;
        assert_eq!(recorder.actions().await.len(), 2);

        // Host-side markers are ignored as well
        recorder
            .handle_event(&DomEvent::click(save).with_detail(-1))
            .await;
        assert_eq!(recorder.actions().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escape_stops_with_final_batch() {
        let s = start().await;
        let save = s.id("save");
        s.recorder.handle_event(&DomEvent::click(save)).await;
        s.recorder.handle_event(&DomEvent::key_down(save, "Escape")).await;
        assert_eq!(s.recorder.state().await, RecorderState::Stopped);

        let batches = s.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].action_type, ActionType::Event);
        assert_eq!(batches[0].actions.as_ref().unwrap().len(), 1);
        let stop = serde_json::to_value(&batches[1]).unwrap();
        assert_eq!(stop["actionType"], "stop");
        assert!(stop["actions"].is_null());
        assert_eq!(stop["url"], "https://example.test/form");
        assert_eq!(batches[0].session_id, batches[1].session_id);

        // Events after stop are ignored
        s.recorder.handle_event(&DomEvent::click(save)).await;
        assert_eq!(s.recorder.actions().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_clears_actions() {
        let s = start().await;
        s.recorder.handle_event(&DomEvent::click(s.id("save"))).await;
        s.recorder.stop().await.unwrap();
        let first_session = s.recorder.session_id().await;

        s.recorder.record_event(Arc::new(|_| {})).await.unwrap();
        assert!(s.recorder.actions().await.is_empty());
        assert_ne!(s.recorder.session_id().await, first_session);
        assert!(s.recorder.record_event(Arc::new(|_| {})).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_on_flush() {
        let config = InspectorConfig {
            clear_on_flush: true,
            ..InspectorConfig::default()
        };
        let s = start_with(config).await;
        let save = s.id("save");
        s.recorder.handle_event(&DomEvent::click(save)).await;
        s.recorder.handle_event(&DomEvent::click(save)).await;

        assert!(s.recorder.actions().await.is_empty());
        let batches = s.batches.lock().unwrap().clone();
        assert!(batches
            .iter()
            .all(|b| b.actions.as_ref().is_some_and(|a| a.len() == 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_serialization() {
        let s = start().await;
        s.recorder.handle_event(&DomEvent::click(s.id("save"))).await;
        let action = serde_json::to_value(&s.recorder.actions().await[0]).unwrap();
        assert_eq!(action["type"], "button");
        assert_eq!(action["trigger"], "click");
        assert_eq!(action["path"], "//button[@id='save']");
        assert_eq!(action["selectors"][0]["strategy"], "id");
        assert!(action["time"].as_i64().unwrap() > 0);
    }
}
