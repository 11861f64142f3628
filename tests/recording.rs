use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumi_inspector::dom::{DomEvent, Page};
use lumi_inspector::locator::{ElementKind, FieldValue};
use lumi_inspector::recorder::{
    parse_script, play, ActionType, CommitLock, RecordedBatch, Recorder, RecorderState, Trigger,
    UiOverlay,
};
use lumi_inspector::InspectorConfig;
use tokio::sync::mpsc;

const SIGNUP: &str = r#"<html><head><title>Sign up</title></head><body>
  <form id="signup">
    <label for="email">Email</label><input id="email" name="email" type="email">
    <label>Plan <select name="plan"><option value="free">Free</option><option value="pro">Pro</option></select></label>
    <input id="terms" type="checkbox" name="terms">
    <button type="submit" class="primary">Create account</button>
  </form>
  <h1 id="greeting">Welcome aboard</h1>
</body></html>"#;

struct Harness {
    page: Page,
    recorder: Recorder,
    batches: Arc<Mutex<Vec<RecordedBatch>>>,
    redispatched: mpsc::UnboundedReceiver<DomEvent>,
}

async fn harness() -> Harness {
    let page = Page::from_markup("https://shop.test/signup", SIGNUP).unwrap();
    let overlay = UiOverlay::install(&page).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let recorder =
        Recorder::new(page.clone(), overlay, InspectorConfig::default()).with_redispatch(tx);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = batches.clone();
    recorder
        .record_event(Arc::new(move |batch| sink.lock().unwrap().push(batch)))
        .await
        .unwrap();
    Harness {
        page,
        recorder,
        batches,
        redispatched: rx,
    }
}

#[tokio::test(start_paused = true)]
async fn scripted_signup_is_recorded_in_order() {
    let mut h = harness().await;
    let steps = parse_script(
        r##"
- hover: "#email"
- type: { target: "#email", text: "ada@example.com" }
- key: { target: "#email", key: Tab }
- select: { target: "select[name=plan]", value: pro }
- click: "#terms"
- click: "button.primary"
- contextmenu: "#greeting"
- key: { key: Escape }
"##,
    )
    .unwrap();

    play(&h.page, &h.recorder, &steps, Some(&mut h.redispatched))
        .await
        .unwrap();
    assert_eq!(h.recorder.state().await, RecorderState::Stopped);

    let actions = h.recorder.actions().await;
    let summary: Vec<_> = actions
        .iter()
        .map(|a| (a.classified.kind, a.trigger))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ElementKind::Text, Trigger::Change),
            (ElementKind::Select, Trigger::Change),
            (ElementKind::Checkbox, Trigger::Click),
            (ElementKind::Button, Trigger::Click),
            (ElementKind::Verify, Trigger::Click),
        ]
    );
    assert_eq!(
        actions[0].classified.value,
        Some(FieldValue::Text("ada@example.com".into()))
    );
    assert_eq!(actions[0].path, "//input[@name='email']");
    assert_eq!(actions[2].classified.value, Some(FieldValue::Flag(true)));
    assert_eq!(
        actions[4].classified.value,
        Some(FieldValue::Text("Welcome aboard".into()))
    );

    let batches = h.batches.lock().unwrap().clone();
    let last = batches.last().unwrap();
    assert_eq!(last.action_type, ActionType::Stop);
    assert!(last.actions.is_none());
    assert!(batches[..batches.len() - 1]
        .iter()
        .all(|b| b.action_type == ActionType::Event));
    assert!(batches.iter().all(|b| b.url == "https://shop.test/signup"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_click_and_change_commit_once() {
    let h = harness().await;
    let terms = h.page.read().get_element_by_id("terms").unwrap();
    h.page.write().set_checked(terms, true).unwrap();

    let change = DomEvent::change(terms);
    let click = DomEvent::click(terms);
    let (_, _) = tokio::join!(
        h.recorder.handle_event(&change),
        h.recorder.handle_event(&click),
    );

    let actions = h.recorder.actions().await;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].trigger, Trigger::Click);
    assert!(!h.recorder.is_locked());
}

#[tokio::test(start_paused = true)]
async fn commit_lock_excludes_and_times_out() {
    let lock = CommitLock::from_config(&InspectorConfig::default());
    let held = lock.acquire().await.unwrap();
    assert!(lock.is_locked());

    let start = tokio::time::Instant::now();
    assert!(lock.acquire().await.is_err());
    assert!(start.elapsed() >= Duration::from_secs(2));

    held.release();
    assert!(!lock.is_locked());
    let again = lock.acquire().await.unwrap();
    drop(again);
    assert!(!lock.is_locked());
}
