//! Recorder module for picking elements and capturing user interactions
//!
//! This module provides:
//! - A commit lock serialising click and change commits
//! - The page overlay (highlight, session frame, info box)
//! - Event classification into recordable nodes
//! - A single element picker producing full locators
//! - The interaction recorder and its flushed batches
//! - Event scripts to drive a recording without a browser

pub mod classify_event;
pub mod event_recorder;
pub mod lock;
pub mod overlay;
pub mod picker;
pub mod script;

pub use classify_event::{classify_event, EventClassification};
pub use event_recorder::{
    ActionNode, ActionType, FlushCallback, RecordedBatch, Recorder, RecorderState, Trigger,
};
pub use lock::{CommitLock, CommitPermit};
pub use overlay::{OverlayState, UiOverlay};
pub use picker::{PickCallback, Picker, PickerState};
pub use script::{expand, load_script, parse_script, play, ScriptStep};
