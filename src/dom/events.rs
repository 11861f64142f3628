use serde::{Deserialize, Serialize};

use super::NodeId;

/// DOM event types the picker and recorder listen to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    MouseMove,
    Click,
    Change,
    Input,
    KeyDown,
    ContextMenu,
}

/// A DOM event as delivered by the host page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: NodeId,
    /// UIEvent.detail (click count for mouse events)
    pub detail: i64,
    pub key: Option<String>,
    pub shift_key: bool,
}

impl DomEvent {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        let detail = if kind == EventKind::Click { 1 } else { 0 };
        Self {
            kind,
            target,
            detail,
            key: None,
            shift_key: false,
        }
    }

    pub fn click(target: NodeId) -> Self {
        Self::new(EventKind::Click, target)
    }

    pub fn change(target: NodeId) -> Self {
        Self::new(EventKind::Change, target)
    }

    pub fn input(target: NodeId) -> Self {
        Self::new(EventKind::Input, target)
    }

    pub fn mouse_move(target: NodeId) -> Self {
        Self::new(EventKind::MouseMove, target)
    }

    pub fn context_menu(target: NodeId) -> Self {
        Self::new(EventKind::ContextMenu, target)
    }

    pub fn key_down(target: NodeId, key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(EventKind::KeyDown, target)
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift_key = true;
        self
    }

    pub fn with_detail(mut self, detail: i64) -> Self {
        self.detail = detail;
        self
    }

    pub fn is_key(&self, key: &str) -> bool {
        self.kind == EventKind::KeyDown && self.key.as_deref() == Some(key)
    }
}

/// What a handler did with an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub default_prevented: bool,
}

impl EventOutcome {
    pub fn prevented() -> Self {
        Self {
            default_prevented: true,
        }
    }
}
