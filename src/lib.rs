pub mod dom;
pub mod error;
pub mod locator;
pub mod recorder;
pub mod utils;

// Re-export common items
pub use dom::{Document, DomEvent, EventKind, EventOutcome, NodeId, Page};
pub use error::{InspectorError, Result};
pub use locator::{Locator, ParsedNode, StrategyBuilder};
pub use recorder::{RecordedBatch, Recorder, UiOverlay};
pub use utils::InspectorConfig;
