//! Locator strategy engine
//!
//! This module provides:
//! - Element classification into interaction kinds
//! - Ranked, validated selector strategies and full locators
//! - The compact scanner path used for recorded actions
//! - Collaborator traits for CSS minimisation and screenshots

pub mod classifier;
pub mod css_finder;
pub mod scanner;
pub mod screenshot;
pub mod strategies;

pub use classifier::{classify, ClassifiedValue, ElementKind, FieldValue};
pub use css_finder::{CssMinimizer, FinderOptions, PathFinder};
pub use scanner::{parse_node, AncestorFrame, ParsedNode};
pub use screenshot::{PlaceholderCapture, Screenshot, ScreenshotCapture};
pub use strategies::{
    get_unique_xpath, Alternative, Locator, SelectorCandidate, StrategyBuilder, StrategyKind,
};
