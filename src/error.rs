use thiserror::Error;

/// Errors raised by the page model, the locator strategies and the recorder
#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("markup parse error: {0}")]
    Markup(String),

    #[error("unsupported css selector '{selector}': {reason}")]
    Css { selector: String, reason: String },

    #[error("invalid xpath '{expr}': {reason}")]
    XPath { expr: String, reason: String },

    #[error("node {0} is not an element")]
    NotAnElement(usize),

    #[error("element <{0}> cannot be classified")]
    Unclassifiable(String),

    #[error("no selector could be built for <{0}>")]
    NoSelectors(String),

    #[error("lock not acquired after {0} ms")]
    LockTimeout(u64),

    #[error("screenshot capture failed: {0}")]
    Screenshot(#[source] anyhow::Error),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("no element matches '{0}'")]
    TargetNotFound(String),

    #[error("event script error: {0}")]
    Script(String),
}

impl InspectorError {
    pub(crate) fn css(selector: &str, reason: impl Into<String>) -> Self {
        InspectorError::Css {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn xpath(expr: &str, reason: impl Into<String>) -> Self {
        InspectorError::XPath {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InspectorError>;
