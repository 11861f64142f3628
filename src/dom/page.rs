use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::Document;
use crate::error::Result;

/// Shared handle to the page the picker and recorder operate on
///
/// Guards returned by [`Page::read`] and [`Page::write`] must be dropped before any
/// `.await`; handlers do their DOM work in synchronous blocks.
#[derive(Debug, Clone)]
pub struct Page {
    url: Arc<str>,
    document: Arc<RwLock<Document>>,
}

impl Page {
    pub fn new(url: &str, document: Document) -> Self {
        Self {
            url: Arc::from(url),
            document: Arc::new(RwLock::new(document)),
        }
    }

    pub fn from_markup(url: &str, markup: &str) -> Result<Self> {
        Ok(Self::new(url, Document::parse(markup)?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Document> {
        // A panicked writer leaves the tree structurally valid
        self.document.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.document.write().unwrap_or_else(|e| e.into_inner())
    }
}
