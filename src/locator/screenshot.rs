use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::dom::{NodeId, Page};

/// Image of an element encoded as a `data:` URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Screenshot(pub String);

impl Screenshot {
    pub fn from_png(bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Screenshot(format!("data:image/png;base64,{}", encoded))
    }

    pub fn data_url(&self) -> &str {
        &self.0
    }
}

/// Captures a snapshot of one element
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    async fn capture(&self, page: &Page, node: NodeId) -> anyhow::Result<Screenshot>;
}

/// 1x1 transparent PNG
const BLANK_PNG: [u8; 70] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0x60, 0xf8, 0x5f, 0x0f, 0x00, 0x02, 0x87, 0x01, 0x80, 0xeb, 0x47, 0xba, 0x92, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Capture used when no renderer is attached: every element gets a blank image
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderCapture;

#[async_trait]
impl ScreenshotCapture for PlaceholderCapture {
    async fn capture(&self, page: &Page, node: NodeId) -> anyhow::Result<Screenshot> {
        let connected = {
            let doc = page.read();
            doc.is_element(node) && doc.is_connected(node)
        };
        if !connected {
            anyhow::bail!("element {} is not attached to the document", node);
        }
        Ok(Screenshot::from_png(&BLANK_PNG))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_is_png_data_url() {
        let page = Page::from_markup("about:blank", "<p id='x'>x</p>").unwrap();
        let node = page.read().get_element_by_id("x").unwrap();
        let shot = PlaceholderCapture.capture(&page, node).await.unwrap();
        assert!(shot.data_url().starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[tokio::test]
    async fn test_detached_element_fails() {
        let page = Page::from_markup("about:blank", "<p id='x'>x</p>").unwrap();
        let node = page.read().get_element_by_id("x").unwrap();
        page.write().remove_node(node);
        assert!(PlaceholderCapture.capture(&page, node).await.is_err());
    }
}
