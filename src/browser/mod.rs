//! Browser automation capability used by the browser tools.

mod webdriver;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;

pub use webdriver::{WebDriverBrowser, WebDriverConfig};

/// One open page of a browser.
#[async_trait]
pub trait BrowserPage: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Waits until the document has loaded and no new resources are being
    /// fetched, or fails with [`BrowserError::Timeout`].
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError>;

    /// Runs `script` as a function body in the page and returns its result
    /// as text. Scripts must `return` the value they want back.
    async fn evaluate(&mut self, script: &str) -> Result<String, BrowserError>;

    /// Clicks the element matching a CSS selector, or failing that the
    /// element whose text is `target`.
    async fn click(&mut self, target: &str) -> Result<(), BrowserError>;

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError>;

    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// A page shared by every browser tool of a session.
pub type SharedPage = Arc<tokio::sync::Mutex<Box<dyn BrowserPage>>>;

pub fn share_page<P>(page: P) -> SharedPage
where
    P: BrowserPage + 'static,
{
    Arc::new(tokio::sync::Mutex::new(Box::new(page)))
}
