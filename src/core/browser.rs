use crate::core::{Config, PageDriver};
use crate::errors::Result;
use async_trait::async_trait;

/// Lifecycle of one browser instance. A job owns its browser exclusively:
/// launch, open one page, close the page, close the browser.
#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type Page: PageDriver;

    /// Launch a new browser instance
    async fn launch(&mut self, config: &Config) -> Result<()>;

    /// Create a new page in a fresh context
    async fn new_page(&self) -> Result<Self::Page>;

    /// Check if browser is still running
    fn is_running(&self) -> bool;

    /// Close the browser
    async fn close(&mut self) -> Result<()>;
}
