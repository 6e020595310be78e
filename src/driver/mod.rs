pub mod webdriver;

pub use webdriver::WebDriverSession;

use async_trait::async_trait;

use crate::errors::DriverError;
use crate::snapshot::PageSnapshot;

/// The external collaborator providing raw browser primitives.
///
/// The engine assumes nothing about the implementation beyond this
/// contract. The orchestrator owns the single handle exclusively; no
/// other component invokes it, and there is exactly one in-flight
/// operation at any time.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Navigate the tab to a URL and capture the resulting page
    async fn navigate(&mut self, url: &str) -> Result<PageSnapshot, DriverError>;

    /// Click the element at an XPath locator and capture the page the
    /// tab ends up on
    async fn click(&mut self, locator: &str) -> Result<PageSnapshot, DriverError>;

    /// Type text into the element at an XPath locator
    async fn type_text(&mut self, locator: &str, text: &str) -> Result<(), DriverError>;

    /// Capture a screenshot of the current viewport as PNG bytes
    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError>;

    /// Release the underlying browser session
    async fn close(&mut self) -> Result<(), DriverError>;
}
