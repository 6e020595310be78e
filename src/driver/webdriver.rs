use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};

use crate::driver::BrowserDriver;
use crate::errors::DriverError;
use crate::snapshot::PageSnapshot;

/// Fallback WebDriver endpoints tried when the configured one refuses
/// the connection
const FALLBACK_URLS: [&str; 3] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444", // Selenium / geckodriver default
    "http://127.0.0.1:4444", // IP instead of localhost
];

/// `BrowserDriver` backed by a WebDriver session through fantoccini
pub struct WebDriverSession {
    client: Option<Client>,
}

impl WebDriverSession {
    /// Connect to a WebDriver server, trying common fallback endpoints
    /// if the configured URL is unreachable
    pub async fn connect(webdriver_url: &str) -> Result<Self, DriverError> {
        match ClientBuilder::native().connect(webdriver_url).await {
            Ok(client) => {
                ::log::debug!("connected to WebDriver at {}", webdriver_url);
                return Ok(Self {
                    client: Some(client),
                });
            }
            Err(e) => {
                ::log::warn!("failed to connect to WebDriver at {}: {}", webdriver_url, e);
            }
        }

        for url in FALLBACK_URLS {
            if url == webdriver_url {
                continue;
            }
            ::log::info!("trying fallback WebDriver URL: {}", url);
            if let Ok(client) = ClientBuilder::native().connect(url).await {
                ::log::debug!("connected to fallback WebDriver at {}", url);
                return Ok(Self {
                    client: Some(client),
                });
            }
        }

        Err(DriverError::Fatal(format!(
            "no WebDriver server reachable (tried {webdriver_url} and fallbacks); \
             start one or set webdriver_url"
        )))
    }

    fn client(&mut self) -> Result<&mut Client, DriverError> {
        self.client
            .as_mut()
            .ok_or_else(|| DriverError::Fatal("browser session already closed".to_string()))
    }

    /// Capture URL and source of whatever page the tab is currently on
    async fn capture(&mut self, context_url: &str) -> Result<PageSnapshot, DriverError> {
        let client = self.client()?;

        let url = client
            .current_url()
            .await
            .map_err(|e| classify(e, context_url))?;
        let html = client
            .source()
            .await
            .map_err(|e| classify(e, context_url))?;

        Ok(PageSnapshot {
            url: url.to_string(),
            html,
        })
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<PageSnapshot, DriverError> {
        let client = self.client()?;
        client.goto(url).await.map_err(|e| classify(e, url))?;
        self.capture(url).await
    }

    async fn click(&mut self, locator: &str) -> Result<PageSnapshot, DriverError> {
        let client = self.client()?;
        let element = client
            .find(Locator::XPath(locator))
            .await
            .map_err(|e| classify(e, locator))?;
        element.click().await.map_err(|e| classify(e, locator))?;
        self.capture(locator).await
    }

    async fn type_text(&mut self, locator: &str, text: &str) -> Result<(), DriverError> {
        let client = self.client()?;
        let element = client
            .find(Locator::XPath(locator))
            .await
            .map_err(|e| classify(e, locator))?;
        element
            .send_keys(text)
            .await
            .map_err(|e| classify(e, locator))?;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        let client = self.client()?;
        client
            .screenshot()
            .await
            .map_err(|e| classify(e, "screenshot"))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| DriverError::Fatal(format!("failed to close session: {e}")))?;
        }
        Ok(())
    }
}

/// Map a WebDriver command error onto the engine's taxonomy. A lost
/// session means the browser is gone and the session must abort;
/// anything else is a recoverable per-page failure.
fn classify(error: fantoccini::error::CmdError, context: &str) -> DriverError {
    let text = error.to_string();
    if text.contains("Unable to find session") || text.contains("invalid session id") {
        DriverError::Fatal(format!("WebDriver session lost: {text}"))
    } else {
        DriverError::Navigation {
            url: context.to_string(),
            reason: text,
        }
    }
}
