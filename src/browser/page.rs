//! The browser automation boundary.
//!
//! Everything above this module talks to a page through [`PageContext`]: navigation,
//! JavaScript evaluation, screenshots and the native input primitives. [`ChromePage`]
//! implements it on top of a `headless_chrome` tab.

use crate::error::{Result, ScrapeError};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for full-page screenshots, tall feeds otherwise produce huge images
const MAX_SCREENSHOT_HEIGHT: f64 = 8_000.0;

/// A single browsable page
///
/// Implementations are driven by one owner at a time; callers serialize DOM access
/// themselves (see the page-access lock in the web scraper).
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Navigate to `url` and wait until the navigation settles
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Evaluate a JavaScript expression and return its JSON value.
    ///
    /// Promises are awaited. `undefined` becomes `null`.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// PNG screenshot of the viewport, or of the whole document when `full_page` is set
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Native click on the first element matching `selector`
    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Native keyboard input into the first element matching `selector`
    async fn type_text(&self, selector: &str, text: &str, timeout: Duration) -> Result<()>;

    /// Focus the element matching `selector` and press `key`
    async fn press_key(&self, selector: &str, key: &str, timeout: Duration) -> Result<()>;

    /// Open an isolated page sharing cookies and storage with this one
    async fn fork(&self) -> Result<Arc<dyn PageContext>>;

    async fn close(&self) -> Result<()>;
}

/// Run a blocking CDP call off the async scheduler
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ScrapeError::TaskFailed(e.to_string()))?
}

/// Wrap an expression so the page returns its value as a JSON string
fn json_wrapped(expression: &str) -> String {
    format!(
        "(async () => {{ const __value = await ({}); return JSON.stringify(__value === undefined ? null : __value); }})()",
        expression
    )
}

#[derive(Debug, Deserialize)]
struct DocumentSize {
    width: f64,
    height: f64,
}

/// [`PageContext`] backed by a `headless_chrome` tab
#[derive(Clone)]
pub struct ChromePage {
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(browser: Browser, tab: Arc<Tab>) -> Self {
        Self { browser, tab }
    }

    /// The underlying tab
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    async fn with_timeout<T>(
        &self,
        action: &str,
        timeout: Duration,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        // The element wait inside `fut` already honours `timeout`; this guards the CDP call itself.
        tokio::time::timeout(timeout * 2, fut)
            .await
            .map_err(|_| ScrapeError::ActionFailed {
                action: action.to_string(),
                reason: format!("timed out after {:?}", timeout * 2),
            })?
    }
}

#[async_trait]
impl PageContext for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)
                .map_err(|e| ScrapeError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;
            tab.wait_until_navigated()
                .map_err(|e| ScrapeError::NavigationFailed(format!("Navigation timeout: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn current_url(&self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || Ok(tab.get_url())).await
    }

    async fn title(&self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || {
            tab.get_title()
                .map_err(|e| ScrapeError::TabOperationFailed(format!("Failed to read title: {}", e)))
        })
        .await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let tab = self.tab.clone();
        let wrapped = json_wrapped(expression);
        let raw = blocking(move || {
            let result = tab
                .evaluate(&wrapped, true)
                .map_err(|e| ScrapeError::EvaluationFailed(e.to_string()))?;
            result
                .value
                .ok_or_else(|| ScrapeError::EvaluationFailed("No value returned from script".to_string()))
        })
        .await?;

        // The wrapper always returns a JSON string
        let json_str: String = serde_json::from_value(raw)
            .map_err(|e| ScrapeError::EvaluationFailed(format!("Expected JSON string from script: {}", e)))?;
        serde_json::from_str(&json_str)
            .map_err(|e| ScrapeError::EvaluationFailed(format!("Failed to parse script result: {}", e)))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let clip = if full_page {
            let size: DocumentSize = serde_json::from_value(
                self.evaluate(
                    "({ width: document.documentElement.scrollWidth, height: document.documentElement.scrollHeight })",
                )
                .await?,
            )?;
            Some(Page::Viewport {
                x: 0.0,
                y: 0.0,
                width: size.width.max(1.0),
                height: size.height.clamp(1.0, MAX_SCREENSHOT_HEIGHT),
                scale: 1.0,
            })
        } else {
            None
        };

        let tab = self.tab.clone();
        blocking(move || {
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, clip, true)
                .map_err(|e| ScrapeError::ScreenshotFailed(e.to_string()))
        })
        .await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let selector = selector.to_string();
        self.with_timeout(
            "click",
            timeout,
            blocking(move || {
                let element = tab
                    .wait_for_element_with_custom_timeout(&selector, timeout)
                    .map_err(|e| ScrapeError::ElementNotFound(format!("Element '{}' not found: {}", selector, e)))?;
                element.click().map_err(|e| ScrapeError::ActionFailed {
                    action: "click".to_string(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }),
        )
        .await
    }

    async fn type_text(&self, selector: &str, text: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_timeout(
            "type",
            timeout,
            blocking(move || {
                let element = tab
                    .wait_for_element_with_custom_timeout(&selector, timeout)
                    .map_err(|e| ScrapeError::ElementNotFound(format!("Element '{}' not found: {}", selector, e)))?;
                element.focus().map_err(|e| ScrapeError::ActionFailed {
                    action: "type".to_string(),
                    reason: e.to_string(),
                })?;
                element.type_into(&text).map_err(|e| ScrapeError::ActionFailed {
                    action: "type".to_string(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }),
        )
        .await
    }

    async fn press_key(&self, selector: &str, key: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let selector = selector.to_string();
        let key = key.to_string();
        self.with_timeout(
            "press_key",
            timeout,
            blocking(move || {
                let element = tab
                    .wait_for_element_with_custom_timeout(&selector, timeout)
                    .map_err(|e| ScrapeError::ElementNotFound(format!("Element '{}' not found: {}", selector, e)))?;
                element.focus().map_err(|e| ScrapeError::ActionFailed {
                    action: "press_key".to_string(),
                    reason: e.to_string(),
                })?;
                tab.press_key(&key).map_err(|e| ScrapeError::ActionFailed {
                    action: "press_key".to_string(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }),
        )
        .await
    }

    async fn fork(&self) -> Result<Arc<dyn PageContext>> {
        let browser = self.browser.clone();
        let page = blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| ScrapeError::TabOperationFailed(format!("Failed to create tab: {}", e)))?;
            Ok(ChromePage::new(browser, tab))
        })
        .await?;
        Ok(Arc::new(page))
    }

    async fn close(&self) -> Result<()> {
        let tab = self.tab.clone();
        blocking(move || {
            tab.close(false)
                .map_err(|e| ScrapeError::TabOperationFailed(format!("Failed to close tab: {}", e)))?;
            Ok(())
        })
        .await
    }
}
