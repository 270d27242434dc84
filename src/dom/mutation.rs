//! Mutation Tracker.
//!
//! Load-more interactions rarely signal completion, so instead of watching the action
//! we install a `MutationObserver` that records matching added nodes into a page-global
//! buffer, perform the action, then poll the buffer.

use crate::browser::PageContext;
use crate::dom::render_script;
use crate::error::Result;
use serde_json::json;
use std::time::{Duration, Instant};

const MUTATION_OBSERVER_JS: &str = include_str!("js/mutation_observer.js");

const ADDED_COUNT_JS: &str = "(window.__harvestAdded ? window.__harvestAdded.length : 0)";

/// Interval between buffer polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Observer scoped to `ancestor_selector`, recording added nodes matching `items_selector`
#[derive(Debug, Clone)]
pub struct MutationTracker {
    ancestor_selector: String,
    items_selector: String,
}

impl MutationTracker {
    pub fn new(ancestor_selector: impl Into<String>, items_selector: impl Into<String>) -> Self {
        Self {
            ancestor_selector: ancestor_selector.into(),
            items_selector: items_selector.into(),
        }
    }

    pub fn items_selector(&self) -> &str {
        &self.items_selector
    }

    /// Install (or reinstall) the observer, clearing the buffer.
    ///
    /// Falls back to observing `<body>` when the ancestor is not in the document.
    pub async fn init_observer(&self, page: &dyn PageContext) -> Result<()> {
        let script = render_script(
            MUTATION_OBSERVER_JS,
            &json!({ "ancestor": self.ancestor_selector, "items": self.items_selector }),
        )?;
        page.evaluate(&script).await?;
        Ok(())
    }

    /// Number of distinct matching nodes added since the observer was installed
    pub async fn added_count(&self, page: &dyn PageContext) -> Result<usize> {
        let value = page.evaluate(ADDED_COUNT_JS).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    /// Poll the buffer until at least one node was recorded or `timeout` elapses
    pub async fn has_items_added(&self, page: &dyn PageContext, timeout: Duration) -> Result<bool> {
        self.wait_for_count(page, 1, timeout).await
    }

    /// Poll the buffer until it holds `threshold` nodes or `timeout` elapses
    pub async fn wait_for_count(&self, page: &dyn PageContext, threshold: usize, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.added_count(page).await? >= threshold {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
