//! Low-level element actions.
//!
//! Every action tries the native input path first and falls back to invoking the
//! equivalent DOM API from JavaScript when the native path times out or fails. The
//! returned strings are confirmations meant for a model transcript, not status codes.

use crate::browser::PageContext;
use crate::dom::markers::ElementHandle;
use crate::dom::render_script;
use crate::error::{Result, ScrapeError};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

const FALLBACK_ACTION_JS: &str = include_str!("js/fallback_action.js");

/// How long the native path may wait for the element
pub const NATIVE_ACTION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Click,
    Fill,
    Select,
    Enter,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Fill => "fill",
            Action::Select => "select",
            Action::Enter => "enter",
        }
    }
}

async fn fallback(page: &dyn PageContext, handle: &ElementHandle, action: Action, value: &str) -> Result<()> {
    let script = render_script(
        FALLBACK_ACTION_JS,
        &json!({ "selector": handle.selector, "action": action, "value": value }),
    )?;
    let done = page.evaluate(&script).await?;
    if done.as_bool().unwrap_or(false) {
        Ok(())
    } else {
        Err(ScrapeError::ActionFailed {
            action: action.name().to_string(),
            reason: format!("{} could not be reached from script", handle.label()),
        })
    }
}

async fn perform(
    page: &dyn PageContext,
    handle: &ElementHandle,
    action: Action,
    value: &str,
    native: Result<()>,
) -> Result<()> {
    match native {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!(
                "Native {} on {} failed ({}), retrying from script",
                action.name(),
                handle.label(),
                e
            );
            fallback(page, handle, action, value).await
        }
    }
}

/// Click an element
pub async fn click(page: &dyn PageContext, handle: &ElementHandle) -> Result<String> {
    let native = page.click(&handle.selector, NATIVE_ACTION_TIMEOUT).await;
    perform(page, handle, Action::Click, "", native).await?;
    Ok(format!("Clicked {}", handle.label()))
}

/// Type `value` into an input or textarea
pub async fn fill(page: &dyn PageContext, handle: &ElementHandle, value: &str) -> Result<String> {
    let native = page.type_text(&handle.selector, value, NATIVE_ACTION_TIMEOUT).await;
    perform(page, handle, Action::Fill, value, native).await?;
    Ok(format!("Filled {} with \"{}\"", handle.label(), value))
}

/// Choose the option of a `<select>` whose value or label matches `value`
pub async fn select(page: &dyn PageContext, handle: &ElementHandle, value: &str) -> Result<String> {
    // Typing an option label into a focused select picks it in Chrome
    let native = page.type_text(&handle.selector, value, NATIVE_ACTION_TIMEOUT).await;
    perform(page, handle, Action::Select, value, native).await?;
    Ok(format!("Selected \"{}\" in {}", value, handle.label()))
}

/// Press Enter on an element, submitting its form if it has one
pub async fn press_enter(page: &dyn PageContext, handle: &ElementHandle) -> Result<String> {
    let native = page.press_key(&handle.selector, "Enter", NATIVE_ACTION_TIMEOUT).await;
    perform(page, handle, Action::Enter, "", native).await?;
    Ok(format!("Pressed Enter on {}", handle.label()))
}

/// Scroll the window to `fraction` (0.0..=1.0) of the document height
pub async fn scroll_to_fraction(page: &dyn PageContext, fraction: f64) -> Result<()> {
    let fraction = fraction.clamp(0.0, 1.0);
    let script = format!(
        "(() => {{ const h = Math.max(document.body.scrollHeight, document.documentElement.scrollHeight) - window.innerHeight; window.scrollTo(0, Math.max(0, h) * {}); return true; }})()",
        fraction
    );
    page.evaluate(&script).await?;
    Ok(())
}

/// Scroll the element matching `selector` into view; false if it is gone
pub async fn scroll_into_view(page: &dyn PageContext, selector: &str) -> Result<bool> {
    let script = format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; el.scrollIntoView({{ block: 'end' }}); window.scrollBy(0, window.innerHeight / 2); return true; }})()",
        serde_json::to_string(selector)?
    );
    Ok(page.evaluate(&script).await?.as_bool().unwrap_or(false))
}

/// Whether the document is taller than the viewport
pub async fn is_scrollable(page: &dyn PageContext) -> Result<bool> {
    let value = page
        .evaluate("Math.max(document.body.scrollHeight, document.documentElement.scrollHeight) > window.innerHeight + 1")
        .await?;
    Ok(value.as_bool().unwrap_or(false))
}
