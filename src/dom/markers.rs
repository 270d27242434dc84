//! Element Marker Layer: stable numeric handles for elements of the current document.

use crate::browser::PageContext;
use crate::dom::element::{ElementNode, MarkerId};
use crate::dom::render_script;
use crate::dom::selector_map::MarkerMap;
use crate::error::{Result, ScrapeError};
use serde::Serialize;
use serde_json::json;

const MARK_ELEMENTS_JS: &str = include_str!("js/mark_elements.js");
const MARKER_LOOKUP_JS: &str = include_str!("js/marker_lookup.js");

/// Attribute carrying the marker on the element
pub const MARKER_ATTRIBUTE: &str = "data-harvest-marker";

/// Which elements get marked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkMode {
    /// Visible links, buttons, inputs and elements with interactive roles
    Interactive,
    /// Elements carrying a meaningful amount of text
    Content,
}

/// Limits for a marking pass
#[derive(Debug, Clone, Copy)]
pub struct MarkOptions {
    pub mode: MarkMode,
    /// Stop after this many elements
    pub max_nodes: usize,
    /// Minimum visible text for content candidates
    pub min_text_length: usize,
}

impl MarkOptions {
    pub fn interactive() -> Self {
        Self {
            mode: MarkMode::Interactive,
            max_nodes: 400,
            min_text_length: 0,
        }
    }

    pub fn content() -> Self {
        Self {
            mode: MarkMode::Content,
            max_nodes: 3000,
            min_text_length: 20,
        }
    }
}

/// A located element: its marker (when it was marked) and a selector that reaches it
#[derive(Debug, Clone, PartialEq)]
pub struct ElementHandle {
    pub marker: Option<MarkerId>,
    pub selector: String,
    pub node: Option<ElementNode>,
}

impl ElementHandle {
    /// Handle for an element addressed by a plain CSS selector
    pub fn from_selector(selector: impl Into<String>) -> Self {
        Self {
            marker: None,
            selector: selector.into(),
            node: None,
        }
    }

    /// Short label used in confirmation messages
    pub fn label(&self) -> String {
        let name = self
            .node
            .as_ref()
            .and_then(|n| n.name.as_deref().or(n.text_content.as_deref()))
            .map(|n| format!(" \"{}\"", n))
            .unwrap_or_default();
        match (&self.marker, &self.node) {
            (Some(marker), Some(node)) => format!("element {} <{}>{}", marker, node.tag_name, name),
            (Some(marker), None) => format!("element {}", marker),
            _ => format!("'{}'", self.selector),
        }
    }

    /// JSON description of the element
    pub fn describe(&self) -> Result<String> {
        match &self.node {
            Some(node) => Ok(serde_json::to_string_pretty(node)?),
            None => Ok(json!({ "selector": self.selector }).to_string()),
        }
    }
}

fn marker_selector(marker: MarkerId) -> String {
    format!("[{}=\"{}\"]", MARKER_ATTRIBUTE, marker.0)
}

/// Mark the elements selected by `options` and return their descriptions
pub async fn mark_elements(page: &dyn PageContext, options: MarkOptions) -> Result<MarkerMap> {
    let script = render_script(
        MARK_ELEMENTS_JS,
        &json!({
            "mode": options.mode,
            "max_nodes": options.max_nodes,
            "min_text_length": options.min_text_length,
        }),
    )?;
    let value = page.evaluate(&script).await?;
    let nodes: Vec<ElementNode> = serde_json::from_value(value)
        .map_err(|e| ScrapeError::EvaluationFailed(format!("Failed to parse marked elements: {}", e)))?;
    log::debug!("Marked {} {:?} elements", nodes.len(), options.mode);
    Ok(MarkerMap::from_nodes(nodes))
}

/// Resolve a marker on the live page
///
/// Fails with [`ScrapeError::ElementNotFound`] when the marker does not exist in the
/// current document, e.g. after a navigation.
pub async fn get_element_by_marker(
    page: &dyn PageContext,
    markers: &MarkerMap,
    marker: MarkerId,
) -> Result<ElementHandle> {
    let script = render_script(MARKER_LOOKUP_JS, &json!({ "marker": marker.0, "html": false }))?;
    let found = page.evaluate(&script).await?;
    if found.is_null() {
        return Err(ScrapeError::ElementNotFound(format!("No element with marker {}", marker)));
    }

    Ok(ElementHandle {
        marker: Some(marker),
        selector: marker_selector(marker),
        node: markers.get(marker).cloned(),
    })
}

/// JSON description of a marked element: tag, role, accessible name, text, box and CSS path
pub fn describe_marker(markers: &MarkerMap, marker: MarkerId) -> Result<String> {
    let node = markers
        .get(marker)
        .ok_or_else(|| ScrapeError::ElementNotFound(format!("No element with marker {}", marker)))?;
    Ok(serde_json::to_string_pretty(node)?)
}

/// Outer HTML of a marked element with links made absolute, truncated to `max_len` bytes
pub async fn marker_html(page: &dyn PageContext, marker: MarkerId, max_len: usize) -> Result<Option<String>> {
    let script = render_script(
        MARKER_LOOKUP_JS,
        &json!({ "marker": marker.0, "html": true, "max_html": max_len }),
    )?;
    let value = page.evaluate(&script).await?;
    Ok(value.as_str().map(str::to_string))
}

/// Number of elements in the document matching `selector`
pub async fn count_matching(page: &dyn PageContext, selector: &str) -> Result<usize> {
    let script = format!("document.querySelectorAll({}).length", serde_json::to_string(selector)?);
    Ok(page.evaluate(&script).await?.as_u64().unwrap_or(0) as usize)
}
