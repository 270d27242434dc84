//! DOM-level building blocks
//!
//! This module provides the page-side primitives the analyzer and the scraper are built on:
//! - ElementNode / MarkerMap: marked elements and their descriptions
//! - markers: marking passes and marker lookup
//! - actions: click / fill / select / press-enter with script fallbacks
//! - mutation: observer-based detection of newly added items
//! - selector: CSS selector derivation from element paths

pub mod actions;
pub mod element;
pub mod markers;
pub mod mutation;
pub mod selector;
pub mod selector_map;

pub use element::{BoundingBox, ElementNode, MarkerId};
pub use markers::{
    ElementHandle, MarkMode, MarkOptions, count_matching, describe_marker, get_element_by_marker, mark_elements, marker_html,
};
pub use mutation::MutationTracker;
pub use selector::{CommonSelectors, PathSegment, infer_common_selectors, is_overbroad_selector};
pub use selector_map::MarkerMap;

use crate::error::Result;
use serde::Serialize;

/// Placeholder page scripts use for their JSON argument object
const ARGS_PLACEHOLDER: &str = "__ARGS__";

/// Substitute `args` (serialized as JSON) into a page script template
pub(crate) fn render_script(template: &str, args: &impl Serialize) -> Result<String> {
    let args = serde_json::to_string(args)?;
    Ok(template.replace(ARGS_PLACEHOLDER, &args))
}
