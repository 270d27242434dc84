use crate::dom::selector::PathSegment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a marked DOM element, valid for the lifetime of the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Description of a marked DOM element as reported by the page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementNode {
    /// Marker assigned to this element
    pub marker: MarkerId,

    /// HTML tag name (e.g., "div", "button", "input")
    pub tag_name: String,

    /// Explicit or implicit ARIA role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Accessible name (aria-label, label text, alt, or visible text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Accessible description (aria-description, title or placeholder)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Visible text, truncated by the page script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,

    /// Link target for anchors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    /// Whether the element is rendered with a non-empty box
    #[serde(default)]
    pub is_visible: bool,

    /// Whether the element is interactive (clickable, input, etc.)
    #[serde(default)]
    pub is_interactive: bool,

    /// Document-relative bounding box
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    /// Structural path from `<body>` down to this element
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,

    /// Length of the element's full visible text
    #[serde(default)]
    pub text_length: usize,

    /// Length of the visible text inside descendant links
    #[serde(default)]
    pub link_text_length: usize,

    /// Number of element children
    #[serde(default)]
    pub child_count: usize,
}

/// Bounding box coordinates for an element
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementNode {
    /// Create a new ElementNode
    pub fn new(marker: u64, tag_name: impl Into<String>) -> Self {
        Self {
            marker: MarkerId(marker),
            tag_name: tag_name.into(),
            role: None,
            name: None,
            description: None,
            text_content: None,
            href: None,
            is_visible: false,
            is_interactive: false,
            bounding_box: None,
            path: Vec::new(),
            text_length: 0,
            link_text_length: 0,
            child_count: 0,
        }
    }

    /// Builder method: set text content (also updates the text length)
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text_length = text.chars().count();
        self.text_content = Some(text);
        self
    }

    /// Builder method: set accessible name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method: set role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Builder method: set visibility
    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.is_visible = visible;
        self
    }

    /// Builder method: set bounding box
    pub fn with_bounding_box(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounding_box = Some(BoundingBox { x, y, width, height });
        self
    }

    /// Builder method: set structural path
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Builder method: set text statistics
    pub fn with_text_stats(mut self, text_length: usize, link_text_length: usize, child_count: usize) -> Self {
        self.text_length = text_length;
        self.link_text_length = link_text_length;
        self.child_count = child_count;
        self
    }

    /// Check if element is a specific tag
    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }

    /// Share of the visible text that sits inside links
    pub fn link_density(&self) -> f64 {
        if self.text_length == 0 {
            return 0.0;
        }
        (self.link_text_length as f64 / self.text_length as f64).min(1.0)
    }

    /// One-line rendering used in model prompts, e.g. `[12] <button role="button"> Next page`
    pub fn to_simple_string(&self) -> String {
        let mut parts = vec![format!("[{}] <{}", self.marker, self.tag_name)];

        if let Some(role) = &self.role {
            parts.push(format!(" role=\"{}\"", role));
        }

        if let Some(href) = &self.href {
            parts.push(format!(" href=\"{}\"", href));
        }

        parts.push(">".to_string());

        if let Some(name) = self.name.as_deref().or(self.text_content.as_deref()) {
            if !name.trim().is_empty() {
                parts.push(format!(" {}", name.trim()));
            }
        }

        if let Some(description) = &self.description {
            if !description.trim().is_empty() {
                parts.push(format!(" ({})", description.trim()));
            }
        }

        if let Some(bbox) = &self.bounding_box {
            parts.push(format!(" @({:.0},{:.0} {:.0}x{:.0})", bbox.x, bbox.y, bbox.width, bbox.height));
        }

        parts.join("")
    }
}

impl BoundingBox {
    /// Create a new BoundingBox
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check if the bounding box is visible (has non-zero dimensions)
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Calculate the area of the bounding box
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}
