use crate::dom::element::{ElementNode, MarkerId};
use crate::dom::selector::structural_selector;
use indexmap::IndexMap;

/// Map of marker IDs to the elements they were assigned to
/// Uses IndexMap to preserve document order
#[derive(Debug, Clone, Default)]
pub struct MarkerMap {
    map: IndexMap<MarkerId, ElementNode>,
}

impl MarkerMap {
    /// Create a new empty MarkerMap
    pub fn new() -> Self {
        Self { map: IndexMap::new() }
    }

    /// Build a map from elements reported by the page, keeping the first report of each marker
    pub fn from_nodes(nodes: impl IntoIterator<Item = ElementNode>) -> Self {
        let mut map = Self::new();
        for node in nodes {
            map.register(node);
        }
        map
    }

    /// Register an element; returns false if the marker was already known
    pub fn register(&mut self, node: ElementNode) -> bool {
        if self.map.contains_key(&node.marker) {
            return false;
        }
        self.map.insert(node.marker, node);
        true
    }

    /// Get element by marker
    pub fn get(&self, marker: MarkerId) -> Option<&ElementNode> {
        self.map.get(&marker)
    }

    /// Check if marker exists
    pub fn contains(&self, marker: MarkerId) -> bool {
        self.map.contains_key(&marker)
    }

    /// Get the number of registered elements
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all elements in document order
    pub fn nodes(&self) -> impl Iterator<Item = &ElementNode> {
        self.map.values()
    }

    /// Get all markers
    pub fn markers(&self) -> impl Iterator<Item = &MarkerId> {
        self.map.keys()
    }

    /// Exact CSS selector for a marked element, usable in a page without markers
    pub fn css_selector(&self, marker: MarkerId) -> Option<String> {
        self.get(marker)
            .filter(|node| !node.path.is_empty())
            .map(|node| structural_selector(&node.path))
    }

    /// Prompt listing, one element per line
    pub fn to_prompt_listing(&self) -> String {
        self.nodes()
            .map(ElementNode::to_simple_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Export to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.map.values().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::selector::PathSegment;

    #[test]
    fn test_marker_map_register() {
        let mut map = MarkerMap::new();

        assert!(map.register(ElementNode::new(4, "button")));
        assert!(map.register(ElementNode::new(9, "a")));
        assert!(!map.register(ElementNode::new(4, "div")));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(MarkerId(4)).unwrap().tag_name, "button");
    }

    #[test]
    fn test_marker_map_order() {
        let map = MarkerMap::from_nodes(vec![
            ElementNode::new(3, "a"),
            ElementNode::new(1, "button"),
            ElementNode::new(2, "input"),
        ]);

        let markers: Vec<_> = map.markers().map(|m| m.0).collect();
        assert_eq!(markers, vec![3, 1, 2]);
    }

    #[test]
    fn test_css_selector() {
        let node = ElementNode::new(5, "a").with_path(vec![
            PathSegment::new("body", 2),
            PathSegment::new("nav", 1).with_id("pager"),
            PathSegment::new("a", 3),
        ]);
        let map = MarkerMap::from_nodes(vec![node, ElementNode::new(6, "span")]);

        assert_eq!(map.css_selector(MarkerId(5)).as_deref(), Some("#pager > a:nth-child(3)"));
        assert!(map.css_selector(MarkerId(6)).is_none());
        assert!(map.css_selector(MarkerId(99)).is_none());
    }

    #[test]
    fn test_prompt_listing_and_json() {
        let map = MarkerMap::from_nodes(vec![
            ElementNode::new(1, "button").with_name("Load more"),
            ElementNode::new(2, "a").with_name("Next"),
        ]);

        let listing = map.to_prompt_listing();
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("[1] <button> Load more"));

        let json = map.to_json().unwrap();
        assert!(json.contains("Load more"));
        assert!(json.contains("\"marker\": 2"));
    }
}
