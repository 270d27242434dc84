//! CSS selector derivation from structural element paths.
//!
//! The page scripts report every element's path from `<body>` as a list of
//! [`PathSegment`]s. From those paths this module derives exact selectors (to relocate
//! one element in another tab) and generalized [`CommonSelectors`] describing a
//! repeated list item.

use serde::{Deserialize, Serialize};

/// Maximum number of shared classes used in a generalized compound selector
const MAX_SHARED_CLASSES: usize = 2;

/// One step of an element's path from `<body>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,

    /// 1-based position among the parent's element children
    #[serde(default = "default_nth")]
    pub nth_child: usize,
}

fn default_nth() -> usize {
    1
}

impl PathSegment {
    pub fn new(tag: impl Into<String>, nth_child: usize) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            nth_child,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Classes that can be written verbatim in a selector
    pub fn stable_classes(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .map(String::as_str)
            .filter(|c| is_css_identifier(c))
    }

    fn stable_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| is_css_identifier(id))
    }

    /// `tag:nth-child(n)`, exact among siblings
    fn positional(&self) -> String {
        format!("{}:nth-child({})", self.tag, self.nth_child)
    }

    /// `tag.class1.class2`, or the positional form when there is no usable class
    fn readable(&self) -> String {
        let classes: Vec<&str> = self.stable_classes().collect();
        if classes.is_empty() {
            self.positional()
        } else {
            compound(&self.tag, &classes)
        }
    }
}

/// Selectors describing a repeated item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonSelectors {
    /// Matches every repeated item
    pub items_selector: String,

    /// Closest common container of the items
    pub ancestor_selector: String,

    /// Matches the elements the selectors were derived from
    pub anchors_selector: String,
}

/// Whether `value` can be used as a CSS identifier without escaping
pub fn is_css_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let starts_ok = first.is_ascii_alphabetic()
        || first == '_'
        || (first == '-' && value.chars().nth(1).is_some_and(|c| c.is_ascii_alphabetic() || c == '_'));
    starts_ok && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn compound(tag: &str, classes: &[&str]) -> String {
    let mut out = tag.to_string();
    for class in classes {
        out.push('.');
        out.push_str(class);
    }
    out
}

/// Exact selector for the element at the end of `path`.
///
/// Anchors on the closest ancestor with a usable id, then descends by position.
pub fn structural_selector(path: &[PathSegment]) -> String {
    let start = path.iter().rposition(|segment| segment.stable_id().is_some());
    let mut parts: Vec<String> = Vec::with_capacity(path.len());

    let rest = match start {
        Some(index) => {
            if let Some(id) = path[index].stable_id() {
                parts.push(format!("#{}", id));
            }
            &path[index + 1..]
        }
        None => {
            parts.push("body".to_string());
            path.get(1..).unwrap_or(&[])
        }
    };

    parts.extend(rest.iter().map(PathSegment::positional));
    parts.join(" > ")
}

/// Selector for a container path, preferring classes over positions where available
pub fn readable_selector(path: &[PathSegment]) -> String {
    let start = path.iter().rposition(|segment| segment.stable_id().is_some());
    let mut parts: Vec<String> = Vec::with_capacity(path.len());

    let rest = match start {
        Some(index) => {
            if let Some(id) = path[index].stable_id() {
                parts.push(format!("#{}", id));
            }
            &path[index + 1..]
        }
        None => {
            parts.push("body".to_string());
            path.get(1..).unwrap_or(&[])
        }
    };

    parts.extend(rest.iter().map(PathSegment::readable));
    parts.join(" > ")
}

fn common_prefix_len(paths: &[&[PathSegment]]) -> usize {
    let shortest = paths.iter().map(|p| p.len()).min().unwrap_or(0);
    (0..shortest)
        .take_while(|&i| paths.iter().all(|p| p[i] == paths[0][i]))
        .count()
}

fn shared_classes<'a>(segments: &[&'a PathSegment]) -> Vec<&'a str> {
    let Some(first) = segments.first() else {
        return Vec::new();
    };
    first
        .stable_classes()
        .filter(|class| segments.iter().all(|s| s.classes.iter().any(|c| c == class)))
        .take(MAX_SHARED_CLASSES)
        .collect()
}

/// Whether the last compound of `selector` is a bare tag reached through a descendant combinator.
///
/// `ul li` is too broad, `ul > li` and `ul li.card` are not.
pub fn is_overbroad_selector(selector: &str) -> bool {
    let trimmed = selector.trim();
    let boundary = trimmed.rfind(|c: char| c.is_whitespace() || matches!(c, '>' | '+' | '~'));
    let (before, last) = match boundary {
        Some(index) => (&trimmed[..index + 1], &trimmed[index + 1..]),
        None => ("", trimmed),
    };

    let bare_tag = !last.is_empty() && last.chars().all(|c| c.is_ascii_alphanumeric() || c == '*');
    if !bare_tag {
        return false;
    }

    !before.trim_end().ends_with('>')
}

/// Derive the repeated-item selectors from the paths of up to a few anchor elements.
///
/// With one anchor the item is the anchor itself and the container its parent. With
/// several, the container is their longest common ancestor and each item is the
/// container child holding an anchor. Returns `None` when the anchors do not describe
/// a consistent list (nested anchors, differing item tags, over-broad result).
pub fn infer_common_selectors(anchors: &[Vec<PathSegment>]) -> Option<CommonSelectors> {
    let mut unique: Vec<&[PathSegment]> = Vec::new();
    for anchor in anchors {
        if !anchor.is_empty() && !unique.contains(&anchor.as_slice()) {
            unique.push(anchor.as_slice());
        }
    }

    let first = *unique.first()?;

    let prefix_len = if unique.len() == 1 {
        if first.len() < 2 {
            return None;
        }
        first.len() - 1
    } else {
        let prefix_len = common_prefix_len(&unique);
        if prefix_len == 0 || unique.iter().any(|p| p.len() <= prefix_len) {
            return None;
        }
        prefix_len
    };

    let item_segments: Vec<&PathSegment> = unique.iter().map(|p| &p[prefix_len]).collect();
    let tag = &item_segments[0].tag;
    if item_segments.iter().any(|s| &s.tag != tag) {
        return None;
    }

    let ancestor_selector = readable_selector(&first[..prefix_len]);
    let items_selector = format!(
        "{} > {}",
        ancestor_selector,
        compound(tag, &shared_classes(&item_segments))
    );

    if is_overbroad_selector(&items_selector) {
        return None;
    }

    let anchors_selector = if unique.iter().all(|p| p.len() == prefix_len + 1) {
        items_selector.clone()
    } else {
        let lasts: Vec<&PathSegment> = unique.iter().filter_map(|p| p.last()).collect();
        let anchor_tag = &lasts[0].tag;
        if lasts.iter().all(|s| &s.tag == anchor_tag) {
            format!("{} {}", items_selector, compound(anchor_tag, &shared_classes(&lasts)))
        } else {
            items_selector.clone()
        }
    };

    Some(CommonSelectors {
        items_selector,
        ancestor_selector,
        anchors_selector,
    })
}
