//! Contentfulness ranking for repeated-item discovery.
//!
//! The ranking only decides which elements are shown to the model, so it is pluggable
//! through [`ContentScorer`].

use crate::dom::ElementNode;
use std::collections::HashMap;

/// Scores how much meaningful content an element carries
pub trait ContentScorer: Send + Sync {
    /// Non-negative score; zero excludes the element
    fn score(&self, node: &ElementNode) -> f64;
}

/// Visible text length, discounted by link text, scaled by the log of the child count
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDensityScorer;

impl ContentScorer for TextDensityScorer {
    fn score(&self, node: &ElementNode) -> f64 {
        let on_screen = node.bounding_box.as_ref().is_some_and(|b| b.is_visible());
        if !node.is_visible || !on_screen {
            return 0.0;
        }
        let text = node.text_length as f64 * (1.0 - node.link_density());
        text * (2.0 + node.child_count as f64).ln()
    }
}

/// Visual group of an element: its depth plus the tag and classes it renders with
pub fn group_key(node: &ElementNode) -> String {
    let Some(last) = node.path.last() else {
        return format!("0|{}", node.tag_name);
    };
    let classes: Vec<&str> = last.stable_classes().collect();
    format!("{}|{}.{}", node.path.len(), last.tag, classes.join("."))
}

/// Highest scoring elements, at most `max_per_group` from any visual group
pub fn rank_candidates<'a>(
    nodes: impl IntoIterator<Item = &'a ElementNode>,
    scorer: &dyn ContentScorer,
    max_candidates: usize,
    max_per_group: usize,
) -> Vec<&'a ElementNode> {
    let mut scored: Vec<(f64, &ElementNode)> = nodes
        .into_iter()
        .map(|node| (scorer.score(node), node))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut per_group: HashMap<String, usize> = HashMap::new();
    scored
        .into_iter()
        .filter(|(_, node)| {
            let taken = per_group.entry(group_key(node)).or_insert(0);
            *taken += 1;
            *taken <= max_per_group
        })
        .take(max_candidates)
        .map(|(_, node)| node)
        .collect()
}
