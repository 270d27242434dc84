//! Page analysis: structural judgments about a page, each made by the decision model
//! from page evidence and, where it matters, checked empirically against the live page.
//!
//! Model answers are hypotheses. A pagination button is only reported after clicking it
//! in an isolated page actually produced a next page, and an item selector only after it
//! matches a list on the page.

pub mod scoring;
pub mod screenshot;

pub use scoring::{ContentScorer, TextDensityScorer, rank_candidates};

use crate::browser::PageContext;
use crate::dom::actions;
use crate::dom::{
    CommonSelectors, ElementHandle, ElementNode, MarkOptions, MarkerId, MutationTracker, PathSegment,
    count_matching, get_element_by_marker, infer_common_selectors, mark_elements, marker_html,
};
use crate::error::{Result, ScrapeError};
use crate::model::{DecisionModel, Message, decide, truncate_chars};
use crate::scraper::content::html_to_markdown;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const PAGE_SIGNATURE_JS: &str = include_str!("../dom/js/page_signature.js");

/// Markup fetched per item candidate
const MAX_CANDIDATE_HTML: usize = 20_000;

/// Markdown shown to the model per item candidate
const MAX_CANDIDATE_MARKDOWN: usize = 800;

/// Matches an inferred item selector needs before it counts as a list
const MIN_LIST_ITEMS: usize = 2;

const SCRAPING_TYPE_PROMPT: &str = "You classify web pages for data extraction. \
Answer \"list-like\" when the main content is a collection of repeated, structurally similar entries \
(search results, product grids, feeds, listings, tables of records). \
Answer \"single\" when the page presents one main entity (an article, a product detail page, a profile).";

const PAGINATION_PROMPT: &str = "You find pagination controls. \
The screenshot outlines interactive elements, listed below as [id] <tag> name. \
Pick the one element that loads the next page of the main content: a \"next\" link or arrow, \
the following page number, or a \"load more\" / \"show more\" button. \
Filters, sorting, tabs, menus and links to individual items are not pagination. \
If no element clearly does this, answer -1. Do not guess.";

const NAVIGATION_CHECK_PROMPT: &str = "You verify pagination. \
You get the page before and after clicking a candidate pagination control. \
Answer true only if the click led to a logically next page of the same content \
(new entries replacing or extending the old ones). \
Answer false if it merely opened or closed a panel, menu, dialog or overlay, or changed nothing meaningful.";

const SIMILAR_ITEMS_PROMPT: &str = "You find the main repeated list on a web page. \
Candidates are given as [id] followed by their content in markdown. \
Select the ids of elements that are entries of the most meaningful repeated list: \
structurally similar siblings with non-trivial content such as results, products, posts or records. \
Never select navigation, pagination controls, footers or ads. \
Prefer whole entries over fragments of an entry. Answer with an empty list if there is no such list.";

/// Structural shape of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ScrapingType {
    /// One main entity
    #[serde(rename = "single")]
    Single,
    /// Repeated, structurally similar entries
    #[serde(rename = "list-like")]
    ListLike,
}

impl fmt::Display for ScrapingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapingType::Single => write!(f, "single"),
            ScrapingType::ListLike => write!(f, "list-like"),
        }
    }
}

impl FromStr for ScrapingType {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ScrapingType::Single),
            "list-like" | "list" => Ok(ScrapingType::ListLike),
            other => Err(ScrapeError::InvalidConfig(format!("unknown scraping type '{}'", other))),
        }
    }
}

/// Tuning knobs for [`PageAnalyzer`]
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Wait after a navigation before gathering evidence
    pub navigation_settle: Duration,
    /// Scroll steps of the infinite-scroll probe
    pub scroll_steps: usize,
    /// Wait after each scroll step
    pub scroll_wait: Duration,
    /// New items needed to confirm infinite scroll when the item selector is known
    pub item_threshold: usize,
    /// New elements needed when no item selector is known
    pub untargeted_threshold: usize,
    /// Item candidates shown to the model
    pub max_candidates: usize,
    /// Item candidates taken from a single visual group
    pub max_per_group: usize,
    /// Selected items used to derive selectors
    pub max_anchors: usize,
    /// Wait after clicking a pagination candidate
    pub click_settle: Duration,
    /// How long to wait for new items after a pagination click
    pub mutation_timeout: Duration,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            navigation_settle: Duration::from_millis(1000),
            scroll_steps: 10,
            scroll_wait: Duration::from_millis(500),
            item_threshold: 3,
            untargeted_threshold: 10,
            max_candidates: 40,
            max_per_group: 5,
            max_anchors: 3,
            click_settle: Duration::from_millis(1500),
            mutation_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the analyzer learned about a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub url: String,
    pub scraping_type: ScrapingType,
    pub selectors: Option<CommonSelectors>,
    pub pagination_button_selector: Option<String>,
    pub infinite_scroll: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ScrapingTypeDecision {
    scraping_type: ScrapingType,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PaginationDecision {
    /// Id of the pagination element, or -1 when there is none
    element_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NavigationCheck {
    /// Whether the click advanced to a next page
    advanced: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SimilarItemsDecision {
    element_ids: Vec<u64>,
}

/// Cheap fingerprint of the page state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct PageSignature {
    url: String,
    title: String,
    text_hash: u64,
    element_count: u64,
}

async fn page_signature(page: &dyn PageContext) -> Result<PageSignature> {
    let value = page.evaluate(PAGE_SIGNATURE_JS).await?;
    serde_json::from_value(value)
        .map_err(|e| ScrapeError::EvaluationFailed(format!("Failed to parse page signature: {}", e)))
}

pub struct PageAnalyzer {
    model: Arc<dyn DecisionModel>,
    scorer: Arc<dyn ContentScorer>,
    options: AnalyzerOptions,
}

impl PageAnalyzer {
    pub fn new(model: Arc<dyn DecisionModel>) -> Self {
        Self {
            model,
            scorer: Arc::new(TextDensityScorer),
            options: AnalyzerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the contentfulness ranking used for item discovery
    pub fn with_scorer(mut self, scorer: Arc<dyn ContentScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    async fn open(&self, page: &dyn PageContext, url: Option<&str>) -> Result<()> {
        if let Some(url) = url {
            page.goto(url).await?;
            tokio::time::sleep(self.options.navigation_settle).await;
        }
        Ok(())
    }

    /// Classify the page as a single entity or a list of similar items
    pub async fn infer_scraping_type(&self, page: &dyn PageContext, url: Option<&str>) -> Result<ScrapingType> {
        self.open(page, url).await?;
        let screenshot = page.screenshot(false).await?;
        let current = page.current_url().await?;
        let title = page.title().await?;

        let messages = [
            Message::system(SCRAPING_TYPE_PROMPT),
            Message::user(format!(
                "URL: {}\nTitle: {}\n\nIs this page a list of similar items or a single item?",
                current, title
            ))
            .with_png(&screenshot),
        ];
        let decision: ScrapingTypeDecision = decide(self.model.as_ref(), "scraping_type", &messages).await?;
        log::info!("{} is {}", current, decision.scraping_type);
        Ok(decision.scraping_type)
    }

    /// Selector of a validated "next page" control, or `None`.
    ///
    /// The model picks a candidate among the interactive elements; the candidate is then
    /// clicked in a forked page and only returned if that produced a next page.
    pub async fn get_pagination_button(
        &self,
        page: &dyn PageContext,
        url: Option<&str>,
        items_selector: Option<&str>,
    ) -> Result<Option<String>> {
        self.open(page, url).await?;
        let markers = mark_elements(page, MarkOptions::interactive()).await?;
        if markers.is_empty() {
            log::info!("No interactive elements, so no pagination");
            return Ok(None);
        }

        let raw = page.screenshot(true).await?;
        let nodes: Vec<&ElementNode> = markers.nodes().collect();
        let annotated = match screenshot::annotate(&raw, &nodes, 1.0) {
            Ok(png) => png,
            Err(e) => {
                log::warn!("Could not annotate screenshot: {}", e);
                raw
            }
        };
        let current = page.current_url().await?;
        let title = page.title().await?;

        let messages = [
            Message::system(PAGINATION_PROMPT),
            Message::user(format!(
                "URL: {}\nTitle: {}\n\nInteractive elements:\n{}",
                current,
                title,
                markers.to_prompt_listing()
            ))
            .with_png(&annotated),
        ];
        let decision: PaginationDecision = decide(self.model.as_ref(), "pagination_button", &messages).await?;
        if decision.element_id < 0 {
            log::info!("No pagination control on {}", current);
            return Ok(None);
        }

        let marker = MarkerId(decision.element_id as u64);
        let handle = match get_element_by_marker(page, &markers, marker).await {
            Ok(handle) => handle,
            Err(ScrapeError::ElementNotFound(reason)) => {
                log::warn!("Pagination candidate is gone: {}", reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(selector) = markers.css_selector(marker) else {
            log::warn!("No selector for pagination candidate {}", handle.label());
            return Ok(None);
        };

        log::info!("Validating pagination candidate {} ({})", handle.label(), selector);
        if self.validate_pagination(page, &current, &selector, items_selector).await? {
            Ok(Some(selector))
        } else {
            Ok(None)
        }
    }

    async fn validate_pagination(
        &self,
        page: &dyn PageContext,
        url: &str,
        selector: &str,
        items_selector: Option<&str>,
    ) -> Result<bool> {
        let probe = page.fork().await?;
        let outcome = self.probe_pagination(probe.as_ref(), url, selector, items_selector).await;
        if let Err(e) = probe.close().await {
            log::warn!("Failed to close probe page: {}", e);
        }

        match outcome {
            Ok(advanced) => {
                log::info!(
                    "Pagination candidate {} {}",
                    selector,
                    if advanced { "advanced the page" } else { "did not advance the page" }
                );
                Ok(advanced)
            }
            Err(e) => {
                log::info!("Pagination candidate {} failed validation: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn probe_pagination(
        &self,
        probe: &dyn PageContext,
        url: &str,
        selector: &str,
        items_selector: Option<&str>,
    ) -> Result<bool> {
        probe.goto(url).await?;
        tokio::time::sleep(self.options.navigation_settle).await;

        let tracker = items_selector.map(|items| MutationTracker::new("body", items));
        if let Some(tracker) = &tracker {
            tracker.init_observer(probe).await?;
        }
        let before = page_signature(probe).await?;
        let before_shot = match &tracker {
            Some(_) => None,
            None => Some(probe.screenshot(false).await?),
        };

        let confirmation = actions::click(probe, &ElementHandle::from_selector(selector)).await?;
        log::debug!("{}", confirmation);

        if let Some(tracker) = &tracker {
            if tracker.has_items_added(probe, self.options.mutation_timeout).await? {
                return Ok(true);
            }
            // A full navigation drops the observer; accept a new URL that lists the same items
            let after = page_signature(probe).await?;
            return Ok(after.url != before.url && count_matching(probe, tracker.items_selector()).await? > 0);
        }

        tokio::time::sleep(self.options.click_settle).await;
        let after = page_signature(probe).await?;
        if after == before {
            log::debug!("Clicking {} changed nothing", selector);
            return Ok(false);
        }

        let after_shot = probe.screenshot(false).await?;
        let mut before_message = Message::user(format!("Before the click.\nURL: {}\nTitle: {}", before.url, before.title));
        if let Some(shot) = &before_shot {
            before_message = before_message.with_png(shot);
        }
        let messages = [
            Message::system(NAVIGATION_CHECK_PROMPT),
            before_message,
            Message::user(format!("After the click.\nURL: {}\nTitle: {}", after.url, after.title)).with_png(&after_shot),
        ];
        let check: NavigationCheck = decide(self.model.as_ref(), "pagination_check", &messages).await?;
        Ok(check.advanced)
    }

    /// Whether scrolling to the bottom loads more content.
    ///
    /// Scrolls in equal steps and stops as soon as enough new matching elements appeared.
    pub async fn support_infinite_scroll(
        &self,
        page: &dyn PageContext,
        url: Option<&str>,
        items_selector: Option<&str>,
    ) -> Result<bool> {
        self.open(page, url).await?;
        let threshold = match items_selector {
            Some(_) => self.options.item_threshold,
            None => self.options.untargeted_threshold,
        };
        let tracker = MutationTracker::new("body", items_selector.unwrap_or("*"));
        tracker.init_observer(page).await?;

        let steps = self.options.scroll_steps.max(1);
        for step in 1..=steps {
            actions::scroll_to_fraction(page, step as f64 / steps as f64).await?;
            tokio::time::sleep(self.options.scroll_wait).await;
            let added = tracker.added_count(page).await?;
            if added >= threshold {
                log::info!("Infinite scroll confirmed after {} steps ({} new elements)", step, added);
                return Ok(true);
            }
        }

        log::info!("No infinite scroll: fewer than {} new elements", threshold);
        Ok(false)
    }

    /// Selectors describing the page's main repeated item, or `None` if there is no clear list
    pub async fn infer_similar_items_selector(
        &self,
        page: &dyn PageContext,
        url: Option<&str>,
    ) -> Result<Option<CommonSelectors>> {
        self.open(page, url).await?;
        let markers = mark_elements(page, MarkOptions::content()).await?;
        let candidates = rank_candidates(
            markers.nodes(),
            self.scorer.as_ref(),
            self.options.max_candidates,
            self.options.max_per_group,
        );
        if candidates.is_empty() {
            log::info!("No content candidates");
            return Ok(None);
        }

        let mut listing = Vec::with_capacity(candidates.len());
        for node in &candidates {
            let Some(html) = marker_html(page, node.marker, MAX_CANDIDATE_HTML).await? else {
                continue;
            };
            let markdown = truncate_chars(&html_to_markdown(&html), MAX_CANDIDATE_MARKDOWN);
            if !markdown.is_empty() {
                listing.push(format!("[{}]\n{}", node.marker, markdown));
            }
        }
        if listing.is_empty() {
            return Ok(None);
        }

        let screenshot = page.screenshot(true).await?;
        let messages = [
            Message::system(SIMILAR_ITEMS_PROMPT),
            Message::user(format!("Candidates:\n\n{}", listing.join("\n\n"))).with_png(&screenshot),
        ];
        let decision: SimilarItemsDecision = decide(self.model.as_ref(), "similar_items", &messages).await?;

        let anchors: Vec<Vec<PathSegment>> = decision
            .element_ids
            .iter()
            .filter_map(|id| candidates.iter().find(|node| node.marker.0 == *id))
            .take(self.options.max_anchors)
            .map(|node| node.path.clone())
            .collect();
        if anchors.is_empty() {
            log::info!("Model found no repeated list");
            return Ok(None);
        }

        let Some(selectors) = infer_common_selectors(&anchors) else {
            log::info!("Selected items do not share a usable selector");
            return Ok(None);
        };
        let matches = count_matching(page, &selectors.items_selector).await?;
        if matches < MIN_LIST_ITEMS {
            log::info!("Item selector {} matches only {} elements", selectors.items_selector, matches);
            return Ok(None);
        }

        log::info!("Items: {} ({} matches)", selectors.items_selector, matches);
        Ok(Some(selectors))
    }

    /// Run every analysis on `url` and collect the results
    pub async fn analyze(&self, page: &dyn PageContext, url: &str) -> Result<PageAnalysis> {
        let scraping_type = self.infer_scraping_type(page, Some(url)).await?;
        let (selectors, pagination_button_selector, infinite_scroll) = match scraping_type {
            ScrapingType::Single => (None, None, false),
            ScrapingType::ListLike => {
                let selectors = self.infer_similar_items_selector(page, None).await?;
                let items = selectors.as_ref().map(|s| s.items_selector.as_str());
                let pagination = self.get_pagination_button(page, None, items).await?;
                let infinite_scroll = match pagination {
                    Some(_) => false,
                    None => self.support_infinite_scroll(page, None, items).await?,
                };
                (selectors, pagination, infinite_scroll)
            }
        };

        Ok(PageAnalysis {
            url: url.to_string(),
            scraping_type,
            selectors,
            pagination_button_selector,
            infinite_scroll,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{ScriptedPage, script_args};
    use crate::model::ResponseSchema;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Replies by decision name; records the names it was asked for
    struct CannedModel {
        replies: Vec<(&'static str, &'static str)>,
        asked: Mutex<Vec<String>>,
    }

    impl CannedModel {
        fn new(replies: Vec<(&'static str, &'static str)>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                asked: Mutex::new(Vec::new()),
            })
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DecisionModel for CannedModel {
        async fn complete(&self, _messages: &[Message], schema: Option<&ResponseSchema>) -> Result<String> {
            let name = schema.map(|s| s.name.clone()).unwrap_or_default();
            self.asked.lock().unwrap().push(name.clone());
            self.replies
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, reply)| reply.to_string())
                .ok_or_else(|| ScrapeError::ModelRequestFailed(format!("unexpected decision {}", name)))
        }
    }

    fn fast_options() -> AnalyzerOptions {
        AnalyzerOptions {
            navigation_settle: Duration::ZERO,
            scroll_wait: Duration::ZERO,
            click_settle: Duration::ZERO,
            mutation_timeout: Duration::from_millis(250),
            ..AnalyzerOptions::default()
        }
    }

    fn signature() -> Value {
        json!({ "url": "https://shop.test/list", "title": "Shop", "text_hash": 7, "element_count": 120 })
    }

    fn next_button() -> Value {
        json!([{
            "marker": 1,
            "tag_name": "button",
            "name": "Next",
            "is_visible": true,
            "is_interactive": true,
            "bounding_box": { "x": 2.0, "y": 2.0, "width": 10.0, "height": 6.0 },
            "path": [
                { "tag": "body", "nth_child": 2 },
                { "tag": "main", "id": "results", "nth_child": 1 },
                { "tag": "button", "nth_child": 4 }
            ]
        }])
    }

    /// Page whose scripts answer by their distinguishing content
    fn list_page() -> ScriptedPage {
        ScriptedPage::new("https://shop.test/list", "Shop", |script| {
            if script.contains("MARKER_ATTR") {
                next_button()
            } else if script.contains("text_hash") {
                signature()
            } else if script.contains("data-harvest-marker=\"' + args.marker") {
                json!(true)
            } else {
                Value::Null
            }
        })
    }

    #[test]
    fn test_scraping_type_serde() {
        assert_eq!(serde_json::to_value(ScrapingType::ListLike).unwrap(), "list-like");
        let parsed: ScrapingType = serde_json::from_str("\"single\"").unwrap();
        assert_eq!(parsed, ScrapingType::Single);
        assert_eq!("List-Like".parse::<ScrapingType>().unwrap(), ScrapingType::ListLike);
        assert!("grid".parse::<ScrapingType>().is_err());
    }

    #[test]
    fn test_default_thresholds() {
        let options = AnalyzerOptions::default();
        assert_eq!(options.scroll_steps, 10);
        assert_eq!(options.item_threshold, 3);
        assert_eq!(options.untargeted_threshold, 10);
        assert_eq!(options.max_anchors, 3);
    }

    #[tokio::test]
    async fn test_infer_scraping_type() {
        let model = CannedModel::new(vec![("scraping_type", r#"{"scraping_type": "list-like"}"#)]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());
        let page = list_page();

        let kind = analyzer
            .infer_scraping_type(&page, Some("https://shop.test/list"))
            .await
            .unwrap();

        assert_eq!(kind, ScrapingType::ListLike);
        assert_eq!(page.gotos.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_none_when_model_declines() {
        let model = CannedModel::new(vec![("pagination_button", r#"{"element_id": -1}"#)]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());
        let page = list_page();

        let found = analyzer.get_pagination_button(&page, None, None).await.unwrap();

        assert!(found.is_none());
        assert_eq!(model.asked(), vec!["pagination_button"]);
    }

    #[tokio::test]
    async fn test_decorative_button_is_rejected_without_model() {
        // The signature never changes, so the click did nothing
        let model = CannedModel::new(vec![("pagination_button", r#"{"element_id": 1}"#)]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());
        let page = list_page();

        let found = analyzer.get_pagination_button(&page, None, None).await.unwrap();

        assert!(found.is_none());
        assert_eq!(model.asked(), vec!["pagination_button"]);
    }

    #[tokio::test]
    async fn test_pagination_accepted_when_items_appear() {
        let model = CannedModel::new(vec![("pagination_button", r#"{"element_id": 1}"#)]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());
        let page = ScriptedPage::new("https://shop.test/list", "Shop", |script| {
            if script.contains("MARKER_ATTR") {
                next_button()
            } else if script.contains("text_hash") {
                signature()
            } else if script.contains("__harvestAdded.length") {
                json!(4)
            } else {
                json!(true)
            }
        });

        let found = analyzer
            .get_pagination_button(&page, None, Some("li.card"))
            .await
            .unwrap();

        assert_eq!(found.as_deref(), Some("#results > button:nth-child(4)"));
    }

    #[tokio::test]
    async fn test_unknown_marker_is_not_pagination() {
        let model = CannedModel::new(vec![("pagination_button", r#"{"element_id": 99}"#)]);
        let analyzer = PageAnalyzer::new(model).with_options(fast_options());
        let page = list_page();

        assert!(analyzer.get_pagination_button(&page, None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_infinite_scroll_thresholds() {
        let model = CannedModel::new(vec![]);
        let analyzer = PageAnalyzer::new(model).with_options(fast_options());

        // Four new elements: enough for a known item selector, not for an untargeted probe
        let page = ScriptedPage::new("https://feed.test", "Feed", |script| {
            if script.contains("__harvestAdded.length") {
                json!(4)
            } else {
                json!(true)
            }
        });

        assert!(analyzer.support_infinite_scroll(&page, None, Some("article")).await.unwrap());
        assert_eq!(page.evaluated("window.scrollTo"), 1);

        assert!(!analyzer.support_infinite_scroll(&page, None, None).await.unwrap());
        assert_eq!(page.evaluated("window.scrollTo"), 11);
    }
    fn product_cards() -> Value {
        let cards: Vec<Value> = (1..=3)
            .map(|i| {
                json!({
                    "marker": i,
                    "tag_name": "li",
                    "text_content": format!("Product {}", i),
                    "is_visible": true,
                    "bounding_box": { "x": 0.0, "y": i as f64 * 100.0, "width": 300.0, "height": 90.0 },
                    "path": [
                        { "tag": "body", "nth_child": 1 },
                        { "tag": "ul", "classes": ["results"], "nth_child": 1 },
                        { "tag": "li", "classes": ["card"], "nth_child": i }
                    ],
                    "text_length": 120,
                    "link_text_length": 10,
                    "child_count": 3
                })
            })
            .collect();
        json!(cards)
    }

    /// Product list page whose item selector matches `matches` elements
    fn catalog_page(matches: usize) -> ScriptedPage {
        ScriptedPage::new("https://shop.test/list", "Shop", move |script| {
            if script.contains("MARKER_ATTR") {
                product_cards()
            } else if script.contains("data-harvest-marker=\"' + args.marker") {
                let args = script_args(script);
                if args["html"].as_bool() == Some(true) {
                    json!(format!("<li class=\"card\"><h3>Product {}</h3><p>A sturdy everyday item.</p></li>", args["marker"]))
                } else {
                    json!(true)
                }
            } else if script.starts_with("document.querySelectorAll(") {
                json!(matches)
            } else {
                Value::Null
            }
        })
    }

    #[tokio::test]
    async fn test_similar_items_from_selected_candidates() {
        let model = CannedModel::new(vec![("similar_items", r#"{"element_ids": [1, 2, 3]}"#)]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());
        let page = catalog_page(3);

        let selectors = analyzer.infer_similar_items_selector(&page, None).await.unwrap().unwrap();

        assert_eq!(selectors.ancestor_selector, "body > ul.results");
        assert_eq!(selectors.items_selector, "body > ul.results > li.card");
        assert_eq!(page.evaluated("\"html\":true"), 3);
        assert_eq!(page.evaluated("document.querySelectorAll(\"body > ul.results > li.card\")"), 1);
        assert_eq!(model.asked(), vec!["similar_items"]);
    }

    #[tokio::test]
    async fn test_similar_items_need_several_matches() {
        let model = CannedModel::new(vec![("similar_items", r#"{"element_ids": [1, 2]}"#)]);
        let analyzer = PageAnalyzer::new(model).with_options(fast_options());

        let found = analyzer.infer_similar_items_selector(&catalog_page(1), None).await.unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_similar_items_none_when_model_selects_nothing() {
        let model = CannedModel::new(vec![("similar_items", r#"{"element_ids": [42]}"#)]);
        let analyzer = PageAnalyzer::new(model).with_options(fast_options());
        let page = catalog_page(3);

        assert!(analyzer.infer_similar_items_selector(&page, None).await.unwrap().is_none());
        assert_eq!(page.evaluated("document.querySelectorAll(\"body"), 0);

        let model = CannedModel::new(vec![("similar_items", r#"{"element_ids": []}"#)]);
        let analyzer = PageAnalyzer::new(model).with_options(fast_options());
        assert!(analyzer.infer_similar_items_selector(&page, None).await.unwrap().is_none());
    }

    /// List page whose content changes once "next" was clicked
    fn changing_page() -> ScriptedPage {
        let clicked = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&clicked);
        ScriptedPage::new("https://shop.test/list", "Shop", move |script| {
            if script.contains("MARKER_ATTR") {
                next_button()
            } else if script.contains("text_hash") {
                if seen.load(Ordering::SeqCst) {
                    json!({ "url": "https://shop.test/list?page=2", "title": "Shop", "text_hash": 8, "element_count": 118 })
                } else {
                    signature()
                }
            } else if script.contains("data-harvest-marker=\"' + args.marker") {
                json!(true)
            } else {
                Value::Null
            }
        })
        .on_click(move |_| clicked.store(true, Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_changed_page_is_judged_by_model() {
        let model = CannedModel::new(vec![
            ("pagination_button", r#"{"element_id": 1}"#),
            ("pagination_check", r#"{"advanced": true}"#),
        ]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());

        let found = analyzer.get_pagination_button(&changing_page(), None, None).await.unwrap();

        assert_eq!(found.as_deref(), Some("#results > button:nth-child(4)"));
        assert_eq!(model.asked(), vec!["pagination_button", "pagination_check"]);
    }

    #[tokio::test]
    async fn test_changed_page_rejected_when_model_says_no_advance() {
        // e.g. the click only opened a panel
        let model = CannedModel::new(vec![
            ("pagination_button", r#"{"element_id": 1}"#),
            ("pagination_check", r#"{"advanced": false}"#),
        ]);
        let analyzer = PageAnalyzer::new(model.clone()).with_options(fast_options());

        let found = analyzer.get_pagination_button(&changing_page(), None, None).await.unwrap();

        assert!(found.is_none());
        assert_eq!(model.asked(), vec!["pagination_button", "pagination_check"]);
    }
}
