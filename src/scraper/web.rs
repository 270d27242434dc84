//! DOM-backed item source.
//!
//! Items are the elements matching the configured selectors. Each element gets a
//! `data-harvest-node` id the first time it is seen; ids come from a counter owned by the
//! session, and the session's visited set decides which elements were already returned.
//! All page access happens under one async lock, held for a whole load-more plus
//! extraction cycle.

use crate::analyzer::ScrapingType;
use crate::browser::PageContext;
use crate::dom::actions;
use crate::dom::{ElementHandle, MutationTracker, render_script};
use crate::error::{Result, ScrapeError};
use crate::escalation::{HumanEscalation, InteractionKind, escalation_message};
use crate::pipeline::{ItemSource, SourceItem};
use crate::scraper::config::WebScraperConfig;
use crate::scraper::content::{html_to_markdown, item_hash};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

const COLLECT_ITEMS_JS: &str = include_str!("../dom/js/collect_items.js");
const READ_ITEMS_JS: &str = include_str!("../dom/js/read_items.js");
const WALL_CHECK_JS: &str = include_str!("../dom/js/wall_check.js");

/// Attribute carrying a node's session id
pub const NODE_ATTRIBUTE: &str = "data-harvest-node";

/// Consecutive load-more rounds that may yield no unseen content before extraction stops
const MAX_IDLE_ROUNDS: usize = 2;

#[derive(Debug, Default)]
struct Session {
    exhausted: bool,
    /// Node ids already handed out or skipped
    visited: HashSet<u64>,
    /// Content hashes returned this session
    seen_hashes: HashSet<String>,
    /// Skip-list hashes encountered this session
    matched_hashes: HashSet<String>,
    next_node_id: u64,
    last_visited: Option<u64>,
    escalated: bool,
}

#[derive(Debug, Deserialize)]
struct Collected {
    next_id: u64,
    nodes: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct ItemMarkup {
    id: u64,
    html: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WallCheck {
    captcha: bool,
    password_field: bool,
    login_text: bool,
    /// The configured ancestor exists and holds items
    content_present: bool,
}

impl WallCheck {
    /// A password field only counts as a login wall when it replaced the content
    fn kind(&self) -> Option<InteractionKind> {
        if self.captcha {
            Some(InteractionKind::Captcha)
        } else if self.login_text || (self.password_field && !self.content_present) {
            Some(InteractionKind::Login)
        } else {
            None
        }
    }
}

fn node_selector(id: u64) -> String {
    format!("[{}=\"{}\"]", NODE_ATTRIBUTE, id)
}

/// Scrapes items from a live page, loading more by scrolling or paginating
pub struct WebScraper {
    page: Arc<dyn PageContext>,
    config: WebScraperConfig,
    escalation: Option<Arc<dyn HumanEscalation>>,
    session: Mutex<Session>,
}

impl WebScraper {
    pub fn new(page: Arc<dyn PageContext>, config: WebScraperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            page,
            config,
            escalation: None,
            session: Mutex::new(Session::default()),
        })
    }

    /// Hand captcha and login walls to a person
    pub fn with_escalation(mut self, escalation: Arc<dyn HumanEscalation>) -> Self {
        self.escalation = Some(escalation);
        self
    }

    pub fn config(&self) -> &WebScraperConfig {
        &self.config
    }

    /// Skip-list hashes found on the page during the current session
    pub async fn matched_hashes(&self) -> HashSet<String> {
        self.session.lock().await.matched_hashes.clone()
    }

    pub async fn is_exhausted(&self) -> bool {
        self.session.lock().await.exhausted
    }

    async fn open_start_page(&self) -> Result<()> {
        self.page.goto(&self.config.url).await?;
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    /// Ids of matching elements not yet visited, in document order
    async fn unvisited_nodes(&self, session: &mut Session) -> Result<Vec<u64>> {
        let whole_ancestor = self.config.scraping_type == ScrapingType::Single && self.config.items_selector.is_none();
        let script = render_script(
            COLLECT_ITEMS_JS,
            &json!({
                "ancestor": self.config.ancestor_selector,
                "items": self.config.items_selector,
                "whole_ancestor": whole_ancestor,
                "next_id": session.next_node_id,
            }),
        )?;
        let collected: Collected = serde_json::from_value(self.page.evaluate(&script).await?)
            .map_err(|e| ScrapeError::EvaluationFailed(format!("Failed to parse collected items: {}", e)))?;

        session.next_node_id = session.next_node_id.max(collected.next_id);
        Ok(collected
            .nodes
            .into_iter()
            .filter(|id| !session.visited.contains(id))
            .collect())
    }

    /// Try to reveal more items: scroll first, then the pagination button
    async fn load_more(&self, session: &mut Session) -> Result<()> {
        let page = self.page.as_ref();
        let tracker = MutationTracker::new(
            self.config.ancestor_selector.as_str(),
            self.config.items_selector.as_deref().unwrap_or("*"),
        );
        tracker.init_observer(page).await?;

        if actions::is_scrollable(page).await? {
            let target = match session.last_visited {
                Some(id) => node_selector(id),
                None => self.config.ancestor_selector.clone(),
            };
            actions::scroll_into_view(page, &target).await?;
            if tracker.has_items_added(page, self.config.load_more_timeout).await? {
                log::debug!("Scrolling loaded more items");
                return Ok(());
            }
        }

        if let Some(button) = &self.config.pagination_button_selector {
            let confirmation = actions::click(page, &ElementHandle::from_selector(button.as_str())).await?;
            log::debug!("{}", confirmation);
            if !tracker.has_items_added(page, self.config.load_more_timeout).await? {
                // Full navigations replace the observed document
                tokio::time::sleep(self.config.settle_delay).await;
            }
        }
        Ok(())
    }

    async fn read_nodes(&self, ids: &[u64]) -> Result<Vec<ItemMarkup>> {
        let script = render_script(READ_ITEMS_JS, &json!({ "ids": ids }))?;
        serde_json::from_value(self.page.evaluate(&script).await?)
            .map_err(|e| ScrapeError::EvaluationFailed(format!("Failed to parse item markup: {}", e)))
    }

    /// Up to `n` new items, loading more content as long as it keeps appearing.
    ///
    /// Pages that re-render known content under new nodes (a "next" click on the last
    /// page, recycled feed nodes) would otherwise load forever; after
    /// [`MAX_IDLE_ROUNDS`] load-more rounds without an unseen hash extraction stops.
    async fn extract(&self, session: &mut Session, n: usize) -> Result<Vec<SourceItem>> {
        let mut items = Vec::new();
        let mut idle_rounds = 0;
        let mut round_progress = true;

        while items.len() < n {
            let mut fresh = self.unvisited_nodes(session).await?;
            if fresh.is_empty() {
                if round_progress {
                    idle_rounds = 0;
                } else {
                    idle_rounds += 1;
                    if idle_rounds >= MAX_IDLE_ROUNDS {
                        log::info!("No unseen content after {} load-more rounds", idle_rounds);
                        break;
                    }
                }
                round_progress = false;

                if let Err(e) = self.load_more(session).await {
                    log::debug!("Loading more items failed: {}", e);
                }
                fresh = self.unvisited_nodes(session).await?;
                if fresh.is_empty() {
                    break;
                }
            }

            fresh.truncate(n - items.len());
            for markup in self.read_nodes(&fresh).await? {
                session.visited.insert(markup.id);
                session.last_visited = Some(markup.id);

                let Some(html) = markup.html else {
                    continue;
                };
                let markdown = html_to_markdown(&html);
                if markdown.is_empty() {
                    continue;
                }
                let hash = item_hash(&markdown);
                if self.config.skip_item_hashes.contains(&hash) {
                    round_progress |= session.matched_hashes.insert(hash);
                    continue;
                }
                if !session.seen_hashes.insert(hash.clone()) {
                    log::debug!("Skipping duplicate item {}", markup.id);
                    continue;
                }
                round_progress = true;
                items.push(SourceItem::new(hash, markdown));
            }
            // Ids the page no longer knows
            session.visited.extend(fresh);
        }

        Ok(items)
    }

    /// Escalate a captcha or login wall once per session, then reload the start page.
    ///
    /// Returns whether extraction should be retried.
    async fn recover_from_wall(&self, session: &mut Session) -> Result<bool> {
        let script = render_script(
            WALL_CHECK_JS,
            &json!({ "ancestor": self.config.ancestor_selector, "items": self.config.items_selector }),
        )?;
        let wall: WallCheck = serde_json::from_value(self.page.evaluate(&script).await?).unwrap_or_default();
        let Some(kind) = wall.kind() else {
            return Ok(false);
        };
        let url = self.page.current_url().await?;
        log::warn!("Detected a {} wall on {}", kind, url);

        let Some(escalation) = &self.escalation else {
            return Ok(false);
        };
        if session.escalated {
            log::warn!("Already escalated once this session, giving up");
            return Ok(false);
        }
        session.escalated = true;

        let note = escalation
            .web_interaction(&escalation_message(kind, &url), &url, kind)
            .await?;
        log::info!("Human interaction finished: {}", note);

        self.open_start_page().await?;
        Ok(true)
    }
}

#[async_trait]
impl ItemSource for WebScraper {
    async fn init(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let next_node_id = session.next_node_id;
        *session = Session {
            next_node_id,
            ..Session::default()
        };
        self.open_start_page()
            .await
            .map_err(|e| ScrapeError::SourceInit(format!("Failed to open {}: {}", self.config.url, e)))?;
        log::info!("Scraping {} ({})", self.config.url, self.config.scraping_type);
        Ok(())
    }

    async fn next_items(&self, n: usize) -> Result<Option<Vec<SourceItem>>> {
        let mut session = self.session.lock().await;
        if session.exhausted {
            return Ok(None);
        }

        let mut items = self.extract(&mut session, n).await?;
        if items.is_empty() && n > 0 && self.recover_from_wall(&mut session).await? {
            items = self.extract(&mut session, n).await?;
        }

        if items.is_empty() {
            session.exhausted = true;
            log::info!(
                "Page exhausted: {} items returned, {} skipped as already scraped",
                session.seen_hashes.len(),
                session.matched_hashes.len()
            );
            return Ok(None);
        }
        Ok(Some(items))
    }
}
