use crate::analyzer::{PageAnalysis, ScrapingType};
use crate::error::{Result, ScrapeError};
use std::collections::HashSet;
use std::time::Duration;

/// Where and how a [`WebScraper`](crate::scraper::WebScraper) extracts items
#[derive(Debug, Clone)]
pub struct WebScraperConfig {
    /// Page the session starts from
    pub url: String,

    pub scraping_type: ScrapingType,

    /// Smallest container holding the items (default: "body")
    pub ancestor_selector: String,

    /// Matches each item; without it items are the ancestor's children, or the whole
    /// ancestor for single pages
    pub items_selector: Option<String>,

    /// Control that loads the next page of items
    pub pagination_button_selector: Option<String>,

    /// Hashes returned by an earlier run; matching items are skipped and reported
    pub skip_item_hashes: HashSet<String>,

    /// How long to wait for new items after scrolling or paginating
    pub load_more_timeout: Duration,

    /// Wait after navigations and clicks for the DOM to settle
    pub settle_delay: Duration,
}

impl WebScraperConfig {
    pub fn new(url: impl Into<String>, scraping_type: ScrapingType) -> Self {
        Self {
            url: url.into(),
            scraping_type,
            ancestor_selector: "body".to_string(),
            items_selector: None,
            pagination_button_selector: None,
            skip_item_hashes: HashSet::new(),
            load_more_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_secs(1),
        }
    }

    /// Configuration from an analysis of the start page
    pub fn from_analysis(analysis: &PageAnalysis) -> Self {
        let mut config = Self::new(analysis.url.clone(), analysis.scraping_type);
        if let Some(selectors) = &analysis.selectors {
            config.ancestor_selector = selectors.ancestor_selector.clone();
            config.items_selector = Some(selectors.items_selector.clone());
        }
        config.pagination_button_selector = analysis.pagination_button_selector.clone();
        config
    }

    pub fn ancestor_selector(mut self, selector: impl Into<String>) -> Self {
        self.ancestor_selector = selector.into();
        self
    }

    pub fn items_selector(mut self, selector: impl Into<String>) -> Self {
        self.items_selector = Some(selector.into());
        self
    }

    pub fn pagination_button_selector(mut self, selector: impl Into<String>) -> Self {
        self.pagination_button_selector = Some(selector.into());
        self
    }

    pub fn skip_item_hashes(mut self, hashes: impl IntoIterator<Item = String>) -> Self {
        self.skip_item_hashes = hashes.into_iter().collect();
        self
    }

    pub fn load_more_timeout(mut self, timeout: Duration) -> Self {
        self.load_more_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig("url must not be empty".to_string()));
        }
        if self.ancestor_selector.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig("ancestor selector must not be empty".to_string()));
        }
        for (name, selector) in [
            ("items selector", &self.items_selector),
            ("pagination button selector", &self.pagination_button_selector),
        ] {
            if selector.as_deref().is_some_and(|s| s.trim().is_empty()) {
                return Err(ScrapeError::InvalidConfig(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::CommonSelectors;

    #[test]
    fn test_defaults() {
        let config = WebScraperConfig::new("https://example.com", ScrapingType::ListLike);
        assert_eq!(config.ancestor_selector, "body");
        assert!(config.items_selector.is_none());
        assert!(config.skip_item_hashes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(WebScraperConfig::new(" ", ScrapingType::Single).validate().is_err());
        assert!(
            WebScraperConfig::new("https://example.com", ScrapingType::Single)
                .ancestor_selector("")
                .validate()
                .is_err()
        );
        assert!(
            WebScraperConfig::new("https://example.com", ScrapingType::ListLike)
                .items_selector("  ")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_analysis() {
        let analysis = PageAnalysis {
            url: "https://shop.test".to_string(),
            scraping_type: ScrapingType::ListLike,
            selectors: Some(CommonSelectors {
                items_selector: "ul.results > li.card".to_string(),
                ancestor_selector: "ul.results".to_string(),
                anchors_selector: "ul.results > li.card".to_string(),
            }),
            pagination_button_selector: Some("a.next".to_string()),
            infinite_scroll: false,
        };

        let config = WebScraperConfig::from_analysis(&analysis)
            .skip_item_hashes(vec!["abc".to_string()]);

        assert_eq!(config.ancestor_selector, "ul.results");
        assert_eq!(config.items_selector.as_deref(), Some("ul.results > li.card"));
        assert_eq!(config.pagination_button_selector.as_deref(), Some("a.next"));
        assert!(config.skip_item_hashes.contains("abc"));
    }
}
