//! # browser-harvest
//!
//! Autonomous page analysis and streaming structured extraction on top of Chrome
//! DevTools Protocol (CDP) browser automation.
//!
//! ## Features
//!
//! - **Page analysis**: classify a page as a single entity or a list, find the repeated
//!   item selector, and detect pagination or infinite scroll. Pagination candidates are
//!   clicked in a forked page before they are trusted.
//! - **Streaming summarization**: pull items from any [`ItemSource`] in concurrent batches
//!   and turn them into table rows with a decision model, never exceeding a row limit.
//! - **Incremental scraping**: items are identified by content hash, so a later run can
//!   skip everything an earlier run already returned.
//! - **Browser Session Management**: launch or connect to Chrome/Chromium instances
//!
//! ## Command Line
//!
//! ```bash
//! # Inspect a page
//! cargo run -- analyze https://example.com/products
//!
//! # Scrape it to CSV, inferring the columns
//! cargo run -- scrape https://example.com/products --output products.csv --limit 100
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use browser_harvest::{
//!     BrowserSession, CsvSink, LaunchOptions, OpenAiConfig, OpenAiModel, PageAnalyzer, StreamOptions, Summarizer,
//!     WebScraper, WebScraperConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> browser_harvest::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! let page = Arc::new(session.open_page()?);
//! let model = Arc::new(OpenAiModel::new(OpenAiConfig::from_env()?)?);
//!
//! let analysis = PageAnalyzer::new(model.clone())
//!     .analyze(page.as_ref(), "https://example.com/products")
//!     .await?;
//!
//! let scraper = Arc::new(WebScraper::new(page, WebScraperConfig::from_analysis(&analysis))?);
//! let summarizer = Summarizer::new(scraper, model);
//! if let Some(columns) = summarizer.infer_columns(5, None).await? {
//!     let mut sink = CsvSink::new(std::io::stdout());
//!     summarizer.summarize(columns, StreamOptions::default(), &mut sink).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Browser session management and the page automation boundary
//! - [`dom`]: Element markers, element actions, mutation tracking and selector inference
//! - [`analyzer`]: Page structure analysis
//! - [`pipeline`]: Item sources, the concurrent runner and streaming summarization
//! - [`scraper`]: The web item source and a JSON-lines feed source
//! - [`model`]: The decision-model boundary and an OpenAI-compatible client
//! - [`escalation`]: Hand-off to a person for captcha and login walls
//! - [`error`]: Error types and result aliases

pub mod analyzer;
pub mod browser;
pub mod dom;
pub mod error;
pub mod escalation;
pub mod model;
pub mod pipeline;
pub mod scraper;

pub use analyzer::{AnalyzerOptions, PageAnalysis, PageAnalyzer, ScrapingType};
pub use browser::{BrowserSession, ChromePage, ConnectionOptions, LaunchOptions, PageContext};
pub use dom::{BoundingBox, CommonSelectors, ElementNode, MarkerId, MarkerMap};
pub use error::{Result, ScrapeError};
pub use escalation::{HumanEscalation, InteractionKind};
pub use model::{DecisionModel, Message, OpenAiConfig, OpenAiModel};
pub use pipeline::{
    Column, ColumnType, ConcurrentTaskRunner, CsvSink, ItemSource, JsonLinesSink, RowSink, SourceItem,
    StreamOptions, SummaryBatch, SummaryEvent, SummaryReport, SummaryRow, Summarizer,
};
pub use scraper::{JsonLinesSource, WebScraper, WebScraperConfig};
