//! Item sources: the DOM-backed web scraper and a JSON-lines feed reader

pub mod config;
pub mod content;
pub mod feed;
pub mod web;

pub use config::WebScraperConfig;
pub use feed::JsonLinesSource;
pub use web::WebScraper;
