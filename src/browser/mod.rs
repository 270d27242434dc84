//! Browser session management and the page automation boundary

pub mod config;
pub mod page;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use page::{ChromePage, PageContext};
pub use session::BrowserSession;

#[cfg(test)]
pub(crate) mod testing;
