pub mod webdriver;

#[cfg(test)]
pub mod fake;

// Re-export common types
pub use webdriver::WebDriverSurface;

use async_trait::async_trait;
use thiserror::Error;

/// What a search is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// A topic query, e.g. a hashtag
    Topic,
    /// A direct identity lookup
    Identity,
}

/// Direction of one scroll step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Down,
    Up,
}

/// Which family of links to harvest from the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkClass {
    /// Content item links
    Items,
    /// Profile links anywhere on the page
    Identities,
    /// Profile links inside the engagement area of an item
    Engagement,
}

/// Page-level metadata used for owner detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("webdriver: {0}")]
    Driver(#[from] thirtyfour::error::WebDriverError),
    #[error("{0}")]
    Other(String),
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Everything the session logic needs from a browser, kept behind a trait so
/// orchestration and scraping can run against a scripted stand-in.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Load an absolute URL
    async fn navigate(&self, url: &str) -> SurfaceResult<()>;

    /// Search for a term. Returns whether a result page was reached.
    async fn search(&self, term: &str, kind: SearchKind) -> SurfaceResult<bool>;

    /// Perform one scroll step on the current page
    async fn scroll_step(&self, direction: ScrollDirection) -> SurfaceResult<()>;

    /// Like the first available piece of content, if any
    async fn attempt_like(&self) -> SurfaceResult<bool>;

    /// Collect hrefs of the given class from the current page
    async fn extract_links(&self, class: LinkClass) -> SurfaceResult<Vec<String>>;

    /// Follow the given identity from their profile page. Returns whether a
    /// follow control was found and clicked.
    async fn click_follow(&self, identity: &str) -> SurfaceResult<bool>;

    /// Return to the home feed
    async fn go_home(&self) -> SurfaceResult<()>;

    /// Title and description of the current page
    async fn page_metadata(&self) -> SurfaceResult<PageMetadata>;

    /// Reveal more engagement content on the current item. Returns whether
    /// anything more could be revealed.
    async fn expand_engagement(&self) -> SurfaceResult<bool>;

    /// Release the underlying browser session
    async fn close(&self) -> SurfaceResult<()>;
}
