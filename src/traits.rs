//! Traits and interfaces for site-agnostic feed scraping

use anyhow::Result;

use crate::collector::BatchSource;
use crate::models::Post;

/// Configuration for a site scraper
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Display name for the site
    pub name: String,
    /// Base URL for the site
    pub base_url: String,
    /// Profile URL pattern with {account} placeholder
    pub profile_url_pattern: String,
    /// CSS selectors for extracting data
    pub selectors: FeedSelectors,
}

/// CSS selectors for the parts of a profile feed
#[derive(Debug, Clone)]
pub struct FeedSelectors {
    /// Container selector for individual posts
    pub post_container: String,
    /// Permalink selector within the post container
    pub post_link: String,
    /// Post text selector within the post container
    pub text: String,
    /// Like count selector within the post container (optional)
    pub likes: Option<String>,
    /// Timestamp element selector within the post container (optional)
    pub timestamp: Option<String>,
    /// Pagination container selector
    pub pagination_container: String,
    /// Next page link selector within pagination
    pub pagination_next: String,
}

/// Trait for site-specific feed scrapers
pub trait FeedScraper: Send + Sync {
    /// Get the configuration for this scraper
    fn config(&self) -> &ScraperConfig;

    /// Create a batch source positioned at the start of the account's
    /// feed. Each `fetch_batch` call advances one page and returns the
    /// posts visible on it.
    fn feed(&self, account: &str) -> Result<Box<dyn BatchSource<Item = Post> + Send>>;

    /// Build the URL of an account's profile page
    fn build_profile_url(&self, account: &str) -> String {
        let encoded = urlencoding::encode(account);
        self.config()
            .profile_url_pattern
            .replace("{account}", &encoded)
    }

    /// Get the user agent string for HTTP requests
    #[allow(dead_code)]
    fn user_agent(&self) -> &'static str {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
    }
}
