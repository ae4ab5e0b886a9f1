//! Instagram photo-grid scraper implementation

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use scraper::Html;
use tracing::info;

use super::{ParsedSelectors, absolute_url, extract_next_page_url, normalize_url, post_id};
use crate::collector::BatchSource;
use crate::models::Post;
use crate::traits::{FeedScraper, FeedSelectors, ScraperConfig};

/// Scraper for Instagram profile grids
pub struct InstagramScraper {
    client: Client,
    config: ScraperConfig,
}

impl InstagramScraper {
    /// Create a new Instagram scraper with default configuration
    pub fn new() -> Result<Self> {
        let config = ScraperConfig {
            name: "Instagram".to_string(),
            base_url: "https://www.instagram.com".to_string(),
            profile_url_pattern: "https://www.instagram.com/{account}/".to_string(),
            selectors: FeedSelectors {
                post_container: "main article div._aabd".to_string(),
                post_link: "a".to_string(),
                // Grid cells carry the caption in the image alt text
                text: "img".to_string(),
                likes: None,
                timestamp: None,
                pagination_container: "main article".to_string(),
                pagination_next: "a[href*=\"max_id=\"]".to_string(),
            },
        };

        let client = Client::builder()
            .user_agent(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            )
            .build()?;

        Ok(Self { client, config })
    }
}

impl FeedScraper for InstagramScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn feed(&self, account: &str) -> Result<Box<dyn BatchSource<Item = Post> + Send>> {
        let selectors = ParsedSelectors::parse(&self.config.selectors)?;
        Ok(Box::new(InstagramFeed {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            account: account.to_string(),
            selectors,
            current_url: Some(self.build_profile_url(account)),
            page: 0,
        }))
    }
}

/// One account's grid, walked page by page
struct InstagramFeed {
    client: Client,
    base_url: String,
    account: String,
    selectors: ParsedSelectors,
    current_url: Option<String>,
    page: u32,
}

#[async_trait]
impl BatchSource for InstagramFeed {
    type Item = Post;

    async fn fetch_batch(&mut self) -> Result<Vec<Post>> {
        // Feed exhausted; empty batches let the collector's staleness
        // cutoff end the run.
        let Some(url) = self.current_url.clone() else {
            return Ok(Vec::new());
        };

        self.page += 1;
        info!("Fetching page {} of @{}'s grid", self.page, self.account);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to fetch page {} for @{}: {}",
                self.page,
                self.account,
                response.status()
            );
        }
        let html = response.text().await?;

        // Scope the document so it is dropped before the next await
        let (posts, next_page_url) = {
            let document = Html::parse_document(&html);
            let posts = extract_grid_posts(&document, &self.selectors, &self.base_url, &self.account);
            let next = extract_next_page_url(
                &document,
                &self.selectors.pagination_container,
                &self.selectors.pagination_next,
                &self.base_url,
            );
            (posts, next)
        };

        // A next link pointing back at the current page would loop forever
        self.current_url = next_page_url.filter(|next| *next != url);

        Ok(posts)
    }
}

/// Extract posts from a profile grid page. Grid cells only expose the
/// permalink and the image alt text; likes and timestamps live on the
/// individual post pages, which this scraper does not visit.
fn extract_grid_posts(
    document: &Html,
    selectors: &ParsedSelectors,
    base_url: &str,
    account: &str,
) -> Vec<Post> {
    let mut posts = Vec::new();

    for cell in document.select(&selectors.post_container) {
        let Some(href) = cell
            .select(&selectors.post_link)
            .filter_map(|link| link.value().attr("href"))
            .find(|href| href.contains("/p/") || href.contains("/reel/"))
        else {
            continue;
        };

        let url = normalize_url(absolute_url(base_url, href));

        let caption = cell
            .select(&selectors.text)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .unwrap_or_default()
            .trim()
            .to_string();

        let discovered_at = Utc::now();
        let id = post_id("Instagram", Some(&url), account, discovered_at);

        posts.push(Post {
            id,
            account: account.to_string(),
            url: Some(url),
            text: caption,
            likes: None,
            timestamp: None,
            discovered_at,
        });
    }

    posts
}
