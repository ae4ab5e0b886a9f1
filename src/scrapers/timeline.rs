//! Twitter/X-style timeline scraper implementation

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use scraper::Html;
use tracing::info;

use super::{ParsedSelectors, absolute_url, extract_next_page_url, parse_count, post_id};
use crate::collector::BatchSource;
use crate::models::Post;
use crate::traits::{FeedScraper, FeedSelectors, ScraperConfig};

/// Scraper for X-style timelines
pub struct TimelineScraper {
    client: Client,
    config: ScraperConfig,
}

impl TimelineScraper {
    /// Create a new timeline scraper with default configuration
    pub fn new() -> Result<Self> {
        let config = ScraperConfig {
            name: "Timeline".to_string(),
            base_url: "https://x.com".to_string(),
            profile_url_pattern: "https://x.com/{account}".to_string(),
            selectors: FeedSelectors {
                post_container: "article[data-testid=\"tweet\"]".to_string(),
                post_link: "a[href*=\"/status/\"]".to_string(),
                text: "div[data-testid=\"tweetText\"]".to_string(),
                likes: Some("button[data-testid=\"like\"] span".to_string()),
                timestamp: Some("time".to_string()),
                pagination_container: "div[data-testid=\"timeline-footer\"]".to_string(),
                pagination_next: "a[href*=\"cursor=\"]".to_string(),
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

impl FeedScraper for TimelineScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn feed(&self, account: &str) -> Result<Box<dyn BatchSource<Item = Post> + Send>> {
        let selectors = ParsedSelectors::parse(&self.config.selectors)?;
        Ok(Box::new(TimelineFeed {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            account: account.to_string(),
            selectors,
            current_url: Some(self.build_profile_url(account)),
            page: 0,
        }))
    }
}

/// One account's timeline, walked cursor page by cursor page
struct TimelineFeed {
    client: Client,
    base_url: String,
    account: String,
    selectors: ParsedSelectors,
    current_url: Option<String>,
    page: u32,
}

#[async_trait]
impl BatchSource for TimelineFeed {
    type Item = Post;

    async fn fetch_batch(&mut self) -> Result<Vec<Post>> {
        let Some(url) = self.current_url.clone() else {
            return Ok(Vec::new());
        };

        self.page += 1;
        info!("Fetching page {} of @{}'s timeline", self.page, self.account);

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

        if html.contains("Rate limit exceeded") || html.contains("Try again later") {
            anyhow::bail!("Rate limited while fetching @{}", self.account);
        }

        // Scope the document so it is dropped before the next await
        let (posts, next_page_url) = {
            let document = Html::parse_document(&html);
            let posts =
                extract_timeline_posts(&document, &self.selectors, &self.base_url, &self.account);
            let next = extract_next_page_url(
                &document,
                &self.selectors.pagination_container,
                &self.selectors.pagination_next,
                &self.base_url,
            );
            (posts, next)
        };

        self.current_url = next_page_url.filter(|next| *next != url);

        Ok(posts)
    }
}

/// Extract posts from a timeline page. Promoted cards and quoted stubs
/// sometimes carry neither a permalink nor a timestamp; those posts are
/// kept with no identity and left to the caller's policy.
fn extract_timeline_posts(
    document: &Html,
    selectors: &ParsedSelectors,
    base_url: &str,
    account: &str,
) -> Vec<Post> {
    let mut posts = Vec::new();

    for article in document.select(&selectors.post_container) {
        let url = article
            .select(&selectors.post_link)
            .filter_map(|link| link.value().attr("href"))
            .next()
            .map(|href| absolute_url(base_url, href));

        let text = article
            .select(&selectors.text)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let likes = selectors.likes.as_ref().and_then(|likes_sel| {
            article
                .select(likes_sel)
                .find_map(|el| parse_count(&el.text().collect::<String>()))
        });

        let timestamp = selectors.timestamp.as_ref().and_then(|time_sel| {
            article
                .select(time_sel)
                .next()
                .and_then(|el| el.value().attr("datetime"))
                .map(String::from)
        });

        let discovered_at = Utc::now();
        let identity = url.clone().or_else(|| timestamp.clone());
        let id = post_id("Timeline", identity.as_deref(), account, discovered_at);

        posts.push(Post {
            id,
            account: account.to_string(),
            url,
            text,
            likes,
            timestamp,
            discovered_at,
        });
    }

    posts
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMELINE_PAGE: &str = r#"
        <html><body><div>
            <article data-testid="tweet">
                <a href="/nasa/status/100">permalink</a>
                <div data-testid="tweetText">Orbit achieved.</div>
                <time datetime="2024-03-01T12:00:00.000Z">Mar 1</time>
                <button data-testid="like"><span>1,234</span></button>
            </article>
            <article data-testid="tweet">
                <div data-testid="tweetText">Promoted: no permalink here</div>
            </article>
            <article data-testid="tweet">
                <div data-testid="tweetText">Timestamp only</div>
                <time datetime="2024-03-02T09:30:00.000Z">Mar 2</time>
            </article>
            <div data-testid="timeline-footer">
                <a href="/nasa?cursor=abc123">Next</a>
            </div>
        </div></body></html>
    "#;

    fn parsed() -> ParsedSelectors {
        let scraper = TimelineScraper::new().unwrap();
        ParsedSelectors::parse(&scraper.config().selectors).unwrap()
    }

    #[test]
    fn extracts_permalink_text_likes_and_timestamp() {
        let document = Html::parse_document(TIMELINE_PAGE);
        let posts = extract_timeline_posts(&document, &parsed(), "https://x.com", "nasa");

        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].url.as_deref(), Some("https://x.com/nasa/status/100"));
        assert_eq!(posts[0].text, "Orbit achieved.");
        assert_eq!(posts[0].likes, Some(1234));
        assert_eq!(posts[0].timestamp.as_deref(), Some("2024-03-01T12:00:00.000Z"));
    }

    #[test]
    fn posts_without_permalink_or_timestamp_have_no_identity() {
        let document = Html::parse_document(TIMELINE_PAGE);
        let posts = extract_timeline_posts(&document, &parsed(), "https://x.com", "nasa");

        assert!(posts[1].identity().is_none());
        assert_eq!(
            posts[2].identity().as_deref(),
            Some("2024-03-02T09:30:00.000Z")
        );
    }

    #[test]
    fn next_page_follows_the_cursor_link() {
        let document = Html::parse_document(TIMELINE_PAGE);
        let selectors = parsed();
        let next = extract_next_page_url(
            &document,
            &selectors.pagination_container,
            &selectors.pagination_next,
            "https://x.com",
        );

        assert_eq!(next.as_deref(), Some("https://x.com/nasa?cursor=abc123"));
    }
}
