//! Site-specific feed scraper implementations

pub mod instagram;
pub mod timeline;

use anyhow::Result;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};

use crate::models::Post;
use crate::traits::FeedSelectors;

/// [`FeedSelectors`] compiled once per feed, before any page is fetched
pub(crate) struct ParsedSelectors {
    pub post_container: Selector,
    pub post_link: Selector,
    pub text: Selector,
    pub likes: Option<Selector>,
    pub timestamp: Option<Selector>,
    pub pagination_container: Selector,
    pub pagination_next: Selector,
}

impl ParsedSelectors {
    pub fn parse(selectors: &FeedSelectors) -> Result<Self> {
        let parse_one = |css: &str| {
            Selector::parse(css)
                .map_err(|e| anyhow::anyhow!("Failed to parse selector {css:?}: {e:?}"))
        };

        Ok(Self {
            post_container: parse_one(&selectors.post_container)?,
            post_link: parse_one(&selectors.post_link)?,
            text: parse_one(&selectors.text)?,
            likes: selectors.likes.as_deref().map(parse_one).transpose()?,
            timestamp: selectors.timestamp.as_deref().map(parse_one).transpose()?,
            pagination_container: parse_one(&selectors.pagination_container)?,
            pagination_next: parse_one(&selectors.pagination_next)?,
        })
    }
}

/// Convert a possibly relative href to an absolute URL
pub(crate) fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{href}")
    } else {
        format!("{base_url}{href}")
    }
}

/// Strip query parameters so the same post reached via different tracking
/// links maps to one URL
pub(crate) fn normalize_url(mut url: String) -> String {
    if let Some(query_start) = url.find('?') {
        url.truncate(query_start);
    }
    url
}

/// Pull the first comma-grouped number out of a label like "1,234 likes"
pub(crate) fn parse_count(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Resolve the next page link from the pagination container, if any
pub(crate) fn extract_next_page_url(
    document: &Html,
    pagination_container: &Selector,
    pagination_next: &Selector,
    base_url: &str,
) -> Option<String> {
    let pagination = document.select(pagination_container).next()?;
    let next_link = pagination.select(pagination_next).next()?;
    let href = next_link.value().attr("href")?;
    Some(absolute_url(base_url, href))
}

/// Storage id for a post; posts without an identity get a run-unique id
/// so they can still be persisted
pub(crate) fn post_id(
    site: &str,
    identity: Option<&str>,
    account: &str,
    discovered_at: DateTime<Utc>,
) -> String {
    match identity {
        Some(ident) => Post::storage_id(site, ident),
        None => Post::storage_id(
            site,
            &format!(
                "{account}:{}",
                discovered_at.timestamp_nanos_opt().unwrap_or_default()
            ),
        ),
    }
}
