//! Data models for scraped posts and exported account archives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post captured from a profile feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account: String,
    pub url: Option<String>,
    pub text: String,
    pub likes: Option<u32>,
    pub timestamp: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Post {
    /// De-duplication key: the permalink when present, otherwise the raw
    /// timestamp. Posts with neither cannot be told apart and are never
    /// deduplicated.
    pub fn identity(&self) -> Option<String> {
        self.url.clone().or_else(|| self.timestamp.clone())
    }

    /// Stable storage id, qualified by site so the same permalink scraped
    /// from two sites stays distinct.
    pub fn storage_id(site: &str, identity: &str) -> String {
        format!("{:x}", md5::compute(format!("{site}:{identity}")))
    }
}

/// Everything harvested from one account in one run
#[derive(Debug, Serialize)]
pub struct AccountArchive {
    pub account: String,
    pub site: String,
    pub scraped_at: DateTime<Utc>,
    pub stop_reason: String,
    pub posts_count: usize,
    pub posts: Vec<Post>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(url: Option<&str>, timestamp: Option<&str>) -> Post {
        Post {
            id: "x".to_string(),
            account: "nasa".to_string(),
            url: url.map(String::from),
            text: "hello".to_string(),
            likes: None,
            timestamp: timestamp.map(String::from),
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn identity_prefers_url_over_timestamp() {
        let p = post(Some("https://x.com/nasa/status/1"), Some("2024-01-01"));
        assert_eq!(p.identity().as_deref(), Some("https://x.com/nasa/status/1"));
    }

    #[test]
    fn identity_falls_back_to_timestamp() {
        let p = post(None, Some("2024-01-01T00:00:00Z"));
        assert_eq!(p.identity().as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn identity_is_none_without_url_or_timestamp() {
        assert!(post(None, None).identity().is_none());
    }

    #[test]
    fn storage_id_is_site_qualified() {
        let a = Post::storage_id("Instagram", "https://example.com/p/1");
        let b = Post::storage_id("Timeline", "https://example.com/p/1");
        assert_ne!(a, b);
    }
}
