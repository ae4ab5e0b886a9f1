use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collector::{Collector, CollectorConfig, DelayRange, StopReason};
use crate::database::Database;
use crate::export::JsonExporter;
use crate::models::{AccountArchive, Post};
use crate::scrapers::instagram::InstagramScraper;
use crate::scrapers::timeline::TimelineScraper;
use crate::traits::FeedScraper;

/// Runtime settings, read from the environment with sensible defaults
#[derive(Debug, Clone)]
pub struct HarvesterSettings {
    pub accounts: Vec<String>,
    pub target_post_count: usize,
    pub max_stale_streak: u32,
    pub max_iterations: u32,
    pub between_fetch_delay: DelayRange,
    pub between_account_pause: DelayRange,
    pub database_url: String,
    pub output_dir: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl HarvesterSettings {
    pub fn from_env() -> Result<Self> {
        let accounts = env::var("ACCOUNTS")
            .unwrap_or_else(|_| "nasa,natgeo".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            accounts,
            target_post_count: env_or("TARGET_POST_COUNT", 30)?,
            max_stale_streak: env_or("MAX_STALE_STREAK", 3)?,
            max_iterations: env_or("MAX_ITERATIONS", 15)?,
            between_fetch_delay: DelayRange::new(
                Duration::from_millis(env_or("FETCH_DELAY_MIN_MS", 2000)?),
                Duration::from_millis(env_or("FETCH_DELAY_MAX_MS", 4000)?),
            ),
            between_account_pause: DelayRange::new(
                Duration::from_millis(env_or("ACCOUNT_PAUSE_MIN_MS", 5000)?),
                Duration::from_millis(env_or("ACCOUNT_PAUSE_MAX_MS", 10000)?),
            ),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:posts.db".to_string()),
            output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| "archives".to_string()),
        })
    }
}

#[derive(Clone)]
pub struct FeedHarvester {
    scrapers: Vec<Arc<dyn FeedScraper>>,
    collector: Arc<Collector<Post>>,
    database: Database,
    exporter: JsonExporter,
    settings: HarvesterSettings,
}

impl FeedHarvester {
    pub async fn new(settings: HarvesterSettings) -> Result<Self> {
        let scrapers: Vec<Arc<dyn FeedScraper>> = vec![
            Arc::new(InstagramScraper::new()?),
            Arc::new(TimelineScraper::new()?),
        ];

        let collector = Collector::new(
            CollectorConfig {
                target_count: settings.target_post_count,
                max_stale_streak: settings.max_stale_streak,
                max_iterations: settings.max_iterations,
                between_fetch_delay: settings.between_fetch_delay,
            },
            Post::identity,
        )
        .context("Invalid collector configuration")?;

        let database = Database::new(&settings.database_url).await?;
        let exporter = JsonExporter::new(&settings.output_dir)?;

        Ok(Self {
            scrapers,
            collector: Arc::new(collector),
            database,
            exporter,
            settings,
        })
    }

    /// Harvest every configured account on every site, strictly one feed
    /// at a time.
    pub async fn harvest_all(&self, cancel: CancellationToken) -> Result<()> {
        let mut existing_ids = self.database.get_existing_post_ids().await?;
        let mut archives: Vec<AccountArchive> = Vec::new();

        let total = self.scrapers.len() * self.settings.accounts.len();
        let mut done = 0;

        'sites: for scraper in &self.scrapers {
            for account in &self.settings.accounts {
                if cancel.is_cancelled() {
                    warn!("Harvest cancelled; stopping before @{account}");
                    break 'sites;
                }

                match self
                    .harvest_account(scraper.as_ref(), account, &mut existing_ids, &cancel)
                    .await
                {
                    Ok(archive) => {
                        self.exporter.write_account(&archive)?;
                        archives.push(archive);
                        // Keep the combined file current in case a later
                        // account aborts the run
                        self.exporter.write_combined(&archives)?;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to harvest @{} on {}: {e:#}",
                            account,
                            scraper.config().name
                        );
                    }
                }

                done += 1;
                if done < total && !cancel.is_cancelled() {
                    let pause = self.settings.between_account_pause.sample();
                    info!("Waiting {}ms before next account", pause.as_millis());
                    tokio::time::sleep(pause).await;
                }
            }
        }

        info!(
            "Harvest finished: {} of {} feeds archived",
            archives.len(),
            total
        );
        Ok(())
    }

    async fn harvest_account(
        &self,
        scraper: &dyn FeedScraper,
        account: &str,
        existing_ids: &mut HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<AccountArchive> {
        let site = &scraper.config().name;
        info!("Harvesting @{account} on {site}");

        let mut source = scraper.feed(account)?;
        let run = self
            .collector
            .collect_with_cancellation(source.as_mut(), cancel.child_token())
            .await;

        match run.stop_reason {
            StopReason::TargetReached => {
                info!(
                    "@{account}: target of {} posts reached in {} cycles",
                    self.settings.target_post_count, run.iterations
                );
            }
            StopReason::Exhausted => {
                info!(
                    "@{account}: feed exhausted after {} cycles with {} posts",
                    run.iterations,
                    run.collected.len()
                );
            }
            StopReason::IterationCeiling => {
                warn!(
                    "@{account}: hit the cycle ceiling with {} of {} posts",
                    run.collected.len(),
                    self.settings.target_post_count
                );
            }
            StopReason::SourceUnavailable => {
                warn!(
                    "@{account}: {site} unreachable, all {} cycles failed",
                    run.failed_cycles
                );
            }
            StopReason::Cancelled => {
                warn!(
                    "@{account}: cancelled with {} posts collected",
                    run.collected.len()
                );
            }
        }

        let mut new_posts = 0;
        for post in &run.collected {
            if existing_ids.insert(post.id.clone()) {
                self.database.save_post(post).await?;
                new_posts += 1;
            }
        }
        info!(
            "@{account}: {} new posts saved ({} already known)",
            new_posts,
            run.collected.len() - new_posts
        );

        Ok(AccountArchive {
            account: account.to_string(),
            site: site.clone(),
            scraped_at: Utc::now(),
            stop_reason: run.stop_reason.to_string(),
            posts_count: run.collected.len(),
            posts: run.collected,
        })
    }
}
