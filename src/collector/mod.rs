//! Bounded incremental collection over a paginated or scrolling source

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One round of "make more items visible, then read what is visible".
///
/// A batch may overlap previously returned batches; the collector handles
/// de-duplication. A failed cycle is recoverable and counts as an empty
/// batch, so implementations should return errors rather than retry
/// internally.
#[async_trait]
pub trait BatchSource {
    type Item;

    /// Advance the source (next page, next scroll step) and return the
    /// currently visible items.
    async fn fetch_batch(&mut self) -> Result<Vec<Self::Item>>;
}

/// Inclusive duration range sampled once per fetch cycle
#[derive(Debug, Clone, Copy)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn min(&self) -> Duration {
        self.min
    }

    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Draw an independent uniform sample from the range
    pub fn sample(&self) -> Duration {
        if self.min >= self.max {
            return self.min;
        }

        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }
}

/// Why a collection run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured number of unique items was reached
    TargetReached,
    /// The hard ceiling on fetch cycles was hit
    IterationCeiling,
    /// Too many consecutive cycles yielded nothing new
    Exhausted,
    /// Every performed cycle failed; the source never produced a batch
    SourceUnavailable,
    /// The caller cancelled the run between cycles
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TargetReached => "target_reached",
            Self::IterationCeiling => "iteration_ceiling",
            Self::Exhausted => "exhausted",
            Self::SourceUnavailable => "source_unavailable",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Configuration for a [`Collector`]
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Desired number of unique items; 0 means collect until the source
    /// is exhausted or the iteration ceiling is hit
    pub target_count: usize,
    /// Consecutive zero-new-item cycles tolerated before giving up
    pub max_stale_streak: u32,
    /// Hard ceiling on fetch cycles, independent of staleness
    pub max_iterations: u32,
    /// Pause sampled before every fetch cycle
    pub between_fetch_delay: DelayRange,
}

impl CollectorConfig {
    fn validate(&self) -> Result<(), CollectorError> {
        if self.max_stale_streak == 0 {
            return Err(CollectorError::InvalidConfig(
                "max_stale_streak must be at least 1".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(CollectorError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.between_fetch_delay.min() > self.between_fetch_delay.max() {
            return Err(CollectorError::InvalidConfig(
                "between_fetch_delay minimum exceeds maximum".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Outcome of one collection run
#[derive(Debug)]
pub struct CollectionRun<T> {
    /// Accepted items, in discovery order, with no two sharing an identity
    pub collected: Vec<T>,
    /// Fetch cycles performed
    pub iterations: u32,
    /// Cycles whose fetch failed and was absorbed as an empty batch
    pub failed_cycles: u32,
    /// Terminal classification; callers must inspect this rather than
    /// assume the target was met
    pub stop_reason: StopReason,
}

/// Drives repeated fetch cycles against a [`BatchSource`] until a stopping
/// condition fires, de-duplicating by a caller-supplied identity policy.
///
/// Exactly one `fetch_batch` call is in flight at a time; each cycle fully
/// completes, including the sampled inter-cycle delay, before the next
/// begins. The collector holds no network or browser resources itself.
pub struct Collector<T> {
    config: CollectorConfig,
    identity_of: Box<dyn Fn(&T) -> Option<String> + Send + Sync>,
}

impl<T> Collector<T> {
    /// Create a collector, validating the configuration before any fetch
    /// can happen.
    pub fn new<F>(config: CollectorConfig, identity_of: F) -> Result<Self, CollectorError>
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            identity_of: Box::new(identity_of),
        })
    }

    /// Run a collection to completion.
    pub async fn collect<S>(&self, source: &mut S) -> CollectionRun<T>
    where
        S: BatchSource<Item = T> + Send + ?Sized,
    {
        self.collect_inner(source, None).await
    }

    /// Run a collection that the caller can cancel between cycles.
    ///
    /// Cancellation is coarse-grained: it is observed at the top of each
    /// cycle, and whatever has been collected so far is returned with
    /// [`StopReason::Cancelled`].
    pub async fn collect_with_cancellation<S>(
        &self,
        source: &mut S,
        cancel: CancellationToken,
    ) -> CollectionRun<T>
    where
        S: BatchSource<Item = T> + Send + ?Sized,
    {
        self.collect_inner(source, Some(cancel)).await
    }

    async fn collect_inner<S>(
        &self,
        source: &mut S,
        cancel: Option<CancellationToken>,
    ) -> CollectionRun<T>
    where
        S: BatchSource<Item = T> + Send + ?Sized,
    {
        let target = self.config.target_count;
        let mut seen: HashSet<String> = HashSet::new();
        let mut collected: Vec<T> = Vec::new();
        let mut iterations: u32 = 0;
        let mut stale_streak: u32 = 0;
        let mut failed_cycles: u32 = 0;

        let stop_reason = loop {
            if let Some(token) = &cancel
                && token.is_cancelled()
            {
                break StopReason::Cancelled;
            }
            if target > 0 && collected.len() >= target {
                break StopReason::TargetReached;
            }
            if iterations >= self.config.max_iterations {
                break StopReason::IterationCeiling;
            }
            if stale_streak >= self.config.max_stale_streak {
                break StopReason::Exhausted;
            }

            tokio::time::sleep(self.config.between_fetch_delay.sample()).await;

            let batch = match source.fetch_batch().await {
                Ok(batch) => batch,
                Err(e) => {
                    failed_cycles += 1;
                    warn!("Fetch cycle {} failed: {e:#}", iterations + 1);
                    Vec::new()
                }
            };

            let mut appended = 0usize;
            for item in batch {
                if target > 0 && collected.len() >= target {
                    break;
                }
                if let Some(id) = (self.identity_of)(&item)
                    && !seen.insert(id)
                {
                    continue;
                }
                collected.push(item);
                appended += 1;
            }

            if appended == 0 {
                stale_streak += 1;
            } else {
                stale_streak = 0;
            }
            iterations += 1;

            debug!(
                "Cycle {} accepted {} items (total {}, stale streak {})",
                iterations,
                appended,
                collected.len(),
                stale_streak
            );
        };

        // A run in which the source never produced a single batch is
        // reported as unavailable, whichever cutoff tripped first.
        let stop_reason = if iterations > 0
            && failed_cycles == iterations
            && matches!(
                stop_reason,
                StopReason::IterationCeiling | StopReason::Exhausted
            ) {
            StopReason::SourceUnavailable
        } else {
            stop_reason
        };

        CollectionRun {
            collected,
            iterations,
            failed_cycles,
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    struct ScriptedSource {
        batches: VecDeque<Result<Vec<&'static str>>>,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Result<Vec<&'static str>>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    #[async_trait]
    impl BatchSource for ScriptedSource {
        type Item = &'static str;

        async fn fetch_batch(&mut self) -> Result<Vec<&'static str>> {
            self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn no_delay() -> DelayRange {
        DelayRange::new(Duration::ZERO, Duration::ZERO)
    }

    fn config(target_count: usize, max_stale_streak: u32, max_iterations: u32) -> CollectorConfig {
        CollectorConfig {
            target_count,
            max_stale_streak,
            max_iterations,
            between_fetch_delay: no_delay(),
        }
    }

    fn by_value(item: &&'static str) -> Option<String> {
        Some((*item).to_string())
    }

    fn no_identity(_: &&'static str) -> Option<String> {
        None
    }

    fn dedup_collector(cfg: CollectorConfig) -> Collector<&'static str> {
        Collector::new(cfg, by_value).unwrap()
    }

    #[tokio::test]
    async fn stops_when_target_reached() {
        let collector = dedup_collector(config(5, 3, 100));
        let mut source = ScriptedSource::new(vec![
            Ok(vec!["a", "b"]),
            Ok(vec!["b", "c"]),
            Ok(vec![]),
            Ok(vec![]),
            Ok(vec!["d", "e", "f"]),
        ]);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(run.stop_reason, StopReason::TargetReached);
        assert_eq!(run.iterations, 5);
    }

    #[tokio::test]
    async fn stops_exhausted_after_stale_streak() {
        let collector = dedup_collector(config(5, 3, 100));
        let mut source = ScriptedSource::new(vec![
            Ok(vec!["a"]),
            Ok(vec![]),
            Ok(vec![]),
            Ok(vec![]),
        ]);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["a"]);
        assert_eq!(run.stop_reason, StopReason::Exhausted);
        assert_eq!(run.iterations, 4);
    }

    #[tokio::test]
    async fn all_failing_cycles_report_source_unavailable() {
        let collector = dedup_collector(config(5, 3, 3));
        let mut source = ScriptedSource::new(vec![
            Err(anyhow!("connection reset")),
            Err(anyhow!("connection reset")),
            Err(anyhow!("connection reset")),
        ]);

        let run = collector.collect(&mut source).await;

        assert!(run.collected.is_empty());
        assert_eq!(run.stop_reason, StopReason::SourceUnavailable);
        assert_eq!(run.failed_cycles, 3);
    }

    #[tokio::test]
    async fn mixed_failures_do_not_report_source_unavailable() {
        let collector = dedup_collector(config(0, 2, 100));
        let mut source = ScriptedSource::new(vec![
            Err(anyhow!("timeout")),
            Ok(vec!["a"]),
            Ok(vec![]),
            Ok(vec![]),
        ]);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["a"]);
        assert_eq!(run.stop_reason, StopReason::Exhausted);
        assert_eq!(run.failed_cycles, 1);
    }

    #[tokio::test]
    async fn unbounded_target_hits_iteration_ceiling() {
        // Fresh item every cycle: staleness never triggers.
        let batches: Vec<Result<Vec<&'static str>>> = vec![
            Ok(vec!["a"]),
            Ok(vec!["b"]),
            Ok(vec!["c"]),
            Ok(vec!["d"]),
            Ok(vec!["e"]),
        ];
        let collector = dedup_collector(config(0, 3, 4));
        let mut source = ScriptedSource::new(batches);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["a", "b", "c", "d"]);
        assert_eq!(run.stop_reason, StopReason::IterationCeiling);
        assert_eq!(run.iterations, 4);
    }

    #[tokio::test]
    async fn duplicates_are_skipped_and_order_preserved() {
        let collector = dedup_collector(config(0, 2, 100));
        let mut source = ScriptedSource::new(vec![
            Ok(vec!["a", "b", "a"]),
            Ok(vec!["b", "c", "a"]),
            Ok(vec!["c", "b"]),
            Ok(vec!["a"]),
        ]);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["a", "b", "c"]);
        assert_eq!(run.stop_reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn null_identity_items_are_always_appended() {
        let collector: Collector<&'static str> =
            Collector::new(config(0, 1, 100), no_identity).unwrap();
        let mut source = ScriptedSource::new(vec![Ok(vec!["x", "x", "x"]), Ok(vec![])]);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["x", "x", "x"]);
    }

    #[tokio::test]
    async fn target_cap_cuts_off_mid_batch() {
        let collector = dedup_collector(config(2, 3, 100));
        let mut source = ScriptedSource::new(vec![Ok(vec!["a", "b", "c", "d"])]);

        let run = collector.collect(&mut source).await;

        assert_eq!(run.collected, vec!["a", "b"]);
        assert_eq!(run.stop_reason, StopReason::TargetReached);
        assert_eq!(run.iterations, 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_cycle_returns_empty_run() {
        let collector = dedup_collector(config(5, 3, 100));
        let mut source = ScriptedSource::new(vec![Ok(vec!["a"])]);
        let token = CancellationToken::new();
        token.cancel();

        let run = collector.collect_with_cancellation(&mut source, token).await;

        assert!(run.collected.is_empty());
        assert_eq!(run.stop_reason, StopReason::Cancelled);
        assert_eq!(run.iterations, 0);
    }

    #[tokio::test]
    async fn cancellation_mid_run_keeps_partial_results() {
        struct CancellingSource {
            token: CancellationToken,
            calls: u32,
        }

        #[async_trait]
        impl BatchSource for CancellingSource {
            type Item = &'static str;

            async fn fetch_batch(&mut self) -> Result<Vec<&'static str>> {
                self.calls += 1;
                if self.calls == 2 {
                    self.token.cancel();
                }
                Ok(match self.calls {
                    1 => vec!["a"],
                    2 => vec!["b"],
                    _ => vec!["c"],
                })
            }
        }

        let collector = dedup_collector(config(0, 5, 100));
        let token = CancellationToken::new();
        let mut source = CancellingSource {
            token: token.clone(),
            calls: 0,
        };

        let run = collector.collect_with_cancellation(&mut source, token).await;

        assert_eq!(run.collected, vec!["a", "b"]);
        assert_eq!(run.stop_reason, StopReason::Cancelled);
        assert_eq!(run.iterations, 2);
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        assert!(Collector::new(config(5, 0, 10), no_identity).is_err());
        assert!(Collector::new(config(5, 3, 0), no_identity).is_err());

        let inverted = CollectorConfig {
            target_count: 5,
            max_stale_streak: 3,
            max_iterations: 10,
            between_fetch_delay: DelayRange::new(
                Duration::from_millis(500),
                Duration::from_millis(100),
            ),
        };
        assert!(Collector::new(inverted, no_identity).is_err());
    }

    #[test]
    fn delay_samples_stay_within_range() {
        let range = DelayRange::new(Duration::from_millis(100), Duration::from_millis(300));
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= range.min() && d <= range.max());
        }

        let fixed = DelayRange::new(Duration::from_millis(42), Duration::from_millis(42));
        assert_eq!(fixed.sample(), Duration::from_millis(42));
    }
}
