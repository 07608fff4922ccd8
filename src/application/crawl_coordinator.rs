//! Sequential crawl driver
//!
//! Each queued job goes `Queued -> Fetching -> Extracting -> Persisted`, or
//! ends in `Failed(kind)` from either of the first two stages. Failures are
//! appended to `failed_urls_<kind>.txt` and the run moves on, unless the
//! coordinator is set to re-raise them.
//!
//! Jobs are processed one at a time. After a job whose page did not come from
//! the response cache, the coordinator waits a random duration before the next
//! one, whatever the outcome.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use super::crawl_jobs::CrawlJob;
use super::crawl_queue::CrawlQueue;
use crate::infrastructure::config::CrawlConfig;
use crate::infrastructure::crawl_error::{CrawlError, CrawlResult};
use crate::infrastructure::http_client::FetchClient;
use crate::infrastructure::storage;

/// Inter-item wait, injectable so tests don't sleep.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Inclusive `[min, max]` wait range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRange {
    min: Duration,
    max: Duration,
}

impl WaitRange {
    pub fn from_seconds(min: u64, max: u64) -> CrawlResult<Self> {
        if min > max {
            return Err(CrawlError::Configuration(format!(
                "wait range minimum {min}s is above maximum {max}s"
            )));
        }
        Ok(Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        })
    }

    pub fn disabled() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Uniform draw at millisecond resolution.
    pub fn draw(&self, rng: &mut fastrand::Rng) -> Duration {
        let min = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.u64(min..=max))
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub wait: WaitRange,
    pub failure_log_dir: PathBuf,
    pub raise_exceptions: bool,
}

impl CoordinatorSettings {
    pub fn from_config(config: &CrawlConfig) -> CrawlResult<Self> {
        Ok(Self {
            wait: WaitRange::from_seconds(config.min_wait_seconds, config.max_wait_seconds)?,
            failure_log_dir: config.failure_log_dir.clone(),
            raise_exceptions: config.raise_exceptions,
        })
    }

    pub fn without_wait(mut self) -> Self {
        self.wait = WaitRange::disabled();
        self
    }
}

/// Stage a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Fetching,
    Extracting,
    Persisting,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Run level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub queued: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub already_present: usize,
    pub served_from_cache: usize,
}

pub struct CrawlCoordinator {
    client: FetchClient,
    pause: Arc<dyn Pause>,
    settings: CoordinatorSettings,
    rng: fastrand::Rng,
}

impl CrawlCoordinator {
    pub fn new(client: FetchClient, pause: Arc<dyn Pause>, settings: CoordinatorSettings) -> Self {
        Self {
            client,
            pause,
            settings,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    /// Drain `queue`. Item failures are logged and counted; only re-raise mode
    /// ends the run early.
    pub async fn run(&mut self, mut queue: CrawlQueue) -> CrawlResult<RunSummary> {
        let mut summary = RunSummary {
            queued: queue.len(),
            already_present: queue.already_present(),
            ..RunSummary::default()
        };
        info!(
            "🚀 A total of {} links will be attempted ({} already present)",
            summary.queued, summary.already_present
        );

        while let Some(job) = queue.pop() {
            info!("Downloading {} from {}", job.label(), job.request().full_url());
            let (outcome, from_cache) = self.process(job.as_ref()).await;
            if from_cache {
                summary.served_from_cache += 1;
            }

            match outcome {
                Ok(()) => {
                    summary.downloaded += 1;
                    info!("✅ {} saved. So far {} pages downloaded", job.label(), summary.downloaded);
                }
                Err((stage, e)) => {
                    if self.settings.raise_exceptions {
                        error!("❌ {} failed while {}: {}", job.label(), stage, e);
                        return Err(e);
                    }
                    summary.failed += 1;
                    self.record_failure(job.as_ref(), stage, &e).await;
                    error!("So far {} errors", summary.failed);
                }
            }

            if !from_cache && !queue.is_empty() && !self.settings.wait.is_disabled() {
                let wait = self.settings.wait.draw(&mut self.rng);
                info!("⏳ Waiting {:.1}s before the next request", wait.as_secs_f64());
                self.pause.pause(wait).await;
            }
        }

        info!(
            downloaded = summary.downloaded,
            failed = summary.failed,
            already_present = summary.already_present,
            served_from_cache = summary.served_from_cache,
            "🏁 Crawl finished"
        );
        Ok(summary)
    }

    /// Returns the outcome and whether the page came from the cache.
    /// A failed fetch counts as a network round-trip.
    async fn process(&mut self, job: &dyn CrawlJob) -> (Result<(), (ItemStage, CrawlError)>, bool) {
        let page = match self.client.fetch(job.request()).await {
            Ok(page) => page,
            Err(e) => return (Err((ItemStage::Fetching, e)), false),
        };
        let from_cache = page.from_cache;

        let record = match job.extract(&page) {
            Ok(record) => record,
            Err(e) => return (Err((ItemStage::Extracting, e)), from_cache),
        };

        let persisted = record
            .persist(job.output_path())
            .await
            .map_err(|e| (ItemStage::Persisting, e));
        (persisted, from_cache)
    }

    /// A failure log that cannot be written is reported and the run goes on.
    async fn record_failure(&self, job: &dyn CrawlJob, stage: ItemStage, e: &CrawlError) {
        let kind = e.kind();
        let url = job.request().full_url();
        error!(kind, %stage, "❌ {} failed: {}", job.label(), e);
        match storage::append_failure(&self.settings.failure_log_dir, kind, &url).await {
            Ok(log) => warn!("Logged {} to {}", url, log.display()),
            Err(log_error) => error!(
                "Could not log {} to {}: {}",
                url,
                self.settings.failure_log_dir.display(),
                log_error
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_range_rejects_inverted_bounds() {
        assert!(WaitRange::from_seconds(23, 20).is_err());
    }

    #[test]
    fn test_wait_draw_stays_in_range() {
        let range = WaitRange::from_seconds(20, 23).unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..1000 {
            let wait = range.draw(&mut rng);
            assert!(wait >= Duration::from_secs(20) && wait <= Duration::from_secs(23));
        }
    }

    #[test]
    fn test_disabled_wait() {
        assert!(WaitRange::disabled().is_disabled());
        assert!(!WaitRange::from_seconds(0, 1).unwrap().is_disabled());
    }
}
