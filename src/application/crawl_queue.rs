//! Work queue population
//!
//! A job is only queued when its output file does not exist yet, so repeated
//! runs over overlapping inputs never fetch a record twice.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use super::crawl_jobs::{CrawlJob, ExperienceJob, ListingJob};
use crate::infrastructure::config::{ListingPlanConfig, erowid};
use crate::infrastructure::crawl_error::CrawlResult;
use crate::infrastructure::parsing::{ExperienceExtractor, ListingExtractor};
use crate::infrastructure::storage;

#[derive(Default)]
pub struct CrawlQueue {
    jobs: VecDeque<Box<dyn CrawlJob>>,
    outputs: HashSet<PathBuf>,
    already_present: usize,
    rejected: usize,
}

impl CrawlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job` unless its output exists or an identical job is queued.
    /// Returns whether the job was added.
    pub async fn push(&mut self, job: Box<dyn CrawlJob>) -> CrawlResult<bool> {
        let output = job.output_path().to_path_buf();
        if self.outputs.contains(&output) {
            debug!("{} already queued", job.label());
            return Ok(false);
        }
        if fs::try_exists(&output).await? {
            debug!("{} already downloaded", job.label());
            self.already_present += 1;
            return Ok(false);
        }
        self.outputs.insert(output);
        self.jobs.push_back(job);
        Ok(true)
    }

    pub fn pop(&mut self) -> Option<Box<dyn CrawlJob>> {
        self.jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs skipped because their output already existed.
    pub fn already_present(&self) -> usize {
        self.already_present
    }

    /// Inputs that could not be turned into a job.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// Builds experience jobs against one output folder.
pub struct ExperienceQueueBuilder {
    output_dir: PathBuf,
    extractor: Arc<ExperienceExtractor>,
}

impl ExperienceQueueBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, extractor: Arc<ExperienceExtractor>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extractor,
        }
    }

    pub async fn add_urls<I>(&self, queue: &mut CrawlQueue, urls: I) -> CrawlResult<usize>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut added = 0;
        for url in urls {
            let url = url.as_ref();
            match ExperienceJob::from_url(url, &self.output_dir, Arc::clone(&self.extractor)) {
                Ok(job) => {
                    if queue.push(Box::new(job)).await? {
                        added += 1;
                    }
                }
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    queue.rejected += 1;
                }
            }
        }
        Ok(added)
    }

    /// One URL per non-blank line of `path`.
    pub async fn add_url_file(&self, queue: &mut CrawlQueue, path: &Path) -> CrawlResult<usize> {
        let urls = storage::read_url_list(path).await?;
        let added = self.add_urls(queue, &urls).await?;
        info!("📄 {} of {} urls queued from {}", added, urls.len(), path.display());
        Ok(added)
    }

    /// Every `*.txt` file of `dir`, in name order.
    pub async fn add_url_folder(&self, queue: &mut CrawlQueue, dir: &Path) -> CrawlResult<usize> {
        let mut added = 0;
        for file in storage::list_url_files(dir).await? {
            added += self.add_url_file(queue, &file).await?;
        }
        Ok(added)
    }

    /// Candidate ids in `[start, end)`, shuffled with a fixed seed so every run
    /// walks the same order.
    pub async fn add_candidate_ids(
        &self,
        queue: &mut CrawlQueue,
        start: u32,
        end: u32,
        seed: u64,
    ) -> CrawlResult<usize> {
        let mut ids: Vec<u32> = (start..end).collect();
        fastrand::Rng::with_seed(seed).shuffle(&mut ids);
        let added = self.add_urls(queue, ids.into_iter().map(erowid::experience_url)).await?;
        info!("🎲 {} candidate ids queued (seed {})", added, seed);
        Ok(added)
    }
}

/// Queue every listing page of `plan`.
pub async fn add_listing_plan(
    queue: &mut CrawlQueue,
    plan: &ListingPlanConfig,
    output_dir: &Path,
    extractor: &Arc<ListingExtractor>,
) -> CrawlResult<usize> {
    let mut added = 0;
    for job in ListingJob::plan(plan, output_dir, extractor) {
        if queue.push(Box::new(job)).await? {
            added += 1;
        }
    }
    info!("📑 {} listing pages queued", added);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn builder(dir: &Path) -> ExperienceQueueBuilder {
        ExperienceQueueBuilder::new(dir, Arc::new(ExperienceExtractor::new().unwrap()))
    }

    #[tokio::test]
    async fn test_existing_outputs_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2.json"), "{}").await.unwrap();

        let mut queue = CrawlQueue::new();
        let added = builder(dir.path())
            .add_urls(
                &mut queue,
                [
                    "https://www.erowid.org/experiences/exp.php?ID=1",
                    "https://www.erowid.org/experiences/exp.php?ID=2",
                    "https://www.erowid.org/experiences/exp.php?ID=1",
                    "https://www.erowid.org/",
                    "https://www.erowid.org/experiences/exp.php?ID=../../escaped",
                ],
            )
            .await
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.already_present(), 1);
        assert_eq!(queue.rejected(), 2);
        assert_eq!(queue.pop().unwrap().label(), "experience 1");
    }

    #[tokio::test]
    async fn test_candidate_order_is_seeded() {
        let dir = tempdir().unwrap();
        let builder = builder(dir.path());

        let mut first = CrawlQueue::new();
        builder.add_candidate_ids(&mut first, 1, 50, 666).await.unwrap();
        let mut second = CrawlQueue::new();
        builder.add_candidate_ids(&mut second, 1, 50, 666).await.unwrap();

        assert_eq!(first.len(), 49);
        while let (Some(a), Some(b)) = (first.pop(), second.pop()) {
            assert_eq!(a.label(), b.label());
        }
    }

    #[tokio::test]
    async fn test_url_folder() {
        let dir = tempdir().unwrap();
        let links = dir.path().join("links");
        storage::write_url_list(
            &links.join("0_1000.txt"),
            &["https://www.erowid.org/experiences/exp.php?ID=10".to_string()],
        )
        .await
        .unwrap();
        storage::write_url_list(
            &links.join("1000_2000.txt"),
            &[
                "https://www.erowid.org/experiences/exp.php?ID=11".to_string(),
                "https://www.erowid.org/experiences/exp.php?ID=10".to_string(),
            ],
        )
        .await
        .unwrap();

        let mut queue = CrawlQueue::new();
        let added = builder(&dir.path().join("out"))
            .add_url_folder(&mut queue, &links)
            .await
            .unwrap();
        assert_eq!(added, 2);
    }

    #[tokio::test]
    async fn test_listing_plan_skips_downloaded_pages() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0_1000.txt"), "").await.unwrap();
        let plan = ListingPlanConfig {
            start: 0,
            step: 1000,
            final_start: 3000,
        };

        let mut queue = CrawlQueue::new();
        let extractor = Arc::new(ListingExtractor::new().unwrap());
        let added = add_listing_plan(&mut queue, &plan, dir.path(), &extractor).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(queue.already_present(), 1);
        assert_eq!(queue.pop().unwrap().label(), "listing 1000_2000");
    }
}
