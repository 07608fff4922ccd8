//! Application layer module
//!
//! This module contains the crawl pipeline (jobs, queue, coordinator) and the
//! offline operations that work on its outputs (corpus aggregation, cache
//! maintenance).

pub mod cache_maintenance;
pub mod corpus_aggregator;
pub mod crawl_coordinator;
pub mod crawl_jobs;
pub mod crawl_queue;

pub use cache_maintenance::{DEFAULT_PURGE_KINDS, PurgeReport, purge_failed_urls};
pub use corpus_aggregator::{CoAppearanceMatrix, CorpusAggregator, TagCorpus};
pub use crawl_coordinator::{CoordinatorSettings, CrawlCoordinator, Pause, RunSummary, TokioPause, WaitRange};
pub use crawl_jobs::{CrawlJob, ExperienceJob, ExtractedRecord, ListingJob};
pub use crawl_queue::{CrawlQueue, ExperienceQueueBuilder, add_listing_plan};
