//! Command line entry point
//!
//! ```bash
//! erowid-crawler listings                 # crawl listing pages into data/exp_links
//! erowid-crawler experiences --folder data/exp_links
//! erowid-crawler experiences              # seeded candidate ids
//! erowid-crawler tags --matrix tags.csv
//! erowid-crawler purge-cache --kind BlockedByOrigin
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use erowid_crawler_lib::application::{
    CoordinatorSettings, CorpusAggregator, CrawlCoordinator, CrawlQueue, DEFAULT_PURGE_KINDS,
    ExperienceQueueBuilder, RunSummary, TokioPause, add_listing_plan, purge_failed_urls,
};
use erowid_crawler_lib::infrastructure::{
    AppConfig, ConfigManager, ExperienceExtractor, FetchClient, ListingExtractor,
    MemoryResponseCache, ProxyCredentials, ProxyRotator, ReqwestTransport, ResponseCache,
    SqliteResponseCache, erowid, init_logging_with_config,
};

const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";

#[derive(Debug, Parser)]
#[command(
    name = "erowid-crawler",
    version,
    about = "Crawl the Erowid experience vault and aggregate tag statistics"
)]
struct Cli {
    /// Configuration file (created with defaults when missing)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Proxy credentials document: {"username", "password", "servers"}
    #[arg(long, global = true, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Connect directly instead of through the proxy pool
    #[arg(long, global = true, default_value_t = false)]
    no_proxy: bool,

    /// Override the configured log level
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download experience reports
    Experiences {
        /// Text file with one experience URL per line (repeatable)
        #[arg(long = "urls", value_name = "FILE")]
        url_files: Vec<PathBuf>,

        /// Folder of URL list files
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,

        /// Skip the wait between non-cached requests
        #[arg(long, default_value_t = false)]
        no_wait: bool,

        /// Stop at the first failing item
        #[arg(long, default_value_t = false)]
        raise: bool,
    },

    /// Download the paginated experience listings
    Listings {
        /// Wait between non-cached listing pages
        #[arg(long, default_value_t = false)]
        wait: bool,
    },

    /// Aggregate tag statistics over downloaded experiences
    Tags {
        /// Folder of experience documents (defaults to the configured output)
        #[arg(long, value_name = "DIR")]
        input: Option<PathBuf>,

        /// Write the per-tag summary as JSON
        #[arg(long, value_name = "FILE")]
        summary: Option<PathBuf>,

        /// Write the co-appearance matrix as CSV
        #[arg(long, value_name = "FILE")]
        matrix: Option<PathBuf>,
    },

    /// Remove URLs listed in failure logs from the response cache
    PurgeCache {
        /// Failure kind to purge (repeatable)
        #[arg(long = "kind", value_name = "KIND")]
        kinds: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    init_logging_with_config(&config.logging)?;
    info!("Using configuration {}", manager.config_path().display());

    match &cli.command {
        Command::Experiences {
            url_files,
            folder,
            no_wait,
            raise,
        } => {
            if *raise {
                config.crawl.raise_exceptions = true;
            }
            let summary = crawl_experiences(&cli, &config, url_files, folder.as_deref(), *no_wait).await?;
            log_summary(&summary);
        }
        Command::Listings { wait } => {
            let summary = crawl_listings(&cli, &config, *wait).await?;
            log_summary(&summary);
        }
        Command::Tags {
            input,
            summary,
            matrix,
        } => {
            let folder = input.clone().unwrap_or_else(|| config.crawl.experiences_dir.clone());
            aggregate_tags(&folder, summary.as_deref(), matrix.as_deref()).await?;
        }
        Command::PurgeCache { kinds } => {
            let cache = open_cache(&config).await?;
            let kinds: Vec<String> = if kinds.is_empty() {
                DEFAULT_PURGE_KINDS.iter().map(|k| (*k).to_string()).collect()
            } else {
                kinds.clone()
            };
            purge_failed_urls(cache.as_ref(), &config.crawl.failure_log_dir, kinds.as_slice()).await?;
        }
    }
    Ok(())
}

async fn crawl_experiences(
    cli: &Cli,
    config: &AppConfig,
    url_files: &[PathBuf],
    folder: Option<&Path>,
    no_wait: bool,
) -> Result<RunSummary> {
    let extractor = Arc::new(ExperienceExtractor::with_config(&config.selectors.experience)?);
    let builder = ExperienceQueueBuilder::new(&config.crawl.experiences_dir, extractor);
    let mut queue = CrawlQueue::new();

    for file in url_files {
        builder
            .add_url_file(&mut queue, file)
            .await
            .with_context(|| format!("Failed to read URL list {}", file.display()))?;
    }
    if let Some(folder) = folder {
        builder
            .add_url_folder(&mut queue, folder)
            .await
            .with_context(|| format!("Failed to read URL folder {}", folder.display()))?;
    }
    if url_files.is_empty() && folder.is_none() {
        let crawl = &config.crawl;
        builder
            .add_candidate_ids(&mut queue, crawl.candidate_id_start, crawl.candidate_id_end, crawl.candidate_seed)
            .await?;
    }

    let mut settings = CoordinatorSettings::from_config(&config.crawl)?;
    if no_wait {
        settings = settings.without_wait();
    }
    run_queue(cli, config, queue, settings).await
}

async fn crawl_listings(cli: &Cli, config: &AppConfig, wait: bool) -> Result<RunSummary> {
    let extractor = Arc::new(ListingExtractor::with_config(
        &config.selectors.listing,
        erowid::LISTING_LINK_BASE,
    )?);
    let mut queue = CrawlQueue::new();
    add_listing_plan(&mut queue, &config.crawl.listing, &config.crawl.listings_dir, &extractor).await?;

    let mut settings = CoordinatorSettings::from_config(&config.crawl)?;
    if !wait {
        settings = settings.without_wait();
    }
    run_queue(cli, config, queue, settings).await
}

async fn run_queue(
    cli: &Cli,
    config: &AppConfig,
    queue: CrawlQueue,
    settings: CoordinatorSettings,
) -> Result<RunSummary> {
    let cache = open_cache(config).await?;
    let rotator = load_rotator(cli, config).await?;
    let transport = Arc::new(ReqwestTransport::new(config.http.clone()));
    let client = FetchClient::new(transport, cache, rotator, config.http.block_marker.clone());

    let mut coordinator = CrawlCoordinator::new(client, Arc::new(TokioPause), settings);
    Ok(coordinator.run(queue).await?)
}

async fn open_cache(config: &AppConfig) -> Result<Arc<dyn ResponseCache>> {
    if !config.cache.enabled {
        warn!("Response cache disabled, every page goes to the network");
        return Ok(Arc::new(MemoryResponseCache::new()));
    }
    let cache = SqliteResponseCache::open(&config.cache.path)
        .await
        .with_context(|| format!("Failed to open response cache {}", config.cache.path.display()))?;
    Ok(Arc::new(cache))
}

async fn load_rotator(cli: &Cli, config: &AppConfig) -> Result<Option<ProxyRotator>> {
    if cli.no_proxy {
        info!("Proxy disabled from the command line");
        return Ok(None);
    }
    let path = match &cli.credentials {
        Some(path) => path.clone(),
        None => {
            let default = PathBuf::from(DEFAULT_CREDENTIALS_PATH);
            if !tokio::fs::try_exists(&default).await? {
                warn!("No {} found, connecting without proxy", DEFAULT_CREDENTIALS_PATH);
                return Ok(None);
            }
            default
        }
    };
    let credentials = ProxyCredentials::load(&path)
        .await
        .with_context(|| format!("Failed to load proxy credentials {}", path.display()))?;
    let rotator = ProxyRotator::from_credentials(&credentials, &config.http)?;
    info!("🔀 Rotating over {} proxy servers", rotator.len());
    Ok(Some(rotator))
}

async fn aggregate_tags(folder: &Path, summary: Option<&Path>, matrix: Option<&Path>) -> Result<()> {
    let corpus = CorpusAggregator::new()?.scan(folder).await?;
    for stats in corpus.ranked().into_iter().take(10) {
        info!(
            "{} ({}) in {} experiences, average impact {:.3}",
            stats.name,
            stats.tag_id,
            stats.appearances,
            stats.average_impact.unwrap_or_default()
        );
    }
    if let Some(path) = summary {
        corpus.write_summary_json(path).await?;
    }
    if let Some(path) = matrix {
        corpus.co_appearance_matrix().write_csv(path)?;
    }
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Run complete: {} downloaded, {} failed, {} already present, {} from cache",
        summary.downloaded, summary.failed, summary.already_present, summary.served_from_cache
    );
}
