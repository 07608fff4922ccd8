//! Response cache maintenance
//!
//! URLs that failed in a previous run may have a bad page cached (a block page
//! stored before detection, a truncated listing). Purging them from the cache
//! makes the next run refetch them from the network.

use std::path::Path;

use tokio::fs;
use tracing::{info, warn};

use crate::infrastructure::crawl_error::CrawlResult;
use crate::infrastructure::http_client::PageRequest;
use crate::infrastructure::response_cache::ResponseCache;
use crate::infrastructure::storage;

/// Failure kinds purged when none are given explicitly.
pub const DEFAULT_PURGE_KINDS: &[&str] = &[
    "ConnectionFailure",
    "BlockedByOrigin",
    "HttpStatus",
    "MissingRecordBody",
    "MissingTitle",
    "MalformedListing",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// URLs read from the failure logs
    pub listed: usize,
    /// Entries actually removed from the cache
    pub removed: usize,
    /// Logs that did not exist
    pub missing_logs: usize,
}

/// Invalidate every URL listed in the failure logs of `kinds` under `failure_log_dir`.
pub async fn purge_failed_urls<S: AsRef<str>>(
    cache: &dyn ResponseCache,
    failure_log_dir: &Path,
    kinds: &[S],
) -> CrawlResult<PurgeReport> {
    let mut report = PurgeReport::default();

    for kind in kinds {
        let log = storage::failure_log_path(failure_log_dir, kind.as_ref());
        if !fs::try_exists(&log).await? {
            warn!("No failure log at {}", log.display());
            report.missing_logs += 1;
            continue;
        }

        for url in storage::read_url_list(&log).await? {
            report.listed += 1;
            let key = match PageRequest::new(&url).cache_key() {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    continue;
                }
            };
            if cache.invalidate(&key).await? {
                report.removed += 1;
            }
        }
    }

    info!(
        listed = report.listed,
        removed = report.removed,
        "🧹 Cache purge finished"
    );
    Ok(report)
}
