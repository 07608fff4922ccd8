//! Crawl jobs: one page to fetch, one extractor to run, one output to write
//!
//! Both job kinds share the `CrawlJob` contract so the coordinator can drive
//! them without knowing which page kind it is handling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::Experience;
use crate::infrastructure::config::ListingPlanConfig;
use crate::infrastructure::config::erowid::{LISTING_FIXED_PARAMS, LISTING_URL};
use crate::infrastructure::crawl_error::{CrawlError, CrawlResult};
use crate::infrastructure::http_client::{FetchedPage, PageRequest};
use crate::infrastructure::parsing::{ExperienceExtractor, ExtractContext, ListingExtractor, RecordExtractor};
use crate::infrastructure::storage;

/// What a successful extraction produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedRecord {
    Experience(Experience),
    Listing(Vec<String>),
}

impl ExtractedRecord {
    /// Write the record to `path`, replacing any previous content.
    pub async fn persist(&self, path: &Path) -> CrawlResult<()> {
        match self {
            Self::Experience(experience) => storage::write_experience(path, experience).await,
            Self::Listing(urls) => storage::write_url_list(path, urls).await,
        }
    }
}

pub trait CrawlJob: Send + Sync {
    /// Human readable label used in logs, e.g. `experience 1234`
    fn label(&self) -> String;

    fn request(&self) -> &PageRequest;

    /// Deterministic output location; an existing file means the job is done.
    fn output_path(&self) -> &Path;

    fn extract(&self, page: &FetchedPage) -> CrawlResult<ExtractedRecord>;
}

pub struct ExperienceJob {
    id: String,
    request: PageRequest,
    output_path: PathBuf,
    extractor: Arc<ExperienceExtractor>,
}

impl ExperienceJob {
    /// Fails with `InvalidUrl` when no experience id can be read from `url`.
    pub fn from_url(url: &str, output_dir: &Path, extractor: Arc<ExperienceExtractor>) -> CrawlResult<Self> {
        let id = storage::experience_id_from_url(url).ok_or_else(|| CrawlError::InvalidUrl {
            url: url.to_string(),
            reason: "no experience id".to_string(),
        })?;
        Ok(Self {
            output_path: output_dir.join(format!("{id}.json")),
            request: PageRequest::new(url),
            id,
            extractor,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl CrawlJob for ExperienceJob {
    fn label(&self) -> String {
        format!("experience {}", self.id)
    }

    fn request(&self) -> &PageRequest {
        &self.request
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn extract(&self, page: &FetchedPage) -> CrawlResult<ExtractedRecord> {
        let context = ExtractContext::new(&self.request.url).with_record_id(&self.id);
        let experience = self.extractor.extract(&page.document(), &context)?;
        Ok(ExtractedRecord::Experience(experience))
    }
}

pub struct ListingJob {
    start: u32,
    page_size: u32,
    request: PageRequest,
    output_path: PathBuf,
    extractor: Arc<ListingExtractor>,
}

impl ListingJob {
    pub fn new(start: u32, page_size: u32, output_dir: &Path, extractor: Arc<ListingExtractor>) -> Self {
        let mut params: Vec<(String, String)> = LISTING_FIXED_PARAMS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        params.push(("Start".to_string(), start.to_string()));
        params.push(("Max".to_string(), page_size.to_string()));

        Self {
            start,
            page_size,
            request: PageRequest::with_params(LISTING_URL, params),
            output_path: output_dir.join(format!("{}_{}.txt", start, start + page_size)),
            extractor,
        }
    }

    /// Every page of the plan: `start`, `start + step`, ... while below `final_start`.
    pub fn plan(plan: &ListingPlanConfig, output_dir: &Path, extractor: &Arc<ListingExtractor>) -> Vec<Self> {
        if plan.step == 0 {
            return Vec::new();
        }
        (plan.start..plan.final_start)
            .step_by(plan.step as usize)
            .map(|start| Self::new(start, plan.step, output_dir, Arc::clone(extractor)))
            .collect()
    }

    pub fn start(&self) -> u32 {
        self.start
    }
}

impl CrawlJob for ListingJob {
    fn label(&self) -> String {
        format!("listing {}_{}", self.start, self.start + self.page_size)
    }

    fn request(&self) -> &PageRequest {
        &self.request
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn extract(&self, page: &FetchedPage) -> CrawlResult<ExtractedRecord> {
        let context = ExtractContext::new(&page.url);
        let urls = self.extractor.extract(&page.document(), &context)?;
        Ok(ExtractedRecord::Listing(urls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> FetchedPage {
        FetchedPage {
            url: "https://www.erowid.org/experiences/exp.php?ID=7".to_string(),
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
            from_cache: false,
        }
    }

    #[test]
    fn test_experience_job_paths() {
        let extractor = Arc::new(ExperienceExtractor::new().unwrap());
        let job = ExperienceJob::from_url(
            "https://www.erowid.org/experiences/exp.php?ID=7",
            Path::new("out"),
            extractor,
        )
        .unwrap();
        assert_eq!(job.id(), "7");
        assert_eq!(job.output_path(), Path::new("out/7.json"));
        assert_eq!(job.label(), "experience 7");
    }

    #[test]
    fn test_experience_job_rejects_url_without_id() {
        let extractor = Arc::new(ExperienceExtractor::new().unwrap());
        let err = ExperienceJob::from_url("https://www.erowid.org/", Path::new("out"), extractor)
            .err()
            .unwrap();
        assert_eq!(err.kind(), "InvalidUrl");
    }

    #[test]
    fn test_experience_job_extracts_with_record_id() {
        let extractor = Arc::new(ExperienceExtractor::new().unwrap());
        let job = ExperienceJob::from_url(
            "https://www.erowid.org/experiences/exp.php?ID=7",
            Path::new("out"),
            extractor,
        )
        .unwrap();
        let record = job
            .extract(&page(
                r#"<div class="title">T</div>
                   <div class="report-text-surround"><!-- Start Body -->p<!-- End Body --></div>"#,
            ))
            .unwrap();
        match record {
            ExtractedRecord::Experience(experience) => assert_eq!(experience.id, "7"),
            ExtractedRecord::Listing(_) => panic!("expected an experience"),
        }
    }

    #[test]
    fn test_listing_plan_offsets_and_names() {
        let extractor = Arc::new(ListingExtractor::new().unwrap());
        let plan = ListingPlanConfig {
            start: 0,
            step: 1000,
            final_start: 39_300,
        };
        let jobs = ListingJob::plan(&plan, Path::new("links"), &extractor);

        assert_eq!(jobs.len(), 40);
        assert_eq!(jobs[0].output_path(), Path::new("links/0_1000.txt"));
        assert_eq!(jobs[39].start(), 39_000);
        assert_eq!(jobs[39].output_path(), Path::new("links/39000_40000.txt"));

        let key = jobs[1].request().cache_key().unwrap();
        assert!(key.starts_with("https://www.erowid.org/experiences/exp.cgi?"));
        for param in ["ShowViews=0", "Cellar=1", "Start=1000", "Max=1000"] {
            assert!(key.contains(param), "{key} lacks {param}");
        }
    }

    #[test]
    fn test_listing_plan_with_zero_step_is_empty() {
        let extractor = Arc::new(ListingExtractor::new().unwrap());
        let plan = ListingPlanConfig {
            start: 0,
            step: 0,
            final_start: 10,
        };
        assert!(ListingJob::plan(&plan, Path::new("links"), &extractor).is_empty());
    }
}
