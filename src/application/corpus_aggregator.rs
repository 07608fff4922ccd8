//! Tag statistics over the persisted experience corpus
//!
//! `CorpusAggregator::scan` reads every `<id>.json` document in a folder once,
//! folds known tag aliases, accumulates `TagStats` and finalizes the ratios
//! after the pass. The co-appearance matrix is derived from the result.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::{Experience, TagStats, canonical_tag_id};
use crate::infrastructure::crawl_error::CrawlResult;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

const RECORD_FILE_PATTERN: &str = r"^(\d+)\.json$";

/// Token that marks a copy of another record file, e.g. `1234 (1).json`
pub const DUPLICATE_MARKER: &str = "(1)";

pub struct CorpusAggregator {
    file_pattern: Regex,
}

impl CorpusAggregator {
    pub fn new() -> ParsingResult<Self> {
        let file_pattern = Regex::new(RECORD_FILE_PATTERN).map_err(|e| ParsingError::InvalidPattern {
            pattern: RECORD_FILE_PATTERN.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { file_pattern })
    }

    /// Record id from a file name, or `None` for anything but `<digits>.json`.
    pub fn record_id(&self, file_name: &str) -> Option<String> {
        self.file_pattern
            .captures(file_name)
            .map(|caps| caps[1].to_string())
    }

    pub async fn scan(&self, folder: &Path) -> CrawlResult<TagCorpus> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        info!("📊 Scanning {} record files in {}", files.len(), folder.display());

        let mut corpus = TagCorpus::default();
        for path in files {
            match self.load(&path).await {
                Some(experience) => corpus.add_experience(&experience),
                None => corpus.skipped_files.push(path),
            }
        }
        corpus.finalize();

        info!(
            experiences = corpus.total_experiences,
            tags = corpus.tags.len(),
            skipped = corpus.skipped_files.len(),
            "Corpus scan complete"
        );
        Ok(corpus)
    }

    /// Unreadable, misnamed and duplicate files are skipped with a warning.
    async fn load(&self, path: &Path) -> Option<Experience> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        if file_name.contains(DUPLICATE_MARKER) {
            warn!("⚠️  Duplicate file: {}", path.display());
            return None;
        }
        let Some(id) = self.record_id(&file_name) else {
            warn!("⚠️  Cannot read a record id from {}", path.display());
            return None;
        };
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("⚠️  Cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        match Experience::from_json(id, &content) {
            Ok(experience) => Some(experience),
            Err(e) => {
                warn!("⚠️  Cannot parse {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TagCorpus {
    /// Keyed by canonical tag id
    pub tags: BTreeMap<String, TagStats>,
    /// Records successfully read, each counted once
    pub total_experiences: usize,
    pub skipped_files: Vec<PathBuf>,
}

impl TagCorpus {
    /// Aggregate already loaded experiences.
    pub fn from_experiences<'a>(experiences: impl IntoIterator<Item = &'a Experience>) -> Self {
        let mut corpus = Self::default();
        for experience in experiences {
            corpus.add_experience(experience);
        }
        corpus.finalize();
        corpus
    }

    fn add_experience(&mut self, experience: &Experience) {
        self.total_experiences += 1;

        let mut ids: Vec<&str> = Vec::with_capacity(experience.tags.len());
        for tag in &experience.tags {
            let id = canonical_tag_id(&tag.id);
            if ids.contains(&id) {
                continue;
            }
            ids.push(id);
            self.tags
                .entry(id.to_string())
                .or_insert_with(|| TagStats::new(tag.name.clone(), id));
        }

        for id in &ids {
            let Some(stats) = self.tags.get_mut(*id) else {
                continue;
            };
            stats.record_appearance(ids.len());
            for other in &ids {
                stats.record_co_appearance(other);
            }
        }
        debug!("Experience {} carries {} tags", experience.id, ids.len());
    }

    fn finalize(&mut self) {
        for stats in self.tags.values_mut() {
            stats.finalize(self.total_experiences);
        }
    }

    pub fn get(&self, tag_id: &str) -> Option<&TagStats> {
        self.tags.get(tag_id)
    }

    /// Tags ordered by appearances, most frequent first.
    pub fn ranked(&self) -> Vec<&TagStats> {
        let mut ranked: Vec<&TagStats> = self.tags.values().collect();
        ranked.sort_by(|a, b| b.appearances.cmp(&a.appearances).then_with(|| a.tag_id.cmp(&b.tag_id)));
        ranked
    }

    pub async fn write_summary_json(&self, path: &Path) -> CrawlResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.ranked())?).await?;
        info!("💾 Tag summary written to {}", path.display());
        Ok(())
    }

    /// Display label per tag id. Names shared by several ids get the id appended.
    fn labels(&self) -> HashMap<&str, String> {
        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for stats in self.tags.values() {
            *name_counts.entry(stats.name.as_str()).or_insert(0) += 1;
        }
        self.tags
            .iter()
            .map(|(id, stats)| {
                let label = if name_counts.get(stats.name.as_str()).copied().unwrap_or(0) > 1 {
                    format!("{} ({})", stats.name, id)
                } else {
                    stats.name.clone()
                };
                (id.as_str(), label)
            })
            .collect()
    }

    /// Square matrix over every tag, rows and columns sorted by label.
    pub fn co_appearance_matrix(&self) -> CoAppearanceMatrix {
        let labels = self.labels();
        let mut order: Vec<(&str, &String)> = labels.iter().map(|(id, label)| (*id, label)).collect();
        order.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

        let cells = order
            .iter()
            .map(|(row_id, _)| {
                let row = self.tags.get(*row_id);
                order
                    .iter()
                    .map(|(column_id, _)| row.and_then(|stats| stats.co_appearances.get(*column_id).copied()))
                    .collect()
            })
            .collect();

        CoAppearanceMatrix {
            labels: order.into_iter().map(|(_, label)| label.clone()).collect(),
            cells,
        }
    }
}

/// Co-appearance counts; `None` where two tags never met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoAppearanceMatrix {
    labels: Vec<String>,
    cells: Vec<Vec<Option<u32>>>,
}

impl CoAppearanceMatrix {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Count for a pair of labels, zero when absent.
    pub fn get(&self, row: &str, column: &str) -> u32 {
        match (self.index_of(row), self.index_of(column)) {
            (Some(r), Some(c)) => self.cells[r][c].unwrap_or(0),
            _ => 0,
        }
    }

    /// Header row of labels, then one row per label; absent cells are left empty.
    pub fn write_csv(&self, path: &Path) -> CrawlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = Vec::with_capacity(self.labels.len() + 1);
        header.push("tag".to_string());
        header.extend(self.labels.iter().cloned());
        writer.write_record(&header)?;

        for (label, row) in self.labels.iter().zip(&self.cells) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(label.clone());
            record.extend(row.iter().map(|cell| cell.map(|n| n.to_string()).unwrap_or_default()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        info!("💾 Co-appearance matrix ({} tags) written to {}", self.labels.len(), path.display());
        Ok(())
    }
}
