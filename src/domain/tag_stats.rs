//! Per-tag statistics accumulated over one corpus scan
//!
//! Statistics are two-pass: appearances, impact shares and co-appearances are
//! accumulated while records are read, then `finalize` derives the averages once
//! the total number of records is known.

use serde::Serialize;
use std::collections::BTreeMap;

/// Legacy tag ids folded into their canonical id as `(alias, canonical)`.
pub const TAG_ALIASES: &[(&str, &str)] = &[("2-9", "17")];

/// Resolve a tag id through the known alias table.
pub fn canonical_tag_id(id: &str) -> &str {
    TAG_ALIASES
        .iter()
        .find(|(alias, _)| *alias == id)
        .map_or(id, |(_, canonical)| canonical)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagStats {
    pub name: String,
    pub tag_id: String,
    #[serde(rename = "exp_appearances")]
    pub appearances: u32,
    /// Fraction of the corpus in which the tag appears. `None` until finalized.
    #[serde(rename = "perc_exp_appearances")]
    pub percentage_appearances: Option<f64>,
    /// One entry per appearance: `1 / tags in that experience`.
    #[serde(rename = "perc_usages")]
    pub impact_shares: Vec<f64>,
    pub average_impact: Option<f64>,
    #[serde(skip)]
    pub co_appearances: BTreeMap<String, u32>,
}

impl TagStats {
    pub fn new(name: impl Into<String>, tag_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag_id: tag_id.into(),
            appearances: 0,
            percentage_appearances: None,
            impact_shares: Vec::new(),
            average_impact: None,
            co_appearances: BTreeMap::new(),
        }
    }

    /// Record one appearance in an experience carrying `tags_in_experience` tags.
    pub fn record_appearance(&mut self, tags_in_experience: usize) {
        self.appearances += 1;
        if tags_in_experience > 0 {
            self.impact_shares.push(1.0 / tags_in_experience as f64);
        }
    }

    /// Count one experience where `other_id` appears alongside this tag.
    pub fn record_co_appearance(&mut self, other_id: &str) {
        if other_id == self.tag_id {
            return;
        }
        *self.co_appearances.entry(other_id.to_string()).or_insert(0) += 1;
    }

    pub fn co_appearances_with(&self, other_id: &str) -> u32 {
        self.co_appearances.get(other_id).copied().unwrap_or(0)
    }

    pub fn finalize(&mut self, total_experiences: usize) {
        self.percentage_appearances = (total_experiences > 0)
            .then(|| f64::from(self.appearances) / total_experiences as f64);
        self.average_impact = (!self.impact_shares.is_empty()).then(|| {
            self.impact_shares.iter().sum::<f64>() / self.impact_shares.len() as f64
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_fold() {
        assert_eq!(canonical_tag_id("2-9"), "17");
        assert_eq!(canonical_tag_id("17"), "17");
        assert_eq!(canonical_tag_id("5"), "5");
    }

    #[test]
    fn test_average_impact_is_mean_of_shares() {
        let mut stats = TagStats::new("General", "1");
        stats.record_appearance(4);
        stats.record_appearance(2);
        stats.finalize(4);

        assert_eq!(stats.appearances, 2);
        assert_eq!(stats.impact_shares, vec![0.25, 0.5]);
        assert!((stats.average_impact.unwrap() - 0.375).abs() < f64::EPSILON);
        assert!((stats.percentage_appearances.unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_self_pairs_are_not_counted() {
        let mut stats = TagStats::new("General", "1");
        stats.record_co_appearance("1");
        stats.record_co_appearance("5");
        stats.record_co_appearance("5");
        assert_eq!(stats.co_appearances_with("1"), 0);
        assert_eq!(stats.co_appearances_with("5"), 2);
    }

    #[test]
    fn test_finalize_on_empty_corpus_leaves_ratios_unset() {
        let mut stats = TagStats::new("General", "1");
        stats.finalize(0);
        assert!(stats.percentage_appearances.is_none());
        assert!(stats.average_impact.is_none());
    }
}
