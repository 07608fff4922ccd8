//! CSS selectors for the archive's page layouts
//!
//! Centralized so a markup change on the site is a one-place edit.

use serde::{Deserialize, Serialize};

/// Overridable from the `selectors` section of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSelectors {
    pub experience: ExperienceSelectors,
    pub listing: ListingSelectors,
}

/// Selectors for experience report pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceSelectors {
    /// Container whose direct children hold the report body between marker comments
    pub report_body: String,

    /// Comment opening the report body
    pub body_start_marker: String,

    /// Comment closing the report body
    pub body_end_marker: String,

    pub dose_chart: String,
    pub table_row: String,
    pub table_cell: String,
    pub link: String,
    pub dose_time: String,
    pub dose_amount: String,
    pub dose_method: String,
    pub dose_substance: String,
    pub dose_form: String,

    /// Literal prefix stripped from the dose time cell
    pub dose_time_label: String,

    /// Class prefix shared by every dose chart cell
    pub dose_cell_class_prefix: String,

    pub title: String,
    pub body_weight: String,
    pub footdata: String,

    /// Footer rows containing this text are skipped
    pub pdf_link_text: String,
}

impl Default for ExperienceSelectors {
    fn default() -> Self {
        Self {
            report_body: ".report-text-surround".to_string(),
            body_start_marker: "Start Body".to_string(),
            body_end_marker: "End Body".to_string(),
            dose_chart: ".dosechart".to_string(),
            table_row: "tr".to_string(),
            table_cell: "td".to_string(),
            link: "a".to_string(),
            dose_time: ".dosechart-time".to_string(),
            dose_amount: ".dosechart-amount".to_string(),
            dose_method: ".dosechart-method".to_string(),
            dose_substance: ".dosechart-substance".to_string(),
            dose_form: ".dosechart-form".to_string(),
            dose_time_label: "DOSE:".to_string(),
            dose_cell_class_prefix: "dosechart-".to_string(),
            title: ".title".to_string(),
            body_weight: ".bodyweight-amount".to_string(),
            footdata: ".footdata".to_string(),
            pdf_link_text: "View as PDF".to_string(),
        }
    }
}

/// Selectors for paginated listing pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub table: String,
    pub row: String,
    pub link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            table: ".exp-list-table".to_string(),
            row: "tr".to_string(),
            link: "a".to_string(),
        }
    }
}
