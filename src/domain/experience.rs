use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key that is always present on an extracted experience.
pub const BODY_WEIGHT_KEY: &str = "body_weight";

/// A `{name, id}` pair as printed in the report footer, e.g. `Small Group (5)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedRef {
    pub name: String,
    pub id: String,
}

impl NamedRef {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// One row of the dose chart. Missing cells are kept as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstanceUsage {
    pub use_time: String,
    pub amount: String,
    pub method: String,
    pub substance_id: String,
    pub substance_name: String,
    pub form: String,
}

/// Normalized experience report, immutable once extracted.
///
/// The serialized shape is the on-disk document format: one JSON file per
/// experience named `<id>.json`. The id lives in the file name, not in the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    #[serde(skip)]
    pub id: String,
    pub title: String,
    #[serde(rename = "story_paragraphs")]
    pub narrative: Vec<String>,
    #[serde(rename = "substances_details")]
    pub substance_usages: Vec<SubstanceUsage>,
    #[serde(rename = "substances_main")]
    pub substances_simple: Vec<NamedRef>,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<NamedRef>,
}

impl Experience {
    pub fn body_weight(&self) -> &str {
        self.metadata
            .get(BODY_WEIGHT_KEY)
            .map_or("", String::as_str)
    }

    /// Parse a persisted document, attaching the id recovered from its file name.
    pub fn from_json(id: impl Into<String>, json: &str) -> serde_json::Result<Self> {
        let mut experience: Self = serde_json::from_str(json)?;
        experience.id = id.into();
        Ok(experience)
    }
}
