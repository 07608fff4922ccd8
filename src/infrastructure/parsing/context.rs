//! Context passed alongside a parsed page

/// Where the page came from, for error reporting and record ids.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// URL the page was fetched from
    pub url: String,

    /// Id of the record being extracted, when the page kind has one
    pub record_id: Option<String>,
}

impl ExtractContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            record_id: None,
        }
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn record_id(&self) -> &str {
        self.record_id.as_deref().unwrap_or("")
    }
}
