//! Item-level crawl errors
//!
//! Every error that can end a single queue item. The coordinator catches these,
//! appends the item's URL to `failed_urls_<kind>.txt`, and moves on.

use thiserror::Error;

use super::parsing_error::ParsingError;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Connection failed for {url}: {reason}")]
    ConnectionFailure { url: String, reason: String },

    #[error("Blocked by origin while fetching {url}")]
    BlockedByOrigin { url: String },

    #[error("HTTP error {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP request failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error(transparent)]
    Parsing(#[from] ParsingError),

    #[error("Response cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    Export(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl CrawlError {
    pub fn connection_failure(url: &str, reason: impl ToString) -> Self {
        Self::ConnectionFailure {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn blocked_by_origin(url: &str) -> Self {
        Self::BlockedByOrigin {
            url: url.to_string(),
        }
    }

    /// Stable PascalCase name, used to route the item into its failure log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "ConnectionFailure",
            Self::BlockedByOrigin { .. } => "BlockedByOrigin",
            Self::HttpStatus { .. } => "HttpStatus",
            Self::Transport { .. } => "Transport",
            Self::Parsing(e) => e.kind(),
            Self::Cache(_) => "Cache",
            Self::Io(_) => "Io",
            Self::Serialization(_) => "Serialization",
            Self::Export(_) => "Export",
            Self::Configuration(_) => "Configuration",
            Self::InvalidUrl { .. } => "InvalidUrl",
        }
    }

    /// Whether the fetch layer may spend its single retry on this error.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. })
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(
            CrawlError::connection_failure("u", "reset").kind(),
            "ConnectionFailure"
        );
        assert_eq!(CrawlError::blocked_by_origin("u").kind(), "BlockedByOrigin");
        assert_eq!(
            CrawlError::from(ParsingError::missing_title("u")).kind(),
            "MissingTitle"
        );
        assert_eq!(
            CrawlError::HttpStatus {
                status: 404,
                url: "u".into()
            }
            .kind(),
            "HttpStatus"
        );
    }
}
