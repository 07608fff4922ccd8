//! Structural extraction errors
//!
//! These are raised when a fetched page does not have the shape the extractors
//! expect. Low-signal conditions (empty narrative, missing body weight, tag
//! fragments that do not parse) are logged as warnings instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Missing experience report body for {url}")]
    MissingRecordBody { url: String },

    #[error("Missing title for {url}")]
    MissingTitle { url: String },

    #[error("Listing table not found on {url}")]
    MalformedListing { url: String },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid pattern: {pattern} - {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ParsingError {
    pub fn missing_record_body(url: &str) -> Self {
        Self::MissingRecordBody {
            url: url.to_string(),
        }
    }

    pub fn missing_title(url: &str) -> Self {
        Self::MissingTitle {
            url: url.to_string(),
        }
    }

    pub fn malformed_listing(url: &str) -> Self {
        Self::MalformedListing {
            url: url.to_string(),
        }
    }

    /// Stable name used for failure logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRecordBody { .. } => "MissingRecordBody",
            Self::MissingTitle { .. } => "MissingTitle",
            Self::MalformedListing { .. } => "MalformedListing",
            Self::InvalidSelector { .. } => "InvalidSelector",
            Self::InvalidPattern { .. } => "InvalidPattern",
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
