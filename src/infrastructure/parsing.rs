//! HTML extraction for experience and listing pages
//!
//! Both page kinds implement `RecordExtractor`; selectors are compiled once
//! when an extractor is built and every extraction allocates its own output.

pub mod config;
pub mod context;
pub mod experience_parser;
pub mod listing_parser;
pub mod tag_list;

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
pub use config::{ExperienceSelectors, ExtractionSelectors, ListingSelectors};
pub use context::ExtractContext;
pub use experience_parser::ExperienceExtractor;
pub use listing_parser::ListingExtractor;
pub use tag_list::{TagListParse, TagListParser};

use scraper::{ElementRef, Html, Selector};

/// Turns a parsed page into a typed record.
pub trait RecordExtractor {
    type Output;

    fn extract(&self, html: &Html, context: &ExtractContext) -> ParsingResult<Self::Output>;
}

pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Concatenated text of an element, trimmed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first match of `selector` under `element`, or an empty string.
pub(crate) fn first_text(element: ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}
