//! Listing page extraction: one experience URL per table row

use scraper::{Html, Selector};
use tracing::debug;

use super::config::ListingSelectors;
use super::{ExtractContext, ParsingError, ParsingResult, RecordExtractor, compile_selector};
use crate::infrastructure::config::erowid::LISTING_LINK_BASE;

pub struct ListingExtractor {
    table: Selector,
    row: Selector,
    link: Selector,
    link_base: String,
}

impl ListingExtractor {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ListingSelectors::default(), LISTING_LINK_BASE)
    }

    pub fn with_config(selectors: &ListingSelectors, link_base: &str) -> ParsingResult<Self> {
        Ok(Self {
            table: compile_selector(&selectors.table)?,
            row: compile_selector(&selectors.row)?,
            link: compile_selector(&selectors.link)?,
            link_base: link_base.to_string(),
        })
    }
}

impl RecordExtractor for ListingExtractor {
    type Output = Vec<String>;

    /// A missing table is an error: an empty result would read as the end of the listing.
    fn extract(&self, html: &Html, context: &ExtractContext) -> ParsingResult<Vec<String>> {
        let table = html
            .select(&self.table)
            .next()
            .ok_or_else(|| ParsingError::malformed_listing(&context.url))?;

        let urls: Vec<String> = table
            .select(&self.row)
            .filter_map(|row| row.select(&self.link).next())
            .filter_map(|link| link.value().attr("href"))
            .map(|href| format!("{}{}", self.link_base, href.trim()))
            .collect();

        debug!("Found {} experience links on {}", urls.len(), context.url);
        Ok(urls)
    }
}
