//! Best-effort parsing of `Name (123), Other Name (45)` lists
//!
//! Fragments that don't end in a parenthesized numeric id are skipped, and the
//! skipped text is handed back so callers can log or assert on it.

use regex::Regex;

use super::{ParsingError, ParsingResult};
use crate::domain::NamedRef;

const NAMED_ID_PATTERN: &str = r"^[\s\[]*(.+?)\s*\((\d+)\)[\s\]]*$";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagListParse {
    pub entries: Vec<NamedRef>,
    /// Non-blank fragments that did not match `name (digits)`
    pub skipped: Vec<String>,
}

impl TagListParse {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
        self.skipped.extend(other.skipped);
    }
}

#[derive(Debug, Clone)]
pub struct TagListParser {
    pattern: Regex,
}

impl TagListParser {
    pub fn new() -> ParsingResult<Self> {
        let pattern = Regex::new(NAMED_ID_PATTERN).map_err(|e| ParsingError::InvalidPattern {
            pattern: NAMED_ID_PATTERN.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    /// Split on commas and parse each fragment independently.
    pub fn parse(&self, text: &str) -> TagListParse {
        let mut result = TagListParse::default();
        for fragment in text.split(',') {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            match self.pattern.captures(fragment) {
                Some(caps) => result.entries.push(NamedRef::new(caps[1].trim(), &caps[2])),
                None => result.skipped.push(fragment.to_string()),
            }
        }
        result
    }
}
