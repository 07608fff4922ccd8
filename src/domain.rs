//! Domain module - records extracted from the archive and corpus statistics
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod experience;
pub mod tag_stats;

pub use experience::{Experience, NamedRef, SubstanceUsage, BODY_WEIGHT_KEY};
pub use tag_stats::{canonical_tag_id, TagStats, TAG_ALIASES};
