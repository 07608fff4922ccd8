//! Erowid experience archive crawler
//!
//! Fetches experience reports and listing pages through rotating proxies and a
//! durable response cache, extracts them into JSON records, and aggregates tag
//! statistics over the resulting corpus.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
