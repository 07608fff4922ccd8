//! Infrastructure layer: configuration, logging, HTTP, caching, parsing and storage
//!
//! Everything that touches the network, the filesystem or the markup lives here.
//! The application layer drives these pieces through `FetchClient` and the
//! `RecordExtractor` implementations.

pub mod config;
pub mod crawl_error;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod proxy_rotator;
pub mod response_cache;
pub mod storage;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, ProxyCredentials, erowid};
pub use crawl_error::{CrawlError, CrawlResult};
pub use http_client::{FetchClient, FetchedPage, PageRequest, RawResponse, ReqwestTransport, Transport, TransportError};
pub use logging::init_logging_with_config;
pub use parsing::{ExperienceExtractor, ExtractContext, ListingExtractor, RecordExtractor};
pub use parsing_error::{ParsingError, ParsingResult};
pub use proxy_rotator::{ProxyEndpoint, ProxyRotator};
pub use response_cache::{CacheEntry, MemoryResponseCache, ResponseCache, SqliteResponseCache};
