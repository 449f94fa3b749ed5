pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod report;
pub mod retry;
pub mod traits;
pub mod util;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use cache::{CacheConfig, CacheStats, TtlCache};
pub use config::{CrawlerConfig, ProxyConfig, PublicConfig};
pub use error::AppError;
pub use job::{CrawlJob, CrawlRequest, CrawlType, JobStatus};
pub use models::{CandidateSong, Page, ParsedPage, SongId, compute_hash};
pub use orchestrator::Crawler;
pub use report::{
    ConnectionReport, CrawlEvent, CrawlReporter, CrawlStats, DuplicateStats, ProgressSnapshot,
    TracingCrawlReporter,
};
pub use traits::{CrawlControl, Fetcher, MemoryCatalog, SongParser, SongStore};
