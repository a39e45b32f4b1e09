pub mod crawl;
pub mod enrichment;
pub mod fetcher;
pub mod frontier;
pub mod quota;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crawl::{parse_seeds, CrawlLoop, CrawlStats, StopReason};
pub use enrichment::{EnrichmentPipeline, Expansion};
pub use fetcher::{Connections, ProfileFetcher};
pub use frontier::FrontierSelector;
pub use quota::QuotaGuard;
pub use traits::{RecordStore, SocialApi};
