mod driver;
mod feed;
mod ingest;

pub use driver::{CrawlDriver, CrawlReport, Page, PagedSource};
pub use feed::{crawl_all, FeedSource};
pub use ingest::{IngestOutcome, Ingestor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{NewRecord, RiskLevel};

/// A record as produced by a source crawler, before ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub natural_key: String,
    pub source_name: String,
    pub country: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub product: Option<String>,
    pub record_type: Option<String>,
    pub publish_date: Option<String>,
    /// Crawler-assigned level; ingestion applies its default when unset.
    pub risk_level: Option<RiskLevel>,
}

impl RawRecord {
    pub fn into_new_record(self, default_risk_level: RiskLevel) -> NewRecord {
        NewRecord {
            natural_key: self.natural_key.trim().to_string(),
            source_name: self.source_name,
            country: self.country,
            title: self.title,
            content: self.content,
            summary: self.summary,
            product: self.product,
            record_type: self.record_type,
            publish_date: self.publish_date,
            risk_level: self.risk_level.unwrap_or(default_risk_level),
        }
    }
}

/// One country/source scraper yielding raw records.
#[async_trait]
pub trait SourceCrawler: Send + Sync {
    fn source_name(&self) -> &str;

    async fn crawl(&self) -> Result<Vec<RawRecord>>;
}
