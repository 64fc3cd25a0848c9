use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{IngestOutcome, Ingestor, RawRecord};
use crate::db::Repository;
use crate::error::Result;
use crate::models::{CheckpointStatus, CrawlCheckpoint, CrawlTask};

/// One page from a paginated source.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Total result count reported by the source, when it reports one.
    pub total_available: Option<u64>,
}

/// A source that can be read `limit` records at a time from offset `skip`.
#[async_trait]
pub trait PagedSource: Send + Sync {
    async fn fetch_page(&self, task: &CrawlTask, skip: u64, limit: u64) -> Result<Page>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub checkpoint_key: String,
    pub status: CheckpointStatus,
    pub resumed_from_skip: u64,
    pub pages: usize,
    pub fetched: u64,
    pub ingest: IngestOutcome,
    /// The checkpoint could not continue, so nothing was fetched.
    pub skipped: bool,
}

/// Runs a paginated crawl against its persisted checkpoint so an
/// interrupted crawl resumes at the stored cursor.
pub struct CrawlDriver {
    repo: Repository,
    ingestor: Ingestor,
    page_delay: Duration,
}

impl CrawlDriver {
    pub fn new(repo: Repository, ingestor: Ingestor) -> Self {
        Self {
            repo,
            ingestor,
            page_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// The checkpoint completes on the first empty page, or once the
    /// source-reported total or the task target is reached. A fetch error
    /// marks it FAILED and is returned; it is not retried.
    pub async fn run(&self, source: &dyn PagedSource, task: &CrawlTask) -> Result<CrawlReport> {
        let mut checkpoint = self.repo.find_or_create_checkpoint(task).await?;
        let mut report = CrawlReport {
            checkpoint_key: checkpoint.key.clone(),
            status: checkpoint.status,
            resumed_from_skip: checkpoint.current_skip,
            pages: 0,
            fetched: 0,
            ingest: IngestOutcome::default(),
            skipped: false,
        };

        if !checkpoint.can_continue() {
            tracing::info!(
                "Checkpoint {} is {} and cannot continue",
                checkpoint.key,
                checkpoint.status
            );
            report.skipped = true;
            return Ok(report);
        }

        if checkpoint.current_skip > 0 {
            tracing::info!(
                "Resuming {} at skip {} ({} fetched so far)",
                checkpoint.key,
                checkpoint.current_skip,
                checkpoint.total_fetched
            );
        }

        loop {
            let limit = next_limit(&checkpoint);
            let page = match source.fetch_page(task, checkpoint.current_skip, limit).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!("Crawl {} failed at skip {}: {}", checkpoint.key, checkpoint.current_skip, e);
                    checkpoint.mark_failed(e.to_string())?;
                    if let Err(save_err) = self.repo.save_checkpoint(&checkpoint).await {
                        tracing::warn!("Failed to persist failed checkpoint {}: {}", checkpoint.key, save_err);
                    }
                    return Err(e);
                }
            };
            report.pages += 1;

            if page.records.is_empty() {
                tracing::info!("Crawl {} reached an empty page", checkpoint.key);
                checkpoint.mark_completed()?;
                self.repo.save_checkpoint(&checkpoint).await?;
                break;
            }

            let received = page.records.len() as u64;
            let ingest = self.ingestor.ingest(page.records).await;
            report.ingest.add(&ingest);
            report.fetched += received;

            checkpoint.update_progress(
                checkpoint.current_skip + received,
                checkpoint.total_fetched + received,
            )?;
            if page
                .total_available
                .is_some_and(|available| checkpoint.current_skip >= available)
            {
                checkpoint.mark_completed()?;
            }
            self.repo.save_checkpoint(&checkpoint).await?;

            tracing::debug!(
                "Crawl {}: page {} stored {} new, {} duplicates",
                checkpoint.key,
                report.pages,
                ingest.inserted,
                ingest.duplicates
            );

            if !checkpoint.can_continue() {
                break;
            }
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        report.status = checkpoint.status;
        tracing::info!(
            "Crawl {} finished with {}: {} fetched, {} inserted",
            checkpoint.key,
            checkpoint.status,
            report.fetched,
            report.ingest.inserted
        );
        Ok(report)
    }
}

fn next_limit(checkpoint: &CrawlCheckpoint) -> u64 {
    let batch = checkpoint.batch_size.max(1);
    match checkpoint.target_total {
        Some(target) => batch.min(target.saturating_sub(checkpoint.total_fetched)).max(1),
        None => batch,
    }
}
