use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::ai::{AiJudge, ClaudeJudge};
use crate::classify::{
    AiPassFilter, AiPassOutcome, AiTriage, AutoJudge, BatchConfirmOutcome, DeviceRiskService,
    JudgmentReview, KeywordPassOutcome, KeywordStat, RiskClassifier, SourcePassOutcome,
};
use crate::config::{Config, FeedSourceConfig};
use crate::crawl::{
    crawl_all, CrawlDriver, CrawlReport, FeedSource, IngestOutcome, Ingestor, PagedSource,
    SourceCrawler,
};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::keywords::KeywordFile;
use crate::models::{CrawlTask, PendingJudgment, ReviewStatus};
use crate::stats::{AggregationOutcome, CountryRiskAggregator, DayOverDay};

/// Result of crawling one configured feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCrawlResult {
    pub source_name: String,
    pub ingest: Option<IngestOutcome>,
    pub error: Option<String>,
}

pub struct App {
    // Services
    pub repository: Repository,
    classifier: RiskClassifier,
    aggregator: CountryRiskAggregator,
    devices: DeviceRiskService,
    review: JudgmentReview,
    ingestor: Ingestor,
    judge: Option<Arc<dyn AiJudge>>,

    // Settings
    keyword_file: KeywordFile,
    ai_call_delay: Duration,
    ai_default_limit: usize,
    refresh_stats_after_pass: bool,
    crawl_page_delay: Duration,
    feeds: Vec<FeedSourceConfig>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        let judge = match &config.claude_api_key {
            Some(key) if !key.trim().is_empty() => {
                let judge = ClaudeJudge::new(key.clone())?
                    .with_endpoint(config.ai_api_url.clone(), config.ai_model.clone());
                Some(Arc::new(judge) as Arc<dyn AiJudge>)
            }
            _ => None,
        };

        Self::with_repository(repository, config, judge)
    }

    /// Wires services over an already opened repository.
    pub fn with_repository(
        repository: Repository,
        config: &Config,
        judge: Option<Arc<dyn AiJudge>>,
    ) -> Result<Self> {
        let keyword_file = config.keyword_file();
        let classifier = RiskClassifier::new(repository.clone(), Some(keyword_file.clone()))?
            .with_chunk_size(config.chunk_size);
        let ai_call_delay = Duration::from_millis(config.ai_call_delay_ms);

        let mut ingestor = Ingestor::new(repository.clone());
        if config.auto_judge_new_records {
            match &judge {
                Some(judge) => {
                    ingestor = ingestor.with_auto_judge(
                        AutoJudge::new(repository.clone(), judge.clone())
                            .with_call_delay(ai_call_delay)
                            .with_ttl_days(config.pending_ttl_days),
                    );
                }
                None => tracing::warn!("auto_judge_new_records is set but no AI judge is configured"),
            }
        }

        Ok(Self {
            classifier,
            aggregator: CountryRiskAggregator::new(repository.clone()),
            devices: DeviceRiskService::new(repository.clone()),
            review: JudgmentReview::new(repository.clone()),
            ingestor,
            repository,
            judge,
            keyword_file,
            ai_call_delay,
            ai_default_limit: config.ai_default_limit,
            refresh_stats_after_pass: config.refresh_stats_after_pass,
            crawl_page_delay: Duration::from_millis(config.crawl_page_delay_ms),
            feeds: config.feeds.clone(),
        })
    }

    pub fn devices(&self) -> &DeviceRiskService {
        &self.devices
    }

    pub fn aggregator(&self) -> &CountryRiskAggregator {
        &self.aggregator
    }

    pub async fn run_keyword_pass(&self, explicit: Option<Vec<String>>) -> Result<KeywordPassOutcome> {
        let outcome = self.classifier.run_keyword_pass(explicit).await?;
        if outcome.upgraded > 0 {
            self.refresh_today_stats().await;
        }
        Ok(outcome)
    }

    pub async fn run_source_pass(&self, source_name: &str) -> Result<SourcePassOutcome> {
        let outcome = self.classifier.run_source_pass(source_name).await?;
        if outcome.updated > 0 {
            self.refresh_today_stats().await;
        }
        Ok(outcome)
    }

    pub async fn run_ai_pass(&self, filter: AiPassFilter) -> Result<AiPassOutcome> {
        let judge = self
            .judge
            .clone()
            .ok_or_else(|| AppError::Config("claude_api_key is not set".to_string()))?;

        let triage = AiTriage::new(self.repository.clone(), judge)
            .with_keyword_file(self.keyword_file.clone())
            .with_call_delay(self.ai_call_delay)
            .with_default_limit(self.ai_default_limit);

        let outcome = triage.run(filter).await?;
        if outcome.marked_high + outcome.marked_low > 0 {
            self.refresh_today_stats().await;
        }
        Ok(outcome)
    }

    pub async fn aggregate(&self, stat_date: Option<NaiveDate>) -> Result<AggregationOutcome> {
        self.aggregator
            .recompute(stat_date.unwrap_or_else(today))
            .await
    }

    pub async fn backfill(&self, days: u64) -> Vec<AggregationOutcome> {
        self.aggregator.backfill(today(), days).await
    }

    pub async fn trend(&self, stat_date: Option<NaiveDate>) -> Result<DayOverDay> {
        self.aggregator
            .day_over_day(stat_date.unwrap_or_else(today))
            .await
    }

    pub async fn keyword_stats(&self, country: Option<&str>) -> Result<Vec<KeywordStat>> {
        self.devices.keyword_statistics(country).await
    }

    /// Crawls every configured feed and ingests what came back.
    pub async fn crawl_feeds(&self) -> Result<Vec<FeedCrawlResult>> {
        let mut crawlers: Vec<Box<dyn SourceCrawler>> = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            crawlers.push(Box::new(FeedSource::new(feed.clone())?));
        }

        let mut results = Vec::with_capacity(crawlers.len());
        for (source_name, fetched) in crawl_all(&crawlers).await {
            let result = match fetched {
                Ok(records) => FeedCrawlResult {
                    source_name,
                    ingest: Some(self.ingestor.ingest(records).await),
                    error: None,
                },
                Err(e) => FeedCrawlResult {
                    source_name,
                    ingest: None,
                    error: Some(e.to_string()),
                },
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Checkpointed crawl driver sharing this app's ingestor and page delay.
    pub fn crawl_driver(&self) -> CrawlDriver {
        CrawlDriver::new(self.repository.clone(), self.ingestor.clone())
            .with_page_delay(self.crawl_page_delay)
    }

    pub async fn run_crawl(&self, source: &dyn PagedSource, task: &CrawlTask) -> Result<CrawlReport> {
        let report = self.crawl_driver().run(source, task).await?;
        if report.ingest.inserted > 0 {
            self.refresh_today_stats().await;
        }
        Ok(report)
    }

    pub async fn pending_judgments(
        &self,
        status: ReviewStatus,
        limit: Option<usize>,
    ) -> Result<Vec<PendingJudgment>> {
        self.review.list(status, limit).await
    }

    pub async fn confirm_judgments(&self, ids: &[i64], confirmed_by: Option<&str>) -> BatchConfirmOutcome {
        let outcome = self.review.batch_confirm(ids, confirmed_by).await;
        if outcome.confirmed > 0 {
            self.refresh_today_stats().await;
        }
        outcome
    }

    pub async fn reject_judgment(&self, id: i64, rejected_by: Option<&str>) -> Result<PendingJudgment> {
        self.review.reject(id, rejected_by).await
    }

    pub async fn expire_judgments(&self) -> Result<usize> {
        self.review.expire_stale().await
    }

    async fn refresh_today_stats(&self) {
        if !self.refresh_stats_after_pass {
            return;
        }
        if let Err(e) = self.aggregator.recompute(today()).await {
            tracing::warn!("Failed to refresh today's country stats: {}", e);
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
