use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;

use riskwatch::ai::{AiJudge, JudgeRequest, Judgment};
use riskwatch::crawl::{CrawlDriver, Ingestor, Page, PagedSource, RawRecord};
use riskwatch::db::Repository;
use riskwatch::models::{CheckpointStatus, CrawlTask, ReviewStatus, RiskLevel};
use riskwatch::{App, AppError, Config};

/// In-memory paginated source over `total` numbered records.
struct FakeSource {
    total: u64,
    report_total: bool,
    fail_at_skip: Option<u64>,
    failed_once: AtomicBool,
    calls: Mutex<Vec<(u64, u64)>>,
}

impl FakeSource {
    fn new(total: u64) -> Self {
        Self {
            total,
            report_total: false,
            fail_at_skip: None,
            failed_once: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PagedSource for FakeSource {
    async fn fetch_page(&self, _task: &CrawlTask, skip: u64, limit: u64) -> riskwatch::Result<Page> {
        self.calls.lock().unwrap().push((skip, limit));

        if self.fail_at_skip == Some(skip) && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(AppError::InvalidInput("HTTP 503 from source".into()));
        }

        let end = (skip + limit).min(self.total);
        let records = (skip..end)
            .map(|i| RawRecord {
                natural_key: format!("event-{i}"),
                source_name: "maude".into(),
                title: Some(format!("Adverse event {i}")),
                ..Default::default()
            })
            .collect();

        Ok(Page {
            records,
            total_available: self.report_total.then_some(self.total),
        })
    }
}

fn driver(repo: &Repository) -> CrawlDriver {
    CrawlDriver::new(repo.clone(), Ingestor::new(repo.clone())).with_page_delay(Duration::ZERO)
}

#[tokio::test]
async fn empty_page_completes_crawl_without_target() {
    let repo = Repository::open_in_memory().await.unwrap();
    let source = FakeSource::new(25);
    let task = CrawlTask::new("device_event", 10);

    let report = driver(&repo).run(&source, &task).await.unwrap();
    assert_eq!(report.status, CheckpointStatus::Completed);
    assert_eq!(report.fetched, 25);
    assert_eq!(report.ingest.inserted, 25);
    assert_eq!(source.calls(), vec![(0, 10), (10, 10), (20, 10), (25, 10)]);

    let checkpoint = repo.find_checkpoint(&task.key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Completed);
    assert_eq!(checkpoint.current_skip, 25);
    assert_eq!(checkpoint.total_fetched, 25);
}

#[tokio::test]
async fn completed_checkpoint_is_not_crawled_again() {
    let repo = Repository::open_in_memory().await.unwrap();
    let task = CrawlTask::new("device_event", 10);
    driver(&repo).run(&FakeSource::new(5), &task).await.unwrap();

    let source = FakeSource::new(5);
    let report = driver(&repo).run(&source, &task).await.unwrap();
    assert!(report.skipped);
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn target_total_bounds_the_last_page() {
    let repo = Repository::open_in_memory().await.unwrap();
    let source = FakeSource::new(100);
    let task = CrawlTask::new("device_510k", 10).target_total(12);

    let report = driver(&repo).run(&source, &task).await.unwrap();
    assert_eq!(report.status, CheckpointStatus::Completed);
    assert_eq!(report.fetched, 12);
    assert_eq!(source.calls(), vec![(0, 10), (10, 2)]);
}

#[tokio::test]
async fn reported_total_completes_without_extra_fetch() {
    let repo = Repository::open_in_memory().await.unwrap();
    let mut source = FakeSource::new(20);
    source.report_total = true;
    let task = CrawlTask::new("recall", 10);

    let report = driver(&repo).run(&source, &task).await.unwrap();
    assert_eq!(report.status, CheckpointStatus::Completed);
    assert_eq!(source.calls(), vec![(0, 10), (10, 10)]);
}

#[tokio::test]
async fn failure_freezes_checkpoint_until_explicit_resume() {
    let repo = Repository::open_in_memory().await.unwrap();
    let mut source = FakeSource::new(25);
    source.fail_at_skip = Some(10);
    let task = CrawlTask::new("device_event", 10).search_term("infusion pump");

    let err = driver(&repo).run(&source, &task).await.unwrap_err();
    assert!(err.to_string().contains("HTTP 503"));

    let mut checkpoint = repo.find_checkpoint(&task.key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Failed);
    assert_eq!(checkpoint.current_skip, 10);
    assert!(checkpoint.error_message.as_deref().unwrap().contains("HTTP 503"));

    // A plain rerun does not retry a failed crawl.
    let report = driver(&repo).run(&source, &task).await.unwrap();
    assert!(report.skipped);

    checkpoint.resume().unwrap();
    repo.save_checkpoint(&checkpoint).await.unwrap();

    let report = driver(&repo).run(&source, &task).await.unwrap();
    assert_eq!(report.resumed_from_skip, 10);
    assert_eq!(report.status, CheckpointStatus::Completed);
    assert_eq!(report.fetched, 15);
    assert_eq!(report.ingest.inserted, 15);
    assert_eq!(report.ingest.duplicates, 0);
    assert_eq!(repo.records_by_source("maude").await.unwrap().len(), 25);
}

#[tokio::test]
async fn identical_tasks_share_one_checkpoint() {
    let repo = Repository::open_in_memory().await.unwrap();
    let task = || {
        CrawlTask::new("guidance", 50)
            .search_term("cybersecurity")
            .date_range("20250101", "20251231")
    };

    let a = repo.find_or_create_checkpoint(&task()).await.unwrap();
    let b = repo.find_or_create_checkpoint(&task()).await.unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(repo.checkpoints_by_crawler("guidance").await.unwrap().len(), 1);
}

struct UnrelatedJudge;

#[async_trait]
impl AiJudge for UnrelatedJudge {
    async fn judge(&self, _request: &JudgeRequest) -> riskwatch::Result<Judgment> {
        Ok(Judgment {
            related_to_certification: false,
            confidence: 0.6,
            reason: "adverse event report".into(),
            extracted_keywords: vec![],
        })
    }
}

fn app_config(dir: &TempDir, page_delay_ms: u64) -> Config {
    Config {
        keyword_file: dir.path().join("keywords.txt"),
        ai_call_delay_ms: 0,
        crawl_page_delay_ms: page_delay_ms,
        refresh_stats_after_pass: false,
        ..Config::default()
    }
}

#[tokio::test]
async fn app_crawl_waits_configured_delay_between_pages() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open_in_memory().await.unwrap();
    let app = App::with_repository(repo, &app_config(&dir, 40), None).unwrap();
    let source = FakeSource::new(25);

    let started = Instant::now();
    let report = app
        .run_crawl(&source, &CrawlTask::new("device_event", 10))
        .await
        .unwrap();
    assert_eq!(report.status, CheckpointStatus::Completed);
    assert_eq!(report.pages, 4);
    // Three pauses: after each of the three non-empty pages.
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn app_crawl_queues_new_records_for_review_when_enabled() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open_in_memory().await.unwrap();
    let mut config = app_config(&dir, 0);
    config.auto_judge_new_records = true;
    let app = App::with_repository(repo.clone(), &config, Some(Arc::new(UnrelatedJudge))).unwrap();

    let report = app
        .run_crawl(&FakeSource::new(5), &CrawlTask::new("device_event", 10))
        .await
        .unwrap();
    assert_eq!(report.ingest.inserted, 5);
    assert_eq!(report.ingest.queued_for_review, 5);

    let queued = app.pending_judgments(ReviewStatus::Pending, None).await.unwrap();
    assert_eq!(queued.len(), 5);
    assert!(repo
        .records_by_source("maude")
        .await
        .unwrap()
        .iter()
        .all(|r| r.risk_level == RiskLevel::Medium));

    let outcome = app.confirm_judgments(&[queued[0].id], Some("reviewer")).await;
    assert_eq!(outcome.confirmed, 1);
    let record = repo.get_record(queued[0].record_id).await.unwrap().unwrap();
    assert_eq!(record.risk_level, RiskLevel::Low);
}
