use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::apply_judgment;
use crate::ai::{AiJudge, JudgeRequest, Judgment};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewPendingJudgment, PendingJudgment, Record, ReviewStatus, PENDING_TTL_DAYS};

/// Records judged between two saves of the review queue.
pub const AUTO_JUDGE_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoJudgeOutcome {
    pub total: usize,
    pub queued: usize,
    pub related: usize,
    pub unrelated: usize,
    pub failed: usize,
}

/// Judges freshly ingested records and queues the results for review.
/// Risk levels are left alone until a reviewer confirms.
#[derive(Clone)]
pub struct AutoJudge {
    repo: Repository,
    judge: Arc<dyn AiJudge>,
    call_delay: Duration,
    batch_size: usize,
    ttl: chrono::Duration,
}

impl AutoJudge {
    pub fn new(repo: Repository, judge: Arc<dyn AiJudge>) -> Self {
        Self {
            repo,
            judge,
            call_delay: Duration::from_millis(500),
            batch_size: AUTO_JUDGE_BATCH_SIZE,
            ttl: chrono::Duration::days(PENDING_TTL_DAYS),
        }
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl = chrono::Duration::days(days.max(1));
        self
    }

    pub async fn judge_new_records(&self, record_ids: &[i64]) -> AutoJudgeOutcome {
        let mut outcome = AutoJudgeOutcome {
            total: record_ids.len(),
            ..Default::default()
        };
        let mut buffer = Vec::with_capacity(self.batch_size.min(record_ids.len()));

        for (index, &id) in record_ids.iter().enumerate() {
            if index > 0 && !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }

            let record = match self.repo.get_record(id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!("Auto judge: record {} disappeared", id);
                    outcome.failed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Auto judge: failed to load record {}: {}", id, e);
                    outcome.failed += 1;
                    continue;
                }
            };

            let judgment = match self.judge.judge(&JudgeRequest::from(&record)).await {
                Ok(judgment) => judgment,
                Err(e) => {
                    tracing::warn!("Auto judge failed for record {}, level unchanged: {}", id, e);
                    outcome.failed += 1;
                    continue;
                }
            };

            if judgment.related_to_certification {
                outcome.related += 1;
            } else {
                outcome.unrelated += 1;
            }
            buffer.push(self.pending_item(&record, judgment));

            if buffer.len() >= self.batch_size {
                self.flush(&mut buffer, &mut outcome).await;
            }
        }
        self.flush(&mut buffer, &mut outcome).await;

        tracing::info!(
            "Auto judge: {} records, {} queued for review, {} related, {} unrelated, {} failed",
            outcome.total,
            outcome.queued,
            outcome.related,
            outcome.unrelated,
            outcome.failed
        );
        outcome
    }

    fn pending_item(&self, record: &Record, judgment: Judgment) -> NewPendingJudgment {
        let suggestion = apply_judgment(record, &judgment);
        let now = Utc::now();
        NewPendingJudgment {
            record_id: record.id,
            judgment,
            suggested_risk_level: suggestion.risk_level,
            suggested_remark: suggestion.remarks,
            created_at: now,
            expires_at: now + self.ttl,
        }
    }

    async fn flush(&self, buffer: &mut Vec<NewPendingJudgment>, outcome: &mut AutoJudgeOutcome) {
        if buffer.is_empty() {
            return;
        }
        let batch: Vec<_> = buffer.drain(..).collect();
        let size = batch.len();
        match self.repo.queue_pending_judgments(batch).await {
            Ok(queued) => outcome.queued += queued,
            Err(e) => {
                tracing::warn!("Failed to save {} pending judgments: {}", size, e);
                outcome.failed += size;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfirmOutcome {
    pub total: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Human review of queued AI judgments.
#[derive(Clone)]
pub struct JudgmentReview {
    repo: Repository,
}

impl JudgmentReview {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn list(&self, status: ReviewStatus, limit: Option<usize>) -> Result<Vec<PendingJudgment>> {
        self.repo.pending_judgments(status, limit).await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.repo.count_pending_judgments(ReviewStatus::Pending).await
    }

    /// Applies the judgment to its record and marks it CONFIRMED. The
    /// record's current remarks are merged, not the ones seen at queue time.
    pub async fn confirm(&self, id: i64, confirmed_by: Option<&str>) -> Result<PendingJudgment> {
        let mut item = self.load(id).await?;
        let now = Utc::now();
        if item.status == ReviewStatus::Pending && item.is_expired(now) {
            item.expire(now)?;
            self.repo.decide_pending_judgment(&item, None).await?;
            return Err(AppError::InvalidInput(format!("pending judgment {id} has expired")));
        }

        item.confirm(confirmed_by, now)?;
        let record = self
            .repo
            .get_record(item.record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("record {}", item.record_id)))?;
        let update = apply_judgment(&record, &item.judgment);

        if !self.repo.decide_pending_judgment(&item, Some(update)).await? {
            return Err(self.already_decided(id).await);
        }
        tracing::info!(
            "Confirmed judgment {} for record {}: {}",
            id,
            item.record_id,
            item.suggested_risk_level
        );
        Ok(item)
    }

    /// Confirms each id on its own; one failure does not stop the rest.
    pub async fn batch_confirm(&self, ids: &[i64], confirmed_by: Option<&str>) -> BatchConfirmOutcome {
        let mut outcome = BatchConfirmOutcome {
            total: ids.len(),
            ..Default::default()
        };
        for &id in ids {
            match self.confirm(id, confirmed_by).await {
                Ok(_) => outcome.confirmed += 1,
                Err(e) => {
                    tracing::warn!("Failed to confirm judgment {}: {}", id, e);
                    outcome.failed += 1;
                    outcome.errors.push(format!("{id}: {e}"));
                }
            }
        }
        tracing::info!(
            "Batch confirm: {} total, {} confirmed, {} failed",
            outcome.total,
            outcome.confirmed,
            outcome.failed
        );
        outcome
    }

    /// Marks the judgment REJECTED. The record is not touched.
    pub async fn reject(&self, id: i64, rejected_by: Option<&str>) -> Result<PendingJudgment> {
        let mut item = self.load(id).await?;
        item.reject(rejected_by, Utc::now())?;
        if !self.repo.decide_pending_judgment(&item, None).await? {
            return Err(self.already_decided(id).await);
        }
        tracing::info!("Rejected judgment {} for record {}", id, item.record_id);
        Ok(item)
    }

    pub async fn expire_stale(&self) -> Result<usize> {
        let expired = self.repo.expire_pending_judgments(Utc::now()).await?;
        tracing::info!("Expired {} pending judgments", expired);
        Ok(expired)
    }

    async fn load(&self, id: i64) -> Result<PendingJudgment> {
        self.repo
            .get_pending_judgment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pending judgment {id}")))
    }

    async fn already_decided(&self, id: i64) -> AppError {
        let from = match self.repo.get_pending_judgment(id).await {
            Ok(Some(item)) => item.status.to_string(),
            _ => "unknown".to_string(),
        };
        AppError::InvalidTransition {
            from,
            to: "decided".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::ai::AUDIT_PREFIX;
    use crate::crawl::{Ingestor, RawRecord};
    use crate::models::RiskLevel;

    /// Relates titles mentioning FCC and fails on "timeout".
    struct TitleJudge;

    #[async_trait]
    impl AiJudge for TitleJudge {
        async fn judge(&self, request: &JudgeRequest) -> Result<Judgment> {
            if request.title.contains("timeout") {
                return Err(AppError::AiJudge("upstream timeout".into()));
            }
            Ok(Judgment {
                related_to_certification: request.title.contains("FCC"),
                confidence: 0.8,
                reason: "title check".into(),
                extracted_keywords: vec![],
            })
        }
    }

    fn raw(key: &str, title: &str) -> RawRecord {
        RawRecord {
            natural_key: key.into(),
            source_name: "fcc-news".into(),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    async fn ingest_with_auto_judge() -> Repository {
        let repo = Repository::open_in_memory().await.unwrap();
        let auto = AutoJudge::new(repo.clone(), Arc::new(TitleJudge))
            .with_call_delay(Duration::ZERO)
            .with_batch_size(2);
        let outcome = Ingestor::new(repo.clone())
            .with_auto_judge(auto)
            .ingest(vec![
                raw("a", "FCC grants equipment IDs"),
                raw("b", "Bank reports profits"),
                raw("c", "timeout while judging"),
            ])
            .await;
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.queued_for_review, 2);
        repo
    }

    async fn record_id(repo: &Repository, key: &str) -> i64 {
        repo.records_by_source("fcc-news")
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.natural_key == key)
            .unwrap()
            .id
    }

    async fn item_for(repo: &Repository, key: &str) -> PendingJudgment {
        let id = record_id(repo, key).await;
        repo.pending_judgments(ReviewStatus::Pending, None)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.record_id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn auto_judge_queues_without_changing_levels() {
        let repo = ingest_with_auto_judge().await;
        let review = JudgmentReview::new(repo.clone());
        assert_eq!(review.pending_count().await.unwrap(), 2);

        for record in repo.records_by_source("fcc-news").await.unwrap() {
            assert_eq!(record.risk_level, RiskLevel::Medium);
            assert_eq!(record.remarks, None);
        }

        let related = item_for(&repo, "a").await;
        assert_eq!(related.suggested_risk_level, RiskLevel::High);
        let unrelated = item_for(&repo, "b").await;
        assert_eq!(unrelated.suggested_risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn confirm_applies_and_reject_leaves_record_alone() {
        let repo = ingest_with_auto_judge().await;
        let review = JudgmentReview::new(repo.clone());
        let related = item_for(&repo, "a").await;
        let unrelated = item_for(&repo, "b").await;

        let confirmed = review.confirm(related.id, Some("alice")).await.unwrap();
        assert_eq!(confirmed.status, ReviewStatus::Confirmed);
        assert_eq!(confirmed.decided_by.as_deref(), Some("alice"));

        let record = repo.get_record(related.record_id).await.unwrap().unwrap();
        assert_eq!(record.risk_level, RiskLevel::High);
        assert_eq!(record.related, Some(true));
        assert!(record.remarks.unwrap().starts_with(AUDIT_PREFIX));

        assert!(matches!(
            review.confirm(related.id, None).await,
            Err(AppError::InvalidTransition { .. })
        ));

        let rejected = review.reject(unrelated.id, None).await.unwrap();
        assert_eq!(rejected.decided_by.as_deref(), Some("SYSTEM"));
        let record = repo.get_record(unrelated.record_id).await.unwrap().unwrap();
        assert_eq!(record.risk_level, RiskLevel::Medium);
        assert_eq!(review.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_confirm_reports_each_failure() {
        let repo = ingest_with_auto_judge().await;
        let review = JudgmentReview::new(repo.clone());
        let related = item_for(&repo, "a").await;

        let outcome = review.batch_confirm(&[related.id, 9999], Some("bob")).await;
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.confirmed, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.errors[0].starts_with("9999:"));
    }

    #[tokio::test]
    async fn expired_judgment_cannot_be_confirmed() {
        let repo = Repository::open_in_memory().await.unwrap();
        Ingestor::new(repo.clone()).ingest(vec![raw("a", "FCC rule")]).await;
        let id = record_id(&repo, "a").await;
        let created = Utc::now() - chrono::Duration::days(40);
        repo.queue_pending_judgments(vec![NewPendingJudgment {
            record_id: id,
            judgment: Judgment {
                related_to_certification: true,
                confidence: 0.9,
                reason: "old".into(),
                extracted_keywords: vec![],
            },
            suggested_risk_level: RiskLevel::High,
            suggested_remark: None,
            created_at: created,
            expires_at: created + chrono::Duration::days(PENDING_TTL_DAYS),
        }])
        .await
        .unwrap();

        let review = JudgmentReview::new(repo.clone());
        let item = item_for(&repo, "a").await;
        assert!(review.confirm(item.id, None).await.is_err());

        let reloaded = repo.get_pending_judgment(item.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ReviewStatus::Expired);
        let record = repo.get_record(id).await.unwrap().unwrap();
        assert_eq!(record.risk_level, RiskLevel::Medium);
        assert_eq!(review.expire_stale().await.unwrap(), 0);
    }
}
