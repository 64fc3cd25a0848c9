use serde::Serialize;

use super::RawRecord;
use crate::classify::AutoJudge;
use crate::db::Repository;
use crate::models::{DeviceFields, DeviceRecord, RiskLevel};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: usize,
    /// New records whose AI judgment is waiting for review.
    pub queued_for_review: usize,
}

impl IngestOutcome {
    /// Every received record was already stored.
    pub fn all_duplicates(&self) -> bool {
        self.received > 0 && self.duplicates == self.received
    }

    pub fn add(&mut self, other: &IngestOutcome) {
        self.received += other.received;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
        self.queued_for_review += other.queued_for_review;
    }
}

/// Stores crawled records, skipping any whose natural key already exists.
#[derive(Clone)]
pub struct Ingestor {
    repo: Repository,
    default_risk_level: RiskLevel,
    auto_judge: Option<AutoJudge>,
}

impl Ingestor {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            default_risk_level: RiskLevel::Medium,
            auto_judge: None,
        }
    }

    pub fn with_default_risk_level(mut self, level: RiskLevel) -> Self {
        self.default_risk_level = level;
        self
    }

    /// Sends every newly inserted record to the AI judge and queues the
    /// result for review.
    pub fn with_auto_judge(mut self, auto_judge: AutoJudge) -> Self {
        self.auto_judge = Some(auto_judge);
        self
    }

    pub async fn ingest(&self, records: Vec<RawRecord>) -> IngestOutcome {
        let mut outcome = IngestOutcome {
            received: records.len(),
            ..Default::default()
        };
        let mut inserted_ids = Vec::new();

        for raw in records {
            let record = raw.into_new_record(self.default_risk_level);
            if record.natural_key.is_empty() {
                tracing::warn!("Skipping record from {} without a natural key", record.source_name);
                outcome.errors += 1;
                continue;
            }

            match self.repo.record_exists(&record.source_name, &record.natural_key).await {
                Ok(true) => {
                    tracing::debug!("Duplicate {}/{}", record.source_name, record.natural_key);
                    outcome.duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Existence check failed for {}: {}", record.natural_key, e);
                    outcome.errors += 1;
                    continue;
                }
            }

            let key = record.natural_key.clone();
            match self.repo.insert_record(record).await {
                Ok(Some(id)) => {
                    outcome.inserted += 1;
                    inserted_ids.push(id);
                }
                // Lost a race with another writer; the unique key kept it out.
                Ok(None) => outcome.duplicates += 1,
                Err(e) => {
                    tracing::warn!("Failed to insert record {}: {}", key, e);
                    outcome.errors += 1;
                }
            }
        }

        if outcome.all_duplicates() {
            tracing::info!("All {} received records were duplicates", outcome.received);
        }
        if let Some(auto_judge) = &self.auto_judge {
            if !inserted_ids.is_empty() {
                outcome.queued_for_review = auto_judge.judge_new_records(&inserted_ids).await.queued;
            }
        }
        outcome
    }

    pub async fn ingest_devices(&self, records: Vec<DeviceRecord>) -> IngestOutcome {
        let mut outcome = IngestOutcome {
            received: records.len(),
            ..Default::default()
        };

        for record in records {
            let kind = record.detail.kind();
            let key = record.meta.natural_key.trim().to_string();
            if key.is_empty() {
                outcome.errors += 1;
                continue;
            }

            match self.repo.device_record_exists(kind, &key).await {
                Ok(true) => {
                    outcome.duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Existence check failed for {} {}: {}", kind, key, e);
                    outcome.errors += 1;
                    continue;
                }
            }

            match self.repo.insert_device_record(&record).await {
                Ok(Some(_)) => outcome.inserted += 1,
                Ok(None) => outcome.duplicates += 1,
                Err(e) => {
                    tracing::warn!("Failed to insert {} {}: {}", kind, key, e);
                    outcome.errors += 1;
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceDetail, DeviceMeta, GuidanceDocument};

    fn raw(key: &str) -> RawRecord {
        RawRecord {
            natural_key: key.into(),
            source_name: "kc".into(),
            title: Some(format!("notice {key}")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_ingest_of_same_batch_is_all_duplicates() {
        let repo = Repository::open_in_memory().await.unwrap();
        let ingestor = Ingestor::new(repo.clone());

        let first = ingestor.ingest(vec![raw("1"), raw("2"), raw("2"), raw(" ")]).await;
        assert_eq!(first.inserted, 2);
        assert_eq!(first.duplicates, 1);
        assert_eq!(first.errors, 1);
        assert!(!first.all_duplicates());

        let second = ingestor.ingest(vec![raw("1"), raw("2")]).await;
        assert!(second.all_duplicates());

        let stored = repo.records_by_source("kc").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.risk_level == RiskLevel::Medium));
    }

    #[tokio::test]
    async fn device_records_dedup_per_kind() {
        let repo = Repository::open_in_memory().await.unwrap();
        let ingestor = Ingestor::new(repo);
        let record = DeviceRecord {
            meta: DeviceMeta {
                natural_key: "FDA-G-1".into(),
                risk_level: RiskLevel::Medium,
                ..Default::default()
            },
            detail: DeviceDetail::Guidance(GuidanceDocument {
                title: Some("Cybersecurity in medical devices".into()),
                ..Default::default()
            }),
        };

        let outcome = ingestor.ingest_devices(vec![record.clone(), record]).await;
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
    }
}
