use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::keywords::parse_keyword_list;
use crate::models::{DeviceKind, DisplayRecord, KeywordKind, RiskLevel, RiskRated};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordStat {
    pub id: i64,
    pub keyword: String,
    pub kind: KeywordKind,
    pub enabled: bool,
    pub count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateOutcome {
    pub success: bool,
    pub message: String,
    pub requested: usize,
    pub updated: usize,
}

/// Risk operations over the six device record kinds.
pub struct DeviceRiskService {
    repo: Repository,
}

impl DeviceRiskService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn get(&self, kind: DeviceKind, id: i64) -> Result<DisplayRecord> {
        let record = self
            .repo
            .get_device_record(kind, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", kind, id)))?;
        Ok(record.to_display())
    }

    pub async fn update_risk_level(
        &self,
        kind: DeviceKind,
        id: i64,
        level: RiskLevel,
    ) -> Result<DisplayRecord> {
        let mut record = self
            .repo
            .get_device_record(kind, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", kind, id)))?;
        self.repo.update_device_risk_levels(kind, vec![id], level).await?;
        record.set_risk_level(level);
        tracing::info!("Set {} {} risk level to {}", kind, id, level);
        Ok(record.to_display())
    }

    /// Ids that do not exist are skipped and show up as the difference
    /// between `requested` and `updated`.
    pub async fn batch_update_risk_level(
        &self,
        kind: DeviceKind,
        ids: Vec<i64>,
        level: RiskLevel,
    ) -> Result<BatchUpdateOutcome> {
        let requested = ids.len();
        if requested == 0 {
            return Ok(BatchUpdateOutcome {
                success: false,
                message: "No ids given".to_string(),
                requested,
                updated: 0,
            });
        }

        let updated = self.repo.update_device_risk_levels(kind, ids, level).await?;
        tracing::info!("Batch set {} of {} {} records to {}", updated, requested, kind, level);
        Ok(BatchUpdateOutcome {
            success: true,
            message: format!("Updated {} of {} records", updated, requested),
            requested,
            updated,
        })
    }

    pub async fn update_remarks(
        &self,
        kind: DeviceKind,
        id: i64,
        remarks: Option<String>,
    ) -> Result<DisplayRecord> {
        let remarks = remarks.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if !self.repo.update_device_remark(kind, id, remarks).await? {
            return Err(AppError::NotFound(format!("{} {}", kind, id)));
        }
        self.get(kind, id).await
    }

    /// Replaces one stored keyword (case-insensitive match) and rewrites the
    /// column as a JSON array.
    pub async fn replace_keyword(
        &self,
        kind: DeviceKind,
        id: i64,
        old: &str,
        new: &str,
    ) -> Result<DisplayRecord> {
        let record = self
            .repo
            .get_device_record(kind, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", kind, id)))?;

        let (old, new) = (old.trim(), new.trim());
        let mut keywords = parse_keyword_list(record.meta.keywords.as_deref());
        let Some(pos) = keywords.iter().position(|k| k.eq_ignore_ascii_case(old)) else {
            return Err(AppError::NotFound(format!("keyword {old} on {kind} {id}")));
        };
        if new.is_empty() {
            keywords.remove(pos);
        } else {
            keywords[pos] = new.to_string();
        }

        let stored = if keywords.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&keywords)?)
        };
        self.repo.update_device_keywords(kind, id, stored).await?;
        self.get(kind, id).await
    }

    /// HIGH-risk record counts per kind.
    pub async fn high_risk_counts(&self) -> Result<Vec<(DeviceKind, u64)>> {
        self.repo.device_counts_by_kind(RiskLevel::High).await
    }

    /// For each enabled NORMAL keyword, how many HIGH-risk device records
    /// (any kind) carry a keyword containing it. Zero counts are dropped and
    /// the result is sorted by count, highest first.
    pub async fn keyword_statistics(&self, country: Option<&str>) -> Result<Vec<KeywordStat>> {
        let keywords = self.repo.list_enabled_keywords(KeywordKind::Normal).await?;
        let country = country.map(str::trim).filter(|c| !c.is_empty());

        let record_keywords: Vec<Vec<String>> = self
            .repo
            .high_risk_device_keywords()
            .await?
            .into_iter()
            .filter(|row| match country {
                Some(c) => row
                    .jd_country
                    .as_deref()
                    .is_some_and(|jd| jd.trim().to_lowercase() == c.to_lowercase()),
                None => true,
            })
            .map(|row| {
                parse_keyword_list(row.keywords.as_deref())
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .collect()
            })
            .collect();

        let mut stats: Vec<KeywordStat> = keywords
            .into_iter()
            .filter_map(|entry| {
                let needle = entry.keyword.trim().to_lowercase();
                if needle.is_empty() {
                    return None;
                }
                let count = record_keywords
                    .iter()
                    .filter(|list| list.iter().any(|k| k.contains(&needle)))
                    .count() as u64;
                (count > 0).then(|| KeywordStat {
                    id: entry.id,
                    keyword: entry.keyword,
                    kind: entry.kind,
                    enabled: entry.enabled,
                    count,
                    created_at: entry.created_at,
                    updated_at: entry.updated_at,
                })
            })
            .collect();

        stats.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CustomsCase, Device510K, DeviceDetail, DeviceEvent, DeviceMeta, DeviceRecord,
    };

    fn meta(key: &str, level: RiskLevel, keywords: &str, country: &str) -> DeviceMeta {
        DeviceMeta {
            id: 0,
            natural_key: key.into(),
            risk_level: level,
            keywords: Some(keywords.into()),
            jd_country: Some(country.into()),
            data_source: Some("test".into()),
            remark: None,
        }
    }

    async fn seeded() -> (Repository, Vec<i64>) {
        let repo = Repository::open_in_memory().await.unwrap();
        let records = vec![
            DeviceRecord {
                meta: meta("K1", RiskLevel::High, r#"["Wireless charger","FCC"]"#, "US"),
                detail: DeviceDetail::Device510K(Device510K {
                    device_name: Some("Charger".into()),
                    ..Default::default()
                }),
            },
            DeviceRecord {
                meta: meta("E1", RiskLevel::High, "wireless, battery", "us"),
                detail: DeviceDetail::Event(DeviceEvent::default()),
            },
            DeviceRecord {
                meta: meta("C1", RiskLevel::High, "battery", "EU"),
                detail: DeviceDetail::CustomsCase(CustomsCase::default()),
            },
            DeviceRecord {
                meta: meta("K2", RiskLevel::Medium, "wireless", "US"),
                detail: DeviceDetail::Device510K(Device510K::default()),
            },
        ];
        let mut ids = Vec::new();
        for record in &records {
            ids.push(repo.insert_device_record(record).await.unwrap().unwrap());
        }
        for kw in ["wireless", "battery", "radar"] {
            repo.upsert_keyword(kw, KeywordKind::Normal).await.unwrap();
        }
        repo.upsert_keyword("charger", KeywordKind::Blacklist).await.unwrap();
        (repo, ids)
    }

    #[tokio::test]
    async fn keyword_statistics_count_high_risk_across_kinds() {
        let (repo, _) = seeded().await;
        let service = DeviceRiskService::new(repo);

        let stats = service.keyword_statistics(None).await.unwrap();
        let pairs: Vec<(&str, u64)> = stats.iter().map(|s| (s.keyword.as_str(), s.count)).collect();
        assert_eq!(pairs, vec![("wireless", 2), ("battery", 2)]);

        let us = service.keyword_statistics(Some("US")).await.unwrap();
        let pairs: Vec<(&str, u64)> = us.iter().map(|s| (s.keyword.as_str(), s.count)).collect();
        assert_eq!(pairs, vec![("wireless", 2), ("battery", 1)]);
    }

    #[tokio::test]
    async fn update_and_batch_update_risk_level() {
        let (repo, ids) = seeded().await;
        let service = DeviceRiskService::new(repo);

        let display = service
            .update_risk_level(DeviceKind::Device510K, ids[3], RiskLevel::High)
            .await
            .unwrap();
        assert_eq!(display.risk_level, RiskLevel::High);

        // ids[1] is an Event record, so it is not touched by a 510K batch.
        let outcome = service
            .batch_update_risk_level(DeviceKind::Device510K, vec![ids[0], ids[1], ids[3]], RiskLevel::Low)
            .await
            .unwrap();
        assert_eq!(outcome.requested, 3);
        assert_eq!(outcome.updated, 2);
        assert_eq!(
            service.get(DeviceKind::Event, ids[1]).await.unwrap().risk_level,
            RiskLevel::High
        );
        assert_eq!(service.high_risk_counts().await.unwrap()[0], (DeviceKind::Device510K, 0));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let (repo, ids) = seeded().await;
        let service = DeviceRiskService::new(repo);
        assert!(matches!(
            service.get(DeviceKind::Recall, ids[0]).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn replace_keyword_and_update_remarks() {
        let (repo, ids) = seeded().await;
        let service = DeviceRiskService::new(repo);

        let display = service
            .replace_keyword(DeviceKind::Event, ids[1], "WIRELESS", "Bluetooth")
            .await
            .unwrap();
        assert_eq!(display.matched_keywords, vec!["Bluetooth", "battery"]);

        let display = service
            .update_remarks(DeviceKind::Event, ids[1], Some(" reviewed ".into()))
            .await
            .unwrap();
        assert_eq!(display.remarks.as_deref(), Some("reviewed"));
    }
}
