use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{chunk_count, ChunkProgress, ProgressReporter, DEFAULT_CHUNK_SIZE};
use crate::ai::{AiJudge, JudgeRequest, Judgment, AUDIT_PREFIX};
use crate::db::{RecordFilter, Repository};
use crate::error::Result;
use crate::keywords::KeywordFile;
use crate::models::{Record, RiskLevel, RiskUpdate};

pub const DEFAULT_AI_LIMIT: usize = 10;

/// Which records the AI pass looks at.
#[derive(Debug, Clone)]
pub struct AiPassFilter {
    pub risk_level: RiskLevel,
    pub source_name: Option<String>,
    pub limit: Option<usize>,
    /// Ignore `limit` and judge every matching record.
    pub judge_all: bool,
}

impl Default for AiPassFilter {
    fn default() -> Self {
        Self {
            risk_level: RiskLevel::Medium,
            source_name: None,
            limit: None,
            judge_all: false,
        }
    }
}

impl AiPassFilter {
    /// Builds a filter from loose caller input. A blank or unknown risk level
    /// falls back to MEDIUM.
    pub fn from_params(
        risk_level: Option<&str>,
        source_name: Option<&str>,
        limit: Option<usize>,
        judge_all: bool,
    ) -> Self {
        Self {
            risk_level: RiskLevel::parse_or(risk_level, RiskLevel::Medium),
            source_name: source_name
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            limit,
            judge_all,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditItem {
    pub id: i64,
    pub title: Option<String>,
    pub country: Option<String>,
    pub source_name: String,
    pub related: bool,
    pub confidence: f64,
    pub reason: String,
    pub extracted_keywords: Vec<String>,
    pub new_risk_level: RiskLevel,
    pub remark: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPassOutcome {
    pub success: bool,
    pub message: String,
    pub total: usize,
    pub processed: usize,
    pub marked_high: usize,
    pub marked_low: usize,
    pub error_count: usize,
    pub audit_items: Vec<AuditItem>,
    /// Deduplicated, sorted keywords extracted across the run.
    pub new_keywords: Vec<String>,
    pub keywords_added_to_file: usize,
}

/// AI arbitration over a filtered set of records.
pub struct AiTriage {
    repo: Repository,
    judge: Arc<dyn AiJudge>,
    keyword_file: Option<KeywordFile>,
    call_delay: Duration,
    default_limit: usize,
    chunk_size: usize,
    progress: ProgressReporter,
}

impl AiTriage {
    pub fn new(repo: Repository, judge: Arc<dyn AiJudge>) -> Self {
        Self {
            repo,
            judge,
            keyword_file: None,
            call_delay: Duration::from_millis(1000),
            default_limit: DEFAULT_AI_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: ProgressReporter::default(),
        }
    }

    pub fn with_keyword_file(mut self, file: KeywordFile) -> Self {
        self.keyword_file = Some(file);
        self
    }

    /// Pause between two judge calls.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, filter: AiPassFilter) -> Result<AiPassOutcome> {
        let limit = if filter.judge_all {
            None
        } else {
            Some(filter.limit.unwrap_or(self.default_limit))
        };
        let records = self
            .repo
            .find_records(RecordFilter {
                risk_level: Some(filter.risk_level),
                source_name: filter.source_name.clone(),
                limit,
            })
            .await?;

        tracing::info!(
            "AI pass: {} {} records (source: {})",
            records.len(),
            filter.risk_level,
            filter.source_name.as_deref().unwrap_or("all")
        );

        let mut outcome = AiPassOutcome {
            success: true,
            message: String::new(),
            total: records.len(),
            processed: 0,
            marked_high: 0,
            marked_low: 0,
            error_count: 0,
            audit_items: Vec::new(),
            new_keywords: Vec::new(),
            keywords_added_to_file: 0,
        };
        let mut extracted = BTreeSet::new();

        let chunks = chunk_count(records.len(), self.chunk_size);
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            for record in chunk {
                if outcome.processed > 0 && !self.call_delay.is_zero() {
                    tokio::time::sleep(self.call_delay).await;
                }
                outcome.processed += 1;

                match self.judge_record(record).await {
                    Ok(item) => {
                        if item.related {
                            outcome.marked_high += 1;
                        } else {
                            outcome.marked_low += 1;
                        }
                        extracted.extend(item.extracted_keywords.iter().cloned());
                        outcome.audit_items.push(item);
                    }
                    Err(e) => {
                        tracing::warn!("AI judgment failed for record {}: {}", record.id, e);
                        outcome.error_count += 1;
                    }
                }
            }
            self.progress.chunk_done(ChunkProgress {
                pass: "ai",
                chunk: index + 1,
                chunks,
                processed: outcome.processed,
                total: outcome.total,
                errors: outcome.error_count,
            });
        }

        outcome.new_keywords = extracted.into_iter().collect();
        if let Some(file) = &self.keyword_file {
            if !outcome.new_keywords.is_empty() {
                match file.merge(&outcome.new_keywords) {
                    Ok(added) => outcome.keywords_added_to_file = added,
                    Err(e) => tracing::warn!("Failed to merge extracted keywords: {}", e),
                }
            }
        }

        outcome.message = format!(
            "Judged {} records: {} HIGH, {} LOW, {} errors, {} new keywords",
            outcome.processed,
            outcome.marked_high,
            outcome.marked_low,
            outcome.error_count,
            outcome.keywords_added_to_file
        );
        tracing::info!("AI pass done: {}", outcome.message);
        Ok(outcome)
    }

    async fn judge_record(&self, record: &Record) -> Result<AuditItem> {
        let judgment = self.judge.judge(&JudgeRequest::from(record)).await?;
        let update = apply_judgment(record, &judgment);
        let new_risk_level = update.risk_level;
        let remark = update.remarks.clone().unwrap_or_default();
        self.repo.update_risk_fields(record.id, update).await?;

        tracing::debug!(
            "Record {} judged {} ({:.2})",
            record.id,
            if judgment.related_to_certification { "related" } else { "unrelated" },
            judgment.confidence
        );

        Ok(AuditItem {
            id: record.id,
            title: record.title.clone(),
            country: record.country.clone(),
            source_name: record.source_name.clone(),
            related: judgment.related_to_certification,
            confidence: judgment.confidence,
            reason: judgment.reason,
            extracted_keywords: judgment.extracted_keywords,
            new_risk_level,
            remark,
        })
    }
}

/// Risk fields after a judgment: related records become HIGH with the
/// extracted keywords, unrelated ones LOW with keywords cleared.
pub fn apply_judgment(record: &Record, judgment: &Judgment) -> RiskUpdate {
    let remarks = Some(merge_remarks(record.remarks.as_deref(), &judgment.audit_line()));
    if judgment.related_to_certification {
        RiskUpdate {
            risk_level: RiskLevel::High,
            related: Some(true),
            matched_keywords: (!judgment.extracted_keywords.is_empty())
                .then(|| judgment.extracted_keywords.clone()),
            remarks,
        }
    } else {
        RiskUpdate {
            risk_level: RiskLevel::Low,
            related: Some(false),
            matched_keywords: None,
            remarks,
        }
    }
}

/// Keeps human-written remark lines and replaces any earlier AI audit line.
pub fn merge_remarks(existing: Option<&str>, audit: &str) -> String {
    let mut lines: Vec<&str> = existing
        .unwrap_or_default()
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with(AUDIT_PREFIX))
        .collect();
    lines.push(audit);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_falls_back_to_medium() {
        assert_eq!(AiPassFilter::from_params(None, None, None, false).risk_level, RiskLevel::Medium);
        assert_eq!(
            AiPassFilter::from_params(Some("nonsense"), None, None, false).risk_level,
            RiskLevel::Medium
        );
        let filter = AiPassFilter::from_params(Some("high"), Some("  "), Some(5), true);
        assert_eq!(filter.risk_level, RiskLevel::High);
        assert!(filter.source_name.is_none());
        assert!(filter.judge_all);
    }

    #[test]
    fn human_remarks_survive_and_old_audit_is_replaced() {
        let first = merge_remarks(Some("checked by compliance team"), "[AI judgment] related, confidence: 90.0%");
        assert_eq!(first, "checked by compliance team\n[AI judgment] related, confidence: 90.0%");

        let second = merge_remarks(Some(&first), "[AI judgment] unrelated, confidence: 60.0%");
        assert_eq!(second, "checked by compliance team\n[AI judgment] unrelated, confidence: 60.0%");
    }

    #[test]
    fn empty_remarks_hold_only_the_audit() {
        assert_eq!(merge_remarks(None, "[AI judgment] x"), "[AI judgment] x");
        assert_eq!(merge_remarks(Some("  \n"), "[AI judgment] x"), "[AI judgment] x");
    }

    #[test]
    fn multi_line_reason_is_stable_across_reruns() {
        let judgment = Judgment {
            related_to_certification: true,
            confidence: 0.8,
            reason: "line one\nline two".into(),
            extracted_keywords: vec![],
        };
        let audit = judgment.audit_line();

        let first = merge_remarks(Some("human note"), &audit);
        let second = merge_remarks(Some(&first), &audit);
        let third = merge_remarks(Some(&second), &audit);
        assert_eq!(first, format!("human note\n{audit}"));
        assert_eq!(second, first);
        assert_eq!(third, first);
    }

    #[test]
    fn human_line_mentioning_ai_judgment_is_kept() {
        let merged = merge_remarks(
            Some("AI judgment: looked wrong, escalated manually"),
            "[AI judgment] related, confidence: 70.0%",
        );
        assert_eq!(
            merged,
            "AI judgment: looked wrong, escalated manually\n[AI judgment] related, confidence: 70.0%"
        );
    }
}
