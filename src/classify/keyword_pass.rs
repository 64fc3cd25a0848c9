use serde::Serialize;

use super::{chunk_count, ChunkProgress, ProgressReporter, DEFAULT_CHUNK_SIZE};
use crate::db::Repository;
use crate::error::Result;
use crate::keywords::{KeywordFile, KeywordMatcher, KeywordOrigin, KeywordSources};
use crate::models::{Record, RiskLevel, RiskUpdate};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordPassOutcome {
    pub success: bool,
    pub message: String,
    pub total: usize,
    pub processed: usize,
    pub matched: usize,
    pub upgraded: usize,
    pub unchanged: usize,
    pub error_count: usize,
    pub keywords_used: usize,
    pub keyword_origin: KeywordOrigin,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePassOutcome {
    pub success: bool,
    pub message: String,
    pub source_name: String,
    pub total: usize,
    pub processed: usize,
    pub related: usize,
    pub unrelated: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub escalated: usize,
    pub error_count: usize,
    pub keywords_used: usize,
}

/// Keyword-driven reclassification of stored records.
pub struct RiskClassifier {
    repo: Repository,
    matcher: KeywordMatcher,
    keyword_file: Option<KeywordFile>,
    chunk_size: usize,
    progress: ProgressReporter,
}

impl RiskClassifier {
    pub fn new(repo: Repository, keyword_file: Option<KeywordFile>) -> Result<Self> {
        Ok(Self {
            repo,
            matcher: KeywordMatcher::new()?,
            keyword_file,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: ProgressReporter::default(),
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    /// Escalates MEDIUM records that mention any keyword to HIGH. Records at
    /// other levels are never touched, so rerunning on unchanged data is a
    /// no-op.
    pub async fn run_keyword_pass(&self, explicit: Option<Vec<String>>) -> Result<KeywordPassOutcome> {
        let sources = KeywordSources::standard(explicit, self.keyword_file.clone());
        let resolved = sources.resolve(&self.repo).await?;

        let mut outcome = KeywordPassOutcome {
            success: false,
            message: String::new(),
            total: 0,
            processed: 0,
            matched: 0,
            upgraded: 0,
            unchanged: 0,
            error_count: 0,
            keywords_used: resolved.keywords.len(),
            keyword_origin: resolved.origin,
        };

        if resolved.keywords.is_empty() {
            outcome.message = "No keywords available".to_string();
            tracing::warn!("Keyword pass skipped: no keywords available");
            return Ok(outcome);
        }

        let records = self.repo.records_by_risk_level(RiskLevel::Medium).await?;
        outcome.total = records.len();
        tracing::info!(
            "Keyword pass: {} MEDIUM records, {} keywords",
            records.len(),
            resolved.keywords.len()
        );

        let chunks = chunk_count(records.len(), self.chunk_size);
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            for record in chunk {
                outcome.processed += 1;
                match self.escalate_if_matched(record, &resolved.keywords).await {
                    Ok(true) => {
                        outcome.matched += 1;
                        outcome.upgraded += 1;
                    }
                    Ok(false) => outcome.unchanged += 1,
                    Err(e) => {
                        tracing::warn!("Keyword pass failed for record {}: {}", record.id, e);
                        outcome.error_count += 1;
                    }
                }
            }
            self.progress.chunk_done(ChunkProgress {
                pass: "keyword",
                chunk: index + 1,
                chunks,
                processed: outcome.processed,
                total: outcome.total,
                errors: outcome.error_count,
            });
        }

        outcome.success = true;
        outcome.message = format!(
            "Processed {} records: {} escalated to HIGH, {} unchanged, {} errors",
            outcome.processed, outcome.upgraded, outcome.unchanged, outcome.error_count
        );
        tracing::info!("Keyword pass done: {}", outcome.message);
        Ok(outcome)
    }

    async fn escalate_if_matched(&self, record: &Record, keywords: &[String]) -> Result<bool> {
        let text = self.matcher.build_search_text(record);
        let matches = self.matcher.match_keywords(&text, keywords);
        if matches.is_empty() {
            return Ok(false);
        }

        tracing::debug!("Record {} matched {:?}", record.id, matches);
        let mut update = RiskUpdate::from_record(record);
        update.risk_level = RiskLevel::High;
        update.related = Some(true);
        update.matched_keywords = Some(matches);
        self.repo.update_risk_fields(record.id, update).await?;
        Ok(true)
    }

    /// Recomputes `related` for every live record of one source. Records
    /// whose relatedness changed are updated; newly related ones become HIGH.
    pub async fn run_source_pass(&self, source_name: &str) -> Result<SourcePassOutcome> {
        let sources = KeywordSources::standard(None, self.keyword_file.clone());
        let resolved = sources.resolve(&self.repo).await?;

        let mut outcome = SourcePassOutcome {
            success: false,
            message: String::new(),
            source_name: source_name.to_string(),
            total: 0,
            processed: 0,
            related: 0,
            unrelated: 0,
            updated: 0,
            unchanged: 0,
            escalated: 0,
            error_count: 0,
            keywords_used: resolved.keywords.len(),
        };

        if resolved.keywords.is_empty() {
            outcome.message = "No keywords available".to_string();
            tracing::warn!("Source pass for {} skipped: no keywords available", source_name);
            return Ok(outcome);
        }

        let records = self.repo.records_by_source(source_name).await?;
        outcome.total = records.len();

        let chunks = chunk_count(records.len(), self.chunk_size);
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            for record in chunk {
                outcome.processed += 1;
                match self.reassess_relatedness(record, &resolved.keywords).await {
                    Ok(result) => {
                        if result.related {
                            outcome.related += 1;
                        } else {
                            outcome.unrelated += 1;
                        }
                        if result.updated {
                            outcome.updated += 1;
                        } else {
                            outcome.unchanged += 1;
                        }
                        if result.escalated {
                            outcome.escalated += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Source pass failed for record {}: {}", record.id, e);
                        outcome.error_count += 1;
                    }
                }
            }
            self.progress.chunk_done(ChunkProgress {
                pass: "source",
                chunk: index + 1,
                chunks,
                processed: outcome.processed,
                total: outcome.total,
                errors: outcome.error_count,
            });
        }

        outcome.success = true;
        outcome.message = format!(
            "Processed {} records of {}: {} related, {} unrelated, {} updated, {} errors",
            outcome.processed,
            source_name,
            outcome.related,
            outcome.unrelated,
            outcome.updated,
            outcome.error_count
        );
        tracing::info!("Source pass done: {}", outcome.message);
        Ok(outcome)
    }

    async fn reassess_relatedness(&self, record: &Record, keywords: &[String]) -> Result<Reassessment> {
        let text = self.matcher.build_search_text(record);
        let matches = self.matcher.match_keywords(&text, keywords);
        let related = !matches.is_empty();

        if record.related == Some(related) {
            return Ok(Reassessment {
                related,
                updated: false,
                escalated: false,
            });
        }

        let mut update = RiskUpdate::from_record(record);
        update.related = Some(related);
        update.matched_keywords = related.then_some(matches);
        let escalated = related && record.risk_level != RiskLevel::High;
        if related {
            update.risk_level = RiskLevel::High;
        }
        self.repo.update_risk_fields(record.id, update).await?;

        Ok(Reassessment {
            related,
            updated: true,
            escalated,
        })
    }
}

struct Reassessment {
    related: bool,
    updated: bool,
    escalated: bool,
}
