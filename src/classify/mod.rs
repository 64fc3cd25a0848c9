mod ai_pass;
mod device;
mod keyword_pass;
mod review;

pub use ai_pass::{
    apply_judgment, merge_remarks, AiPassFilter, AiPassOutcome, AiTriage, AuditItem, DEFAULT_AI_LIMIT,
};
pub use device::{BatchUpdateOutcome, DeviceRiskService, KeywordStat};
pub use keyword_pass::{KeywordPassOutcome, RiskClassifier, SourcePassOutcome};
pub use review::{
    AutoJudge, AutoJudgeOutcome, BatchConfirmOutcome, JudgmentReview, AUTO_JUDGE_BATCH_SIZE,
};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Emitted after each chunk of a classification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub pass: &'static str,
    pub chunk: usize,
    pub chunks: usize,
    pub processed: usize,
    pub total: usize,
    pub errors: usize,
}

/// Logs chunk progress and forwards it to an optional listener.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<ChunkProgress>>,
}

impl ProgressReporter {
    pub fn new(tx: UnboundedSender<ChunkProgress>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn chunk_done(&self, progress: ChunkProgress) {
        tracing::info!(
            "{} pass: chunk {}/{} done, {}/{} records processed, {} errors",
            progress.pass,
            progress.chunk,
            progress.chunks,
            progress.processed,
            progress.total,
            progress.errors
        );
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(progress);
        }
    }
}

pub(crate) fn chunk_count(total: usize, chunk_size: usize) -> usize {
    total.div_ceil(chunk_size.max(1))
}
