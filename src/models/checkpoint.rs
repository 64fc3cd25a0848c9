use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckpointStatus {
    #[default]
    Running,
    Paused,
    Failed,
    Completed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Running => "RUNNING",
            CheckpointStatus::Paused => "PAUSED",
            CheckpointStatus::Failed => "FAILED",
            CheckpointStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(CheckpointStatus::Running),
            "PAUSED" => Ok(CheckpointStatus::Paused),
            "FAILED" => Ok(CheckpointStatus::Failed),
            "COMPLETED" => Ok(CheckpointStatus::Completed),
            other => Err(AppError::InvalidInput(format!("unknown checkpoint status: {other}"))),
        }
    }
}

/// Identity of one logical crawl task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub crawler_type: String,
    pub search_term: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub target_total: Option<u64>,
    pub batch_size: u64,
}

impl CrawlTask {
    pub fn new(crawler_type: impl Into<String>, batch_size: u64) -> Self {
        Self {
            crawler_type: crawler_type.into(),
            search_term: None,
            date_from: None,
            date_to: None,
            target_total: None,
            batch_size,
        }
    }

    pub fn search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn date_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.date_from = Some(from.into());
        self.date_to = Some(to.into());
        self
    }

    pub fn target_total(mut self, target: u64) -> Self {
        self.target_total = Some(target);
        self
    }

    /// `{type}_{hash(term)|null}_{from|null}_{to|null}`
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.crawler_type,
            self.search_term
                .as_deref()
                .map(hash_search_term)
                .unwrap_or_else(|| "null".to_string()),
            self.date_from.as_deref().unwrap_or("null"),
            self.date_to.as_deref().unwrap_or("null"),
        )
    }
}

/// Stable short digest so keys stay bounded for long search terms.
pub fn hash_search_term(term: &str) -> String {
    let digest = Sha256::digest(term.as_bytes());
    hex::encode(&digest[..8])
}

/// Persisted pagination cursor plus status for one crawl task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlCheckpoint {
    pub id: i64,
    pub key: String,
    pub crawler_type: String,
    pub search_term: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub current_skip: u64,
    pub total_fetched: u64,
    pub target_total: Option<u64>,
    pub batch_size: u64,
    pub status: CheckpointStatus,
    pub error_message: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CrawlCheckpoint {
    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
            || self
                .target_total
                .is_some_and(|target| self.total_fetched >= target)
    }

    pub fn can_continue(&self) -> bool {
        self.status == CheckpointStatus::Running && !self.is_completed()
    }

    /// Records a new cursor. The caller supplies non-decreasing values.
    /// Reaching `target_total` promotes the status to COMPLETED.
    pub fn update_progress(&mut self, skip: u64, total_fetched: u64) -> Result<()> {
        if self.status != CheckpointStatus::Running {
            return Err(self.transition_error(CheckpointStatus::Running));
        }
        self.current_skip = skip;
        self.total_fetched = total_fetched;
        self.last_updated = Utc::now();
        if self.is_completed() {
            self.status = CheckpointStatus::Completed;
        }
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        if matches!(self.status, CheckpointStatus::Completed) {
            return Ok(());
        }
        if self.status == CheckpointStatus::Failed {
            return Err(self.transition_error(CheckpointStatus::Completed));
        }
        self.status = CheckpointStatus::Completed;
        self.last_updated = Utc::now();
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.status == CheckpointStatus::Completed {
            return Err(self.transition_error(CheckpointStatus::Failed));
        }
        self.status = CheckpointStatus::Failed;
        self.error_message = Some(reason.into());
        self.last_updated = Utc::now();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.status != CheckpointStatus::Running {
            return Err(self.transition_error(CheckpointStatus::Paused));
        }
        self.status = CheckpointStatus::Paused;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Explicit re-invocation after a pause or failure. Clears the stored error.
    pub fn resume(&mut self) -> Result<()> {
        match self.status {
            CheckpointStatus::Paused | CheckpointStatus::Failed => {
                self.status = CheckpointStatus::Running;
                self.error_message = None;
                self.last_updated = Utc::now();
                Ok(())
            }
            CheckpointStatus::Running => Ok(()),
            CheckpointStatus::Completed => Err(self.transition_error(CheckpointStatus::Running)),
        }
    }

    fn transition_error(&self, to: CheckpointStatus) -> AppError {
        AppError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
