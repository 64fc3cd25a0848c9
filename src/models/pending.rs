use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RiskLevel;
use crate::ai::Judgment;
use crate::error::{AppError, Result};

/// Days an AI judgment waits for review before it expires.
pub const PENDING_TTL_DAYS: i64 = 30;

/// Who decided when the caller gives no name.
pub const SYSTEM_REVIEWER: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Confirmed => "CONFIRMED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReviewStatus::Pending),
            "CONFIRMED" => Ok(ReviewStatus::Confirmed),
            "REJECTED" => Ok(ReviewStatus::Rejected),
            "EXPIRED" => Ok(ReviewStatus::Expired),
            other => Err(AppError::InvalidInput(format!("unknown review status: {other}"))),
        }
    }
}

/// An AI judgment about to be queued for human review.
#[derive(Debug, Clone)]
pub struct NewPendingJudgment {
    pub record_id: i64,
    pub judgment: Judgment,
    pub suggested_risk_level: RiskLevel,
    pub suggested_remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// An AI judgment held back until a reviewer confirms or rejects it. The
/// record it concerns keeps its risk level until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJudgment {
    pub id: i64,
    pub record_id: i64,
    pub judgment: Judgment,
    pub suggested_risk_level: RiskLevel,
    pub suggested_remark: Option<String>,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
}

impl PendingJudgment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.status == ReviewStatus::Pending && !self.is_expired(now)
    }

    pub fn confirm(&mut self, by: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        self.decide(ReviewStatus::Confirmed, by, now)
    }

    pub fn reject(&mut self, by: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        self.decide(ReviewStatus::Rejected, by, now)
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.decide(ReviewStatus::Expired, Some(SYSTEM_REVIEWER), now)
    }

    fn decide(&mut self, to: ReviewStatus, by: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        if self.status != ReviewStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.decided_at = Some(now);
        self.decided_by = Some(
            by.map(str::trim)
                .filter(|b| !b.is_empty())
                .unwrap_or(SYSTEM_REVIEWER)
                .to_string(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(now: DateTime<Utc>) -> PendingJudgment {
        PendingJudgment {
            id: 1,
            record_id: 7,
            judgment: Judgment {
                related_to_certification: true,
                confidence: 0.9,
                reason: "radio rule".into(),
                extracted_keywords: vec![],
            },
            suggested_risk_level: RiskLevel::High,
            suggested_remark: None,
            status: ReviewStatus::Pending,
            created_at: now,
            expires_at: now + Duration::days(PENDING_TTL_DAYS),
            decided_at: None,
            decided_by: None,
        }
    }

    #[test]
    fn confirm_records_reviewer_and_is_final() {
        let now = Utc::now();
        let mut item = pending(now);
        item.confirm(Some("  "), now).unwrap();
        assert_eq!(item.status, ReviewStatus::Confirmed);
        assert_eq!(item.decided_by.as_deref(), Some(SYSTEM_REVIEWER));

        assert!(item.reject(Some("alice"), now).is_err());
        assert!(item.expire(now).is_err());
        assert_eq!(item.status, ReviewStatus::Confirmed);
    }

    #[test]
    fn expiry_is_relative_to_now() {
        let now = Utc::now();
        let item = pending(now);
        assert!(item.is_pending(now));
        assert!(!item.is_pending(now + Duration::days(PENDING_TTL_DAYS + 1)));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("rejected".parse::<ReviewStatus>().unwrap(), ReviewStatus::Rejected);
        assert!("maybe".parse::<ReviewStatus>().is_err());
    }
}
