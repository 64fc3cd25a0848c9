use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RiskLevel;
use crate::keywords::parse_keyword_list;

/// A stored regulatory record (news item or notice).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: i64,
    pub natural_key: String,
    pub source_name: String,
    pub country: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub product: Option<String>,
    pub record_type: Option<String>,
    pub publish_date: Option<String>,
    pub matched_keywords: Option<Vec<String>>,
    pub risk_level: RiskLevel,
    pub related: Option<bool>,
    pub remarks: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Comma-joined form used for display.
    pub fn matched_keywords_joined(&self) -> Option<String> {
        self.matched_keywords.as_ref().map(|k| k.join(","))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub natural_key: String,
    pub source_name: String,
    pub country: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub product: Option<String>,
    pub record_type: Option<String>,
    pub publish_date: Option<String>,
    pub risk_level: RiskLevel,
}

/// Risk fields written back by a classification pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskUpdate {
    pub risk_level: RiskLevel,
    pub related: Option<bool>,
    pub matched_keywords: Option<Vec<String>>,
    pub remarks: Option<String>,
}

impl RiskUpdate {
    /// Starts from the record's current values so callers only touch what changes.
    pub fn from_record(record: &Record) -> Self {
        Self {
            risk_level: record.risk_level,
            related: record.related,
            matched_keywords: record.matched_keywords.clone(),
            remarks: record.remarks.clone(),
        }
    }
}

/// Reads a stored keyword column. Rows written as a JSON array keep
/// keywords that contain commas; older comma-joined rows still load.
pub fn split_matched(raw: Option<String>) -> Option<Vec<String>> {
    raw.map(|s| parse_keyword_list(Some(&s)))
}

/// Inverse of [`split_matched`]; empty lists are stored as NULL.
pub fn join_matched(keywords: &Option<Vec<String>>) -> Option<String> {
    match keywords {
        Some(k) if !k.is_empty() => serde_json::to_string(k).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_with_comma_survives_storage() {
        let keywords = Some(vec!["Part 15, Subpart B".to_string(), "FCC".to_string()]);
        let stored = join_matched(&keywords);
        assert_eq!(stored.as_deref(), Some(r#"["Part 15, Subpart B","FCC"]"#));
        assert_eq!(split_matched(stored), keywords);
    }

    #[test]
    fn legacy_comma_rows_and_empty_lists() {
        assert_eq!(
            split_matched(Some("FCC, Part 15B".into())),
            Some(vec!["FCC".to_string(), "Part 15B".to_string()])
        );
        assert_eq!(join_matched(&Some(vec![])), None);
        assert_eq!(join_matched(&None), None);
    }
}
