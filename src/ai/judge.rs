use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Record;

/// Text sent to the judge for one record. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRequest {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub country: String,
    pub source_name: String,
}

impl From<&Record> for JudgeRequest {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title.clone().unwrap_or_default(),
            content: record.content.clone().unwrap_or_default(),
            summary: record.summary.clone().unwrap_or_default(),
            country: record.country.clone().unwrap_or_default(),
            source_name: record.source_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Judgment {
    #[serde(alias = "isRelated")]
    pub related_to_certification: bool,
    /// In `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub extracted_keywords: Vec<String>,
}

impl Judgment {
    /// Human-readable audit line stored in the record's remarks. Always a
    /// single line so it can be found and replaced on the next run.
    pub fn audit_line(&self) -> String {
        let keywords: Vec<String> = self.extracted_keywords.iter().map(|k| single_line(k)).collect();
        format!(
            "{} {}, confidence: {:.1}%, reason: {}, extracted keywords: [{}]",
            AUDIT_PREFIX,
            if self.related_to_certification { "related" } else { "unrelated" },
            self.confidence * 100.0,
            single_line(&self.reason),
            keywords.join(", ")
        )
    }
}

/// Marks remark lines written by the AI pass.
pub const AUDIT_PREFIX: &str = "[AI judgment]";

fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Relevance classifier consulted once per record.
#[async_trait]
pub trait AiJudge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgment>;
}

/// Parses a judge reply, tolerating markdown fences and text around the
/// JSON object. Confidence is clamped into `[0, 1]`.
pub fn parse_judgment(reply: &str) -> Result<Judgment> {
    let text = strip_code_fences(reply);
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(AppError::AiJudge(format!(
                "no JSON object in reply: {}",
                truncate_for_log(reply)
            )))
        }
    };

    let mut judgment: Judgment = serde_json::from_str(json)?;
    judgment.confidence = judgment.confidence.clamp(0.0, 1.0);
    judgment.extracted_keywords = judgment
        .extracted_keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    Ok(judgment)
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply_with_legacy_field_name() {
        let reply = "```json\n{\"isRelated\": true, \"confidence\": 0.92, \"reason\": \"FCC rule\", \"extractedKeywords\": [\"FCC\", \" \"]}\n```";
        let judgment = parse_judgment(reply).unwrap();
        assert!(judgment.related_to_certification);
        assert_eq!(judgment.extracted_keywords, vec!["FCC".to_string()]);
    }

    #[test]
    fn parses_reply_with_surrounding_text() {
        let reply = r#"Here you go: {"relatedToCertification": false, "confidence": 1.7, "reason": "sports"} thanks"#;
        let judgment = parse_judgment(reply).unwrap();
        assert!(!judgment.related_to_certification);
        assert_eq!(judgment.confidence, 1.0);
        assert!(judgment.extracted_keywords.is_empty());
    }

    #[test]
    fn reply_without_json_is_an_error() {
        assert!(parse_judgment("I cannot decide").is_err());
    }

    #[test]
    fn audit_line_has_decision_confidence_and_reason() {
        let judgment = Judgment {
            related_to_certification: false,
            confidence: 0.875,
            reason: "consumer finance news".into(),
            extracted_keywords: vec![],
        };
        let line = judgment.audit_line();
        assert!(line.starts_with(AUDIT_PREFIX));
        assert!(line.contains("unrelated"));
        assert!(line.contains("87.5%"));
        assert!(line.contains("consumer finance news"));
    }

    #[test]
    fn audit_line_flattens_multi_line_reason_and_keywords() {
        let judgment = Judgment {
            related_to_certification: true,
            confidence: 0.9,
            reason: "line one\r\nline two\n".into(),
            extracted_keywords: vec!["Part 15\nSubpart B".into()],
        };
        let line = judgment.audit_line();
        assert_eq!(line.lines().count(), 1);
        assert!(line.contains("reason: line one line two,"));
        assert!(line.contains("[Part 15 Subpart B]"));
    }
}
