use regex::Regex;

use crate::error::Result;
use crate::models::Record;

/// Upper bound on how much body text goes into a search string.
pub const CONTENT_SEARCH_LIMIT: usize = 1500;

/// Normalises record text and finds which keywords it mentions.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    tags: Regex,
    entities: Regex,
    line_breaks: Regex,
    whitespace: Regex,
}

impl KeywordMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tags: Regex::new(r"<[^>]+>")?,
            entities: Regex::new(r"&[a-zA-Z0-9#]+;")?,
            line_breaks: Regex::new(r"[\r\n\t]+")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Strips HTML tags and entities, collapses whitespace and trims.
    pub fn clean_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let text = self.tags.replace_all(text, " ");
        let text = self.entities.replace_all(&text, " ");
        let text = self.line_breaks.replace_all(&text, " ");
        let text = self.whitespace.replace_all(&text, " ");
        text.trim().to_string()
    }

    /// Title, summary, product and type, then the first
    /// [`CONTENT_SEARCH_LIMIT`] characters of the cleaned body.
    pub fn build_search_text(&self, record: &Record) -> String {
        let mut parts = Vec::with_capacity(5);
        let leading = [&record.title, &record.summary, &record.product, &record.record_type];
        for value in leading.into_iter().flatten() {
            let cleaned = self.clean_text(value);
            if !cleaned.is_empty() {
                parts.push(cleaned);
            }
        }

        if let Some(content) = &record.content {
            let cleaned = self.clean_text(content);
            if !cleaned.is_empty() {
                parts.push(truncate_chars(&cleaned, CONTENT_SEARCH_LIMIT).to_string());
            }
        }

        parts.join(" ").trim().to_string()
    }

    /// Keywords (in list order, original spelling) that occur in `text`,
    /// compared case-insensitively. Blank keywords never match.
    pub fn match_keywords(&self, text: &str, keywords: &[String]) -> Vec<String> {
        if text.is_empty() || keywords.is_empty() {
            return Vec::new();
        }
        let haystack = text.to_lowercase();

        keywords
            .iter()
            .filter(|keyword| {
                let needle = keyword.trim();
                !needle.is_empty() && haystack.contains(&needle.to_lowercase())
            })
            .cloned()
            .collect()
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
