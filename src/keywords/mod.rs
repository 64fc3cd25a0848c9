mod file;
mod matcher;

pub use file::{parse_keyword_lines, KeywordFile};
pub use matcher::{KeywordMatcher, CONTENT_SEARCH_LIMIT};

use serde::Serialize;

use crate::db::Repository;
use crate::error::Result;
use crate::models::KeywordKind;

/// One place a keyword list can come from.
#[derive(Debug, Clone)]
pub enum KeywordSource {
    Explicit(Vec<String>),
    File(KeywordFile),
    /// Enabled NORMAL keywords in the database.
    Database,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordOrigin {
    Explicit,
    File,
    Database,
    Empty,
}

#[derive(Debug, Clone)]
pub struct ResolvedKeywords {
    pub keywords: Vec<String>,
    pub origin: KeywordOrigin,
}

/// Ordered keyword sources; the first non-empty one wins.
#[derive(Debug, Clone, Default)]
pub struct KeywordSources {
    sources: Vec<KeywordSource>,
}

impl KeywordSources {
    pub fn new(sources: Vec<KeywordSource>) -> Self {
        Self { sources }
    }

    /// Caller list, then file, then database.
    pub fn standard(explicit: Option<Vec<String>>, file: Option<KeywordFile>) -> Self {
        let mut sources = Vec::with_capacity(3);
        if let Some(list) = explicit {
            sources.push(KeywordSource::Explicit(list));
        }
        if let Some(file) = file {
            sources.push(KeywordSource::File(file));
        }
        sources.push(KeywordSource::Database);
        Self { sources }
    }

    pub async fn resolve(&self, repo: &Repository) -> Result<ResolvedKeywords> {
        for source in &self.sources {
            let (keywords, origin) = match source {
                KeywordSource::Explicit(list) => (clean_list(list), KeywordOrigin::Explicit),
                KeywordSource::File(file) => match file.load() {
                    Ok(list) => (list, KeywordOrigin::File),
                    Err(e) => {
                        tracing::warn!(
                            "Failed to read keyword file {}: {}",
                            file.canonical_path().display(),
                            e
                        );
                        continue;
                    }
                },
                KeywordSource::Database => (
                    repo.list_enabled_keywords(KeywordKind::Normal)
                        .await?
                        .into_iter()
                        .map(|k| k.keyword)
                        .collect(),
                    KeywordOrigin::Database,
                ),
            };

            if !keywords.is_empty() {
                tracing::info!("Using {} keywords from {:?} source", keywords.len(), origin);
                return Ok(ResolvedKeywords { keywords, origin });
            }
        }

        Ok(ResolvedKeywords {
            keywords: Vec::new(),
            origin: KeywordOrigin::Empty,
        })
    }
}

fn clean_list(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Parses a stored keyword column: a JSON array, else a comma-separated
/// list, else nothing. Never fails.
pub fn parse_keyword_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };

    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return clean_list(&list);
        }
    }

    raw.split(',')
        .map(|k| k.trim().trim_matches(|c| c == '[' || c == ']' || c == '"').trim())
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        assert_eq!(
            parse_keyword_list(Some(r#"["FCC", " CE ", ""]"#)),
            vec!["FCC".to_string(), "CE".to_string()]
        );
    }

    #[test]
    fn falls_back_to_comma_split_on_bad_json() {
        assert_eq!(
            parse_keyword_list(Some(r#"["FCC", "CE""#)),
            vec!["FCC".to_string(), "CE".to_string()]
        );
        assert_eq!(
            parse_keyword_list(Some("wireless, ,battery")),
            vec!["wireless".to_string(), "battery".to_string()]
        );
    }

    #[test]
    fn explicit_list_wins_over_database() {
        tokio_test::block_on(async {
            let repo = Repository::open_in_memory().await.unwrap();
            repo.upsert_keyword("CE", KeywordKind::Normal).await.unwrap();

            let sources = KeywordSources::standard(Some(vec![" FCC ".into(), "".into()]), None);
            let resolved = sources.resolve(&repo).await.unwrap();
            assert_eq!(resolved.origin, KeywordOrigin::Explicit);
            assert_eq!(resolved.keywords, vec!["FCC".to_string()]);

            let resolved = KeywordSources::standard(Some(vec![]), None)
                .resolve(&repo)
                .await
                .unwrap();
            assert_eq!(resolved.origin, KeywordOrigin::Database);
            assert_eq!(resolved.keywords, vec!["CE".to_string()]);
        });
    }

    #[test]
    fn blank_or_missing_is_empty() {
        assert!(parse_keyword_list(None).is_empty());
        assert!(parse_keyword_list(Some("   ")).is_empty());
        assert!(parse_keyword_list(Some("[]")).is_empty());
    }
}
