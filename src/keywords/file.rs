use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::Result;

/// Plain-text keyword list: one keyword per line, `#` starts a comment.
///
/// Reads try the canonical path first and then each fallback; the first
/// file that exists wins. Writes always go to the canonical path.
#[derive(Debug, Clone)]
pub struct KeywordFile {
    canonical: PathBuf,
    fallbacks: Vec<PathBuf>,
}

impl KeywordFile {
    pub fn new(canonical: impl Into<PathBuf>) -> Self {
        Self {
            canonical: canonical.into(),
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<PathBuf>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    /// First existing candidate in lookup order.
    pub fn resolve_read_path(&self) -> Option<&Path> {
        std::iter::once(&self.canonical)
            .chain(self.fallbacks.iter())
            .map(PathBuf::as_path)
            .find(|p| p.is_file())
    }

    pub fn exists(&self) -> bool {
        self.resolve_read_path().is_some()
    }

    /// Keywords from the first existing file; empty when none exists.
    pub fn load(&self) -> Result<Vec<String>> {
        let Some(path) = self.resolve_read_path() else {
            return Ok(Vec::new());
        };
        let content = std::fs::read_to_string(path)?;
        let keywords = parse_keyword_lines(&content);
        tracing::debug!("Loaded {} keywords from {}", keywords.len(), path.display());
        Ok(keywords)
    }

    /// Overwrites the canonical file with a generated header.
    pub fn save(&self, keywords: &[String]) -> Result<()> {
        if let Some(parent) = self.canonical.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut content = format!(
            "# Keyword list\n# One keyword per line, lines starting with # are comments\n# Generated at: {}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            content.push_str(keyword);
            content.push('\n');
        }

        std::fs::write(&self.canonical, content)?;
        tracing::info!("Saved {} keywords to {}", keywords.len(), self.canonical.display());
        Ok(())
    }

    /// Case-sensitive set union with `new_keywords`, sorted. Writes only when
    /// something was added and returns the number of added keywords.
    pub fn merge(&self, new_keywords: &[String]) -> Result<usize> {
        let mut merged: BTreeSet<String> = self.load()?.into_iter().collect();
        let before = merged.len();
        merged.extend(
            new_keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(String::from),
        );

        let added = merged.len() - before;
        if added > 0 {
            let keywords: Vec<String> = merged.into_iter().collect();
            self.save(&keywords)?;
        }
        Ok(added)
    }

    /// Returns whether the keyword was present.
    pub fn remove(&self, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim();
        let mut keywords = self.load()?;
        let before = keywords.len();
        keywords.retain(|k| k != keyword);
        if keywords.len() == before {
            return Ok(false);
        }
        self.save(&keywords)?;
        Ok(true)
    }

    /// Renames `old` to `new` in place. Returns whether `old` was present.
    pub fn replace(&self, old: &str, new: &str) -> Result<bool> {
        let (old, new) = (old.trim(), new.trim());
        let mut keywords = self.load()?;
        let Some(pos) = keywords.iter().position(|k| k == old) else {
            return Ok(false);
        };
        if new.is_empty() || keywords.iter().any(|k| k == new) {
            keywords.remove(pos);
        } else {
            keywords[pos] = new.to_string();
        }
        self.save(&keywords)?;
        Ok(true)
    }
}

pub fn parse_keyword_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let parsed = parse_keyword_lines("# header\n\n  FCC  \n#CE\nPart 15B\n\t\n");
        assert_eq!(parsed, kw(&["FCC", "Part 15B"]));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let file = KeywordFile::new(dir.path().join("keywords.txt"));
        assert!(!file.exists());
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn fallback_is_read_when_canonical_missing() {
        let dir = TempDir::new().unwrap();
        let fallback = dir.path().join("legacy.txt");
        std::fs::write(&fallback, "RoHS\n").unwrap();

        let file = KeywordFile::new(dir.path().join("keywords.txt")).with_fallbacks(vec![fallback.clone()]);
        assert_eq!(file.resolve_read_path(), Some(fallback.as_path()));
        assert_eq!(file.load().unwrap(), kw(&["RoHS"]));
    }

    #[test]
    fn merge_is_sorted_case_sensitive_union() {
        let dir = TempDir::new().unwrap();
        let file = KeywordFile::new(dir.path().join("nested").join("keywords.txt"));
        file.save(&kw(&["FCC", "CE"])).unwrap();

        let added = file.merge(&kw(&["fcc", "CE", " RoHS ", ""])).unwrap();
        assert_eq!(added, 2);
        assert_eq!(file.load().unwrap(), kw(&["CE", "FCC", "RoHS", "fcc"]));

        let content = std::fs::read_to_string(file.canonical_path()).unwrap();
        assert!(content.starts_with("# Keyword list"));
        assert!(content.contains("# Generated at: "));
    }

    #[test]
    fn merge_without_new_keywords_does_not_write() {
        let dir = TempDir::new().unwrap();
        let file = KeywordFile::new(dir.path().join("keywords.txt"));
        assert_eq!(file.merge(&kw(&["  "])).unwrap(), 0);
        assert!(!file.exists());
    }

    #[test]
    fn remove_and_replace() {
        let dir = TempDir::new().unwrap();
        let file = KeywordFile::new(dir.path().join("keywords.txt"));
        file.save(&kw(&["CE", "FCC", "KC"])).unwrap();

        assert!(file.remove("KC").unwrap());
        assert!(!file.remove("KC").unwrap());
        assert!(file.replace("CE", "CE-RED").unwrap());
        assert!(!file.replace("missing", "x").unwrap());
        assert_eq!(file.load().unwrap(), kw(&["CE-RED", "FCC"]));
    }
}
