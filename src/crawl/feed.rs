use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;

use super::{RawRecord, SourceCrawler};
use crate::config::FeedSourceConfig;
use crate::error::Result;

/// RSS/Atom feed published by a regulator.
pub struct FeedSource {
    client: Client,
    config: FeedSourceConfig,
}

impl FeedSource {
    pub fn new(config: FeedSourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("riskwatch/0.1")
            .build()?;

        Ok(Self { client, config })
    }

    /// Converts a parsed feed body into raw records.
    pub fn parse_entries(&self, body: &[u8]) -> Result<Vec<RawRecord>> {
        let feed = parser::parse(body)?;

        let records = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone());
                let natural_key = if entry.id.trim().is_empty() {
                    link.clone()?
                } else {
                    entry.id.clone()
                };

                // Try content first, then fall back to summary
                let content_html = entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.clone())
                    .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));
                let content = content_html.and_then(|html| html_to_text(&html));
                let summary = entry
                    .summary
                    .as_ref()
                    .and_then(|s| html_to_text(&s.content));

                Some(RawRecord {
                    natural_key,
                    source_name: self.config.source_name.clone(),
                    country: self.config.country.clone(),
                    title: entry.title.map(|t| t.content),
                    content,
                    summary,
                    product: None,
                    record_type: entry.categories.first().map(|c| c.term.clone()),
                    publish_date: entry.published.or(entry.updated).map(|dt| dt.to_rfc3339()),
                    risk_level: None,
                })
            })
            .collect();

        Ok(records)
    }
}

#[async_trait]
impl SourceCrawler for FeedSource {
    fn source_name(&self) -> &str {
        &self.config.source_name
    }

    async fn crawl(&self) -> Result<Vec<RawRecord>> {
        let response = self.client.get(&self.config.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        self.parse_entries(&bytes[..])
    }
}

fn html_to_text(html: &str) -> Option<String> {
    html2text::from_read(html.as_bytes(), 120)
        .ok()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Crawls every source concurrently, at most five at a time. Each source
/// succeeds or fails on its own.
pub async fn crawl_all(crawlers: &[Box<dyn SourceCrawler>]) -> Vec<(String, Result<Vec<RawRecord>>)> {
    stream::iter(crawlers)
        .map(|crawler| async move {
            let result = crawler.crawl().await;
            match &result {
                Ok(records) => {
                    tracing::debug!("Fetched {} records from {}", records.len(), crawler.source_name())
                }
                Err(e) => tracing::warn!("Failed to crawl {}: {}", crawler.source_name(), e),
            }
            (crawler.source_name().to_string(), result)
        })
        .buffer_unordered(5)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Regulator news</title>
    <link>https://regulator.example</link>
    <description>Notices</description>
    <item>
      <guid>notice-001</guid>
      <title>New FCC Part 15B requirements</title>
      <link>https://regulator.example/notice-001</link>
      <description>&lt;p&gt;Unintentional radiators must comply.&lt;/p&gt;</description>
      <category>Notice</category>
    </item>
    <item>
      <title>No guid here</title>
      <link>https://regulator.example/notice-002</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn feed_entries_become_raw_records() {
        let source = FeedSource::new(FeedSourceConfig {
            source_name: "regulator".into(),
            url: "https://regulator.example/rss".into(),
            country: Some("美国".into()),
        })
        .unwrap();

        let records = source.parse_entries(RSS.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.natural_key, "notice-001");
        assert_eq!(first.source_name, "regulator");
        assert_eq!(first.country.as_deref(), Some("美国"));
        assert_eq!(first.title.as_deref(), Some("New FCC Part 15B requirements"));
        assert!(first.summary.as_deref().unwrap().contains("Unintentional radiators"));
        assert_eq!(first.record_type.as_deref(), Some("Notice"));
        assert!(!records[1].natural_key.is_empty());
    }
}
