use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    join_matched, split_matched, KeywordEntry, KeywordKind, NewRecord, Record, RiskLevel,
    RiskUpdate,
};

use super::schema::SCHEMA;

pub(super) const RECORD_COLUMNS: &str = "id, natural_key, source_name, country, title, content, summary, product, \
     record_type, publish_date, matched_keywords, risk_level, related, remarks, deleted, \
     created_at, updated_at";

/// Filter for picking records to send to the AI judge.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub risk_level: Option<RiskLevel>,
    pub source_name: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct Repository {
    pub(super) conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Record operations

    pub async fn record_exists(&self, source_name: &str, natural_key: &str) -> Result<bool> {
        let source_name = source_name.to_string();
        let natural_key = natural_key.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM records WHERE source_name = ?1 AND natural_key = ?2",
                    params![source_name, natural_key],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    /// Inserts unless the natural key is already stored. Returns the new id,
    /// or `None` when the row was ignored as a duplicate.
    pub async fn insert_record(&self, record: NewRecord) -> Result<Option<i64>> {
        let id = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT OR IGNORE INTO records
                           (natural_key, source_name, country, title, content, summary, product,
                            record_type, publish_date, risk_level)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        record.natural_key,
                        record.source_name,
                        record.country,
                        record.title,
                        record.content,
                        record.summary,
                        record.product,
                        record.record_type,
                        record.publish_date,
                        record.risk_level.as_str(),
                    ],
                )?;
                Ok((inserted > 0).then(|| conn.last_insert_rowid()))
            })
            .await?;
        Ok(id)
    }

    pub async fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let record = self
            .conn
            .call(move |conn| {
                let record = conn
                    .query_row(
                        &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                        params![id],
                        record_from_row,
                    )
                    .optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    pub async fn records_by_risk_level(&self, level: RiskLevel) -> Result<Vec<Record>> {
        self.find_records(RecordFilter {
            risk_level: Some(level),
            ..Default::default()
        })
        .await
    }

    pub async fn records_by_source(&self, source_name: &str) -> Result<Vec<Record>> {
        self.find_records(RecordFilter {
            source_name: Some(source_name.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Non-deleted records matching every set filter field, oldest first.
    pub async fn find_records(&self, filter: RecordFilter) -> Result<Vec<Record>> {
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {RECORD_COLUMNS} FROM records
                       WHERE deleted = 0
                         AND (?1 IS NULL OR risk_level = ?1)
                         AND (?2 IS NULL OR source_name = ?2)
                       ORDER BY id
                       LIMIT ?3"#
                ))?;
                let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
                let records = stmt
                    .query_map(
                        params![
                            filter.risk_level.map(|l| l.as_str()),
                            filter.source_name,
                            limit
                        ],
                        record_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await?;
        Ok(records)
    }

    pub async fn update_risk_fields(&self, id: i64, update: RiskUpdate) -> Result<()> {
        self.conn
            .call(move |conn| {
                write_risk_fields(conn, id, &update)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn soft_delete_record(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE records SET deleted = 1, updated_at = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Keyword operations

    /// Adds a keyword, or re-enables it with the given kind if it exists.
    pub async fn upsert_keyword(&self, keyword: &str, kind: KeywordKind) -> Result<i64> {
        let keyword = keyword.trim().to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO keywords (keyword, kind) VALUES (?1, ?2)
                       ON CONFLICT(keyword) DO UPDATE SET
                           kind = excluded.kind,
                           enabled = 1,
                           updated_at = datetime('now')"#,
                    params![keyword, kind.as_str()],
                )?;
                let id = conn.query_row(
                    "SELECT id FROM keywords WHERE keyword = ?1",
                    params![keyword],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn set_keyword_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE keywords SET enabled = ?2, updated_at = datetime('now') WHERE id = ?1",
                    params![id, enabled],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list_enabled_keywords(&self, kind: KeywordKind) -> Result<Vec<KeywordEntry>> {
        let keywords = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, keyword, kind, enabled, created_at, updated_at
                       FROM keywords
                       WHERE enabled = 1 AND kind = ?1
                       ORDER BY id"#,
                )?;
                let keywords = stmt
                    .query_map(params![kind.as_str()], keyword_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keywords)
            })
            .await?;
        Ok(keywords)
    }
}

pub(super) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

pub(super) fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| parse_datetime(&s))
        .unwrap_or_else(Utc::now))
}

pub(super) fn write_risk_fields(
    conn: &rusqlite::Connection,
    id: i64,
    update: &RiskUpdate,
) -> rusqlite::Result<usize> {
    conn.execute(
        r#"UPDATE records
           SET risk_level = ?2, related = ?3, matched_keywords = ?4, remarks = ?5,
               updated_at = datetime('now')
           WHERE id = ?1"#,
        params![
            id,
            update.risk_level.as_str(),
            update.related,
            join_matched(&update.matched_keywords),
            update.remarks,
        ],
    )
}

/// Parses a text column, reporting unknown values as a conversion failure
/// instead of guessing a default.
pub(super) fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

pub(super) fn record_from_row(row: &Row) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        natural_key: row.get(1)?,
        source_name: row.get(2)?,
        country: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        summary: row.get(6)?,
        product: row.get(7)?,
        record_type: row.get(8)?,
        publish_date: row.get(9)?,
        matched_keywords: split_matched(row.get(10)?),
        risk_level: RiskLevel::from_db(row.get::<_, Option<String>>(11)?.as_deref()),
        related: row.get(12)?,
        remarks: row.get(13)?,
        deleted: row.get(14)?,
        created_at: timestamp(row, 15)?,
        updated_at: timestamp(row, 16)?,
    })
}

fn keyword_from_row(row: &Row) -> rusqlite::Result<KeywordEntry> {
    Ok(KeywordEntry {
        id: row.get(0)?,
        keyword: row.get(1)?,
        kind: KeywordKind::from_db(&row.get::<_, String>(2)?),
        enabled: row.get(3)?,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(key: &str, source: &str) -> NewRecord {
        NewRecord {
            natural_key: key.into(),
            source_name: source.into(),
            country: Some("美国".into()),
            title: Some(format!("title {key}")),
            content: None,
            summary: None,
            product: None,
            record_type: None,
            publish_date: None,
            risk_level: RiskLevel::Medium,
        }
    }

    #[tokio::test]
    async fn duplicate_natural_key_is_ignored() {
        let repo = Repository::open_in_memory().await.unwrap();
        assert!(!repo.record_exists("fcc", "a1").await.unwrap());

        let first = repo.insert_record(new_record("a1", "fcc")).await.unwrap();
        assert!(first.is_some());
        assert!(repo.record_exists("fcc", "a1").await.unwrap());

        let second = repo.insert_record(new_record("a1", "fcc")).await.unwrap();
        assert!(second.is_none());

        // Same key from another source is a different record.
        assert!(repo.insert_record(new_record("a1", "ce")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn risk_update_round_trips() {
        let repo = Repository::open_in_memory().await.unwrap();
        let id = repo.insert_record(new_record("a1", "fcc")).await.unwrap().unwrap();

        repo.update_risk_fields(
            id,
            RiskUpdate {
                risk_level: RiskLevel::High,
                related: Some(true),
                matched_keywords: Some(vec!["FCC".into(), "Part 15B".into()]),
                remarks: Some("checked".into()),
            },
        )
        .await
        .unwrap();

        let record = repo.get_record(id).await.unwrap().unwrap();
        assert_eq!(record.risk_level, RiskLevel::High);
        assert_eq!(record.related, Some(true));
        assert_eq!(record.matched_keywords_joined().as_deref(), Some("FCC,Part 15B"));
        assert_eq!(record.remarks.as_deref(), Some("checked"));
    }

    #[tokio::test]
    async fn matched_keyword_containing_comma_round_trips() {
        let repo = Repository::open_in_memory().await.unwrap();
        let id = repo.insert_record(new_record("a1", "fcc")).await.unwrap().unwrap();
        let keywords = vec!["Part 15, Subpart B".to_string()];

        let mut update = RiskUpdate::from_record(&repo.get_record(id).await.unwrap().unwrap());
        update.matched_keywords = Some(keywords.clone());
        repo.update_risk_fields(id, update).await.unwrap();

        let record = repo.get_record(id).await.unwrap().unwrap();
        assert_eq!(record.matched_keywords, Some(keywords));
    }

    #[tokio::test]
    async fn filters_skip_deleted_and_respect_limit() {
        let repo = Repository::open_in_memory().await.unwrap();
        for key in ["a", "b", "c"] {
            repo.insert_record(new_record(key, "fcc")).await.unwrap();
        }
        let deleted = repo.insert_record(new_record("d", "fcc")).await.unwrap().unwrap();
        repo.soft_delete_record(deleted).await.unwrap();

        assert_eq!(repo.records_by_risk_level(RiskLevel::Medium).await.unwrap().len(), 3);
        assert!(repo.records_by_risk_level(RiskLevel::High).await.unwrap().is_empty());

        let limited = repo
            .find_records(RecordFilter {
                source_name: Some("fcc".into()),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn only_enabled_keywords_of_kind_are_listed() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.upsert_keyword("FCC", KeywordKind::Normal).await.unwrap();
        let ce = repo.upsert_keyword("CE", KeywordKind::Normal).await.unwrap();
        repo.upsert_keyword("toy", KeywordKind::Blacklist).await.unwrap();
        repo.set_keyword_enabled(ce, false).await.unwrap();

        let normal = repo.list_enabled_keywords(KeywordKind::Normal).await.unwrap();
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].keyword, "FCC");

        // Upserting re-enables.
        assert_eq!(repo.upsert_keyword("CE", KeywordKind::Normal).await.unwrap(), ce);
        assert_eq!(repo.list_enabled_keywords(KeywordKind::Normal).await.unwrap().len(), 2);
    }
}
