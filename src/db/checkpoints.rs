use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{CheckpointStatus, CrawlCheckpoint, CrawlTask};

use super::repository::{parse_column, timestamp, Repository};

const CHECKPOINT_COLUMNS: &str = "id, checkpoint_key, crawler_type, search_term, date_from, date_to, \
     current_skip, total_fetched, target_total, batch_size, status, error_message, \
     last_updated, created_at";

impl Repository {
    /// Returns the checkpoint for `task`, creating it on first use. Lookup
    /// and insert happen in one call, so a task never gets two rows.
    pub async fn find_or_create_checkpoint(&self, task: &CrawlTask) -> Result<CrawlCheckpoint> {
        let key = task.key();
        let task = task.clone();
        let checkpoint = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT OR IGNORE INTO crawl_checkpoints
                           (checkpoint_key, crawler_type, search_term, date_from, date_to,
                            target_total, batch_size)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        key,
                        task.crawler_type,
                        task.search_term,
                        task.date_from,
                        task.date_to,
                        task.target_total.map(|t| t as i64),
                        task.batch_size as i64,
                    ],
                )?;
                let checkpoint = conn.query_row(
                    &format!("SELECT {CHECKPOINT_COLUMNS} FROM crawl_checkpoints WHERE checkpoint_key = ?1"),
                    params![key],
                    checkpoint_from_row,
                )?;
                Ok(checkpoint)
            })
            .await?;
        Ok(checkpoint)
    }

    pub async fn find_checkpoint(&self, key: &str) -> Result<Option<CrawlCheckpoint>> {
        let key = key.to_string();
        let checkpoint = self
            .conn
            .call(move |conn| {
                let checkpoint = conn
                    .query_row(
                        &format!("SELECT {CHECKPOINT_COLUMNS} FROM crawl_checkpoints WHERE checkpoint_key = ?1"),
                        params![key],
                        checkpoint_from_row,
                    )
                    .optional()?;
                Ok(checkpoint)
            })
            .await?;
        Ok(checkpoint)
    }

    pub async fn save_checkpoint(&self, checkpoint: &CrawlCheckpoint) -> Result<()> {
        let cp = checkpoint.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE crawl_checkpoints
                       SET current_skip = ?2, total_fetched = ?3, target_total = ?4,
                           batch_size = ?5, status = ?6, error_message = ?7, last_updated = ?8
                       WHERE checkpoint_key = ?1"#,
                    params![
                        cp.key,
                        cp.current_skip as i64,
                        cp.total_fetched as i64,
                        cp.target_total.map(|t| t as i64),
                        cp.batch_size as i64,
                        cp.status.as_str(),
                        cp.error_message,
                        cp.last_updated.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recently touched first.
    pub async fn checkpoints_by_crawler(&self, crawler_type: &str) -> Result<Vec<CrawlCheckpoint>> {
        self.list_checkpoints("crawler_type = ?1", crawler_type.to_string())
            .await
    }

    pub async fn checkpoints_by_status(&self, status: CheckpointStatus) -> Result<Vec<CrawlCheckpoint>> {
        self.list_checkpoints("status = ?1", status.as_str().to_string())
            .await
    }

    pub async fn delete_checkpoints_by_crawler(&self, crawler_type: &str) -> Result<usize> {
        let crawler_type = crawler_type.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM crawl_checkpoints WHERE crawler_type = ?1",
                    params![crawler_type],
                )?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    async fn list_checkpoints(
        &self,
        condition: &'static str,
        value: String,
    ) -> Result<Vec<CrawlCheckpoint>> {
        let checkpoints = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CHECKPOINT_COLUMNS} FROM crawl_checkpoints WHERE {condition} ORDER BY last_updated DESC, id DESC"
                ))?;
                let checkpoints = stmt
                    .query_map(params![value], checkpoint_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(checkpoints)
            })
            .await?;
        Ok(checkpoints)
    }
}

fn checkpoint_from_row(row: &Row) -> rusqlite::Result<CrawlCheckpoint> {
    let status: String = row.get(10)?;
    Ok(CrawlCheckpoint {
        id: row.get(0)?,
        key: row.get(1)?,
        crawler_type: row.get(2)?,
        search_term: row.get(3)?,
        date_from: row.get(4)?,
        date_to: row.get(5)?,
        current_skip: row.get::<_, i64>(6)? as u64,
        total_fetched: row.get::<_, i64>(7)? as u64,
        target_total: row.get::<_, Option<i64>>(8)?.map(|t| t as u64),
        batch_size: row.get::<_, i64>(9)? as u64,
        status: parse_column(10, &status)?,
        error_message: row.get(11)?,
        last_updated: timestamp(row, 12)?,
        created_at: timestamp(row, 13)?,
    })
}
