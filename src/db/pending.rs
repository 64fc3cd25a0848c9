use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{NewPendingJudgment, PendingJudgment, ReviewStatus, RiskLevel, RiskUpdate};

use super::repository::{parse_column, parse_datetime, timestamp, write_risk_fields, Repository};

const PENDING_COLUMNS: &str = "id, record_id, judgment, suggested_risk_level, suggested_remark, status, \
     created_at, expires_at, decided_at, decided_by";

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Repository {
    /// Queues judgments in one transaction. A record that already has a
    /// PENDING judgment is skipped. Returns the number queued.
    pub async fn queue_pending_judgments(&self, items: Vec<NewPendingJudgment>) -> Result<usize> {
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            rows.push((
                item.record_id,
                serde_json::to_string(&item.judgment)?,
                item.suggested_risk_level,
                item.suggested_remark,
                stamp(item.created_at),
                stamp(item.expires_at),
            ));
        }

        let queued = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut queued = 0;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO pending_judgments
                               (record_id, judgment, suggested_risk_level, suggested_remark,
                                status, created_at, expires_at)
                           SELECT ?1, ?2, ?3, ?4, 'PENDING', ?5, ?6
                           WHERE NOT EXISTS (
                               SELECT 1 FROM pending_judgments
                               WHERE record_id = ?1 AND status = 'PENDING'
                           )"#,
                    )?;
                    for (record_id, judgment, level, remark, created_at, expires_at) in rows {
                        queued += stmt.execute(params![
                            record_id,
                            judgment,
                            level.as_str(),
                            remark,
                            created_at,
                            expires_at
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(queued)
            })
            .await?;
        Ok(queued)
    }

    pub async fn get_pending_judgment(&self, id: i64) -> Result<Option<PendingJudgment>> {
        let item = self
            .conn
            .call(move |conn| {
                let item = conn
                    .query_row(
                        &format!("SELECT {PENDING_COLUMNS} FROM pending_judgments WHERE id = ?1"),
                        params![id],
                        pending_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }

    /// Newest first.
    pub async fn pending_judgments(
        &self,
        status: ReviewStatus,
        limit: Option<usize>,
    ) -> Result<Vec<PendingJudgment>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PENDING_COLUMNS} FROM pending_judgments WHERE status = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                ))?;
                let items = stmt
                    .query_map(params![status.as_str(), limit], pending_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn count_pending_judgments(&self, status: ReviewStatus) -> Result<u64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM pending_judgments WHERE status = ?1",
                    params![status.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await?;
        Ok(count)
    }

    /// Stores a decision taken on a PENDING item, applying `record_update`
    /// to its record in the same transaction. Returns `false` and writes
    /// nothing when the row was no longer PENDING.
    pub async fn decide_pending_judgment(
        &self,
        item: &PendingJudgment,
        record_update: Option<RiskUpdate>,
    ) -> Result<bool> {
        let id = item.id;
        let record_id = item.record_id;
        let status = item.status;
        let decided_at = item.decided_at.map(stamp);
        let decided_by = item.decided_by.clone();

        let decided = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    r#"UPDATE pending_judgments
                       SET status = ?2, decided_at = ?3, decided_by = ?4
                       WHERE id = ?1 AND status = 'PENDING'"#,
                    params![id, status.as_str(), decided_at, decided_by],
                )?;
                if changed == 0 {
                    return Ok(false);
                }
                if let Some(update) = record_update {
                    write_risk_fields(&tx, record_id, &update)?;
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(decided)
    }

    /// Marks every PENDING item whose expiry is before `now` as EXPIRED.
    pub async fn expire_pending_judgments(&self, now: DateTime<Utc>) -> Result<usize> {
        let now = stamp(now);
        let expired = self
            .conn
            .call(move |conn| {
                let expired = conn.execute(
                    r#"UPDATE pending_judgments
                       SET status = 'EXPIRED', decided_at = ?1, decided_by = 'SYSTEM'
                       WHERE status = 'PENDING' AND expires_at < ?1"#,
                    params![now],
                )?;
                Ok(expired)
            })
            .await?;
        Ok(expired)
    }
}

fn pending_from_row(row: &Row) -> rusqlite::Result<PendingJudgment> {
    let judgment: String = row.get(2)?;
    let status: String = row.get(5)?;
    Ok(PendingJudgment {
        id: row.get(0)?,
        record_id: row.get(1)?,
        judgment: serde_json::from_str(&judgment)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        suggested_risk_level: RiskLevel::from_db(row.get::<_, Option<String>>(3)?.as_deref()),
        suggested_remark: row.get(4)?,
        status: parse_column(5, &status)?,
        created_at: timestamp(row, 6)?,
        expires_at: timestamp(row, 7)?,
        decided_at: row
            .get::<_, Option<String>>(8)?
            .and_then(|s| parse_datetime(&s)),
        decided_by: row.get(9)?,
    })
}
