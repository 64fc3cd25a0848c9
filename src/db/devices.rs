use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{DeviceDetail, DeviceFields, DeviceKind, DeviceMeta, DeviceRecord, RiskLevel};

use super::repository::Repository;

const DEVICE_COLUMNS: &str =
    "id, kind, natural_key, risk_level, keywords, jd_country, data_source, remark, payload";

/// Keyword column and country of one HIGH-risk device record.
#[derive(Debug, Clone)]
pub struct HighRiskKeywordRow {
    pub kind: DeviceKind,
    pub keywords: Option<String>,
    pub jd_country: Option<String>,
}

impl Repository {
    pub async fn device_record_exists(&self, kind: DeviceKind, natural_key: &str) -> Result<bool> {
        let natural_key = natural_key.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM device_records WHERE kind = ?1 AND natural_key = ?2",
                    params![kind.as_str(), natural_key],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    /// Returns `None` when `(kind, natural_key)` is already stored.
    pub async fn insert_device_record(&self, record: &DeviceRecord) -> Result<Option<i64>> {
        let payload = record.detail.to_json()?;
        let kind = record.detail.kind();
        let meta = record.meta.clone();
        let id = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT OR IGNORE INTO device_records
                           (kind, natural_key, risk_level, keywords, jd_country, data_source, remark, payload)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        kind.as_str(),
                        meta.natural_key,
                        meta.risk_level.as_str(),
                        meta.keywords,
                        meta.jd_country,
                        meta.data_source,
                        meta.remark,
                        payload,
                    ],
                )?;
                Ok((inserted > 0).then(|| conn.last_insert_rowid()))
            })
            .await?;
        Ok(id)
    }

    pub async fn get_device_record(&self, kind: DeviceKind, id: i64) -> Result<Option<DeviceRecord>> {
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {DEVICE_COLUMNS} FROM device_records WHERE kind = ?1 AND id = ?2"),
                        params![kind.as_str(), id],
                        raw_device_from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(|raw| raw.into_record(kind)).transpose()
    }

    /// Updates the risk level of every listed id of `kind` in one
    /// transaction. Returns the number of rows changed.
    pub async fn update_device_risk_levels(
        &self,
        kind: DeviceKind,
        ids: Vec<i64>,
        level: RiskLevel,
    ) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut changed = 0;
                {
                    let mut stmt = tx.prepare(
                        r#"UPDATE device_records SET risk_level = ?3, updated_at = datetime('now')
                           WHERE kind = ?1 AND id = ?2"#,
                    )?;
                    for id in ids {
                        changed += stmt.execute(params![kind.as_str(), id, level.as_str()])?;
                    }
                }
                tx.commit()?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn update_device_keywords(
        &self,
        kind: DeviceKind,
        id: i64,
        keywords: Option<String>,
    ) -> Result<bool> {
        self.update_device_column(kind, id, "keywords", keywords).await
    }

    pub async fn update_device_remark(
        &self,
        kind: DeviceKind,
        id: i64,
        remark: Option<String>,
    ) -> Result<bool> {
        self.update_device_column(kind, id, "remark", remark).await
    }

    async fn update_device_column(
        &self,
        kind: DeviceKind,
        id: i64,
        column: &'static str,
        value: Option<String>,
    ) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    &format!(
                        "UPDATE device_records SET {column} = ?3, updated_at = datetime('now') WHERE kind = ?1 AND id = ?2"
                    ),
                    params![kind.as_str(), id, value],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(changed)
    }

    pub async fn high_risk_device_keywords(&self) -> Result<Vec<HighRiskKeywordRow>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT kind, keywords, jd_country FROM device_records WHERE risk_level = 'HIGH'",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, keywords, jd_country)| {
                let kind = kind.parse().ok()?;
                Some(HighRiskKeywordRow {
                    kind,
                    keywords,
                    jd_country,
                })
            })
            .collect())
    }

    /// Number of records at `level` for each kind, zero counts included.
    pub async fn device_counts_by_kind(&self, level: RiskLevel) -> Result<Vec<(DeviceKind, u64)>> {
        let counts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT kind, COUNT(*) FROM device_records WHERE risk_level = ?1 GROUP BY kind",
                )?;
                let counts = stmt
                    .query_map(params![level.as_str()], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(counts)
            })
            .await?;

        Ok(DeviceKind::ALL
            .iter()
            .map(|kind| {
                let count = counts
                    .iter()
                    .find(|(name, _)| name == kind.as_str())
                    .map(|(_, c)| *c as u64)
                    .unwrap_or(0);
                (*kind, count)
            })
            .collect())
    }
}

struct RawDeviceRow {
    meta: DeviceMeta,
    payload: String,
}

impl RawDeviceRow {
    fn into_record(self, kind: DeviceKind) -> Result<DeviceRecord> {
        Ok(DeviceRecord {
            meta: self.meta,
            detail: DeviceDetail::from_json(kind, &self.payload)?,
        })
    }
}

fn raw_device_from_row(row: &Row) -> rusqlite::Result<RawDeviceRow> {
    Ok(RawDeviceRow {
        meta: DeviceMeta {
            id: row.get(0)?,
            natural_key: row.get(2)?,
            risk_level: RiskLevel::from_db(row.get::<_, Option<String>>(3)?.as_deref()),
            keywords: row.get(4)?,
            jd_country: row.get(5)?,
            data_source: row.get(6)?,
            remark: row.get(7)?,
        },
        payload: row.get(8)?,
    })
}
