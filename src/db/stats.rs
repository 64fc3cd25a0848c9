use chrono::NaiveDate;
use rusqlite::{params, Row, TransactionBehavior};

use crate::error::Result;
use crate::models::{DailyCountryRiskStats, RiskCounts};

use super::repository::{timestamp, Repository};

/// `(raw country, raw risk level)` of one non-deleted record.
pub type CountryRiskRow = (Option<String>, Option<String>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsWriteSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

const STATS_COLUMNS: &str = "id, stat_date, country, high_risk_count, medium_risk_count, \
     low_risk_count, no_risk_count, total_count, deleted, created_at, updated_at";

impl Repository {
    /// Reads every non-deleted record, lets `accumulate` bucket them, and
    /// upserts one row per bucket for `stat_date`. Runs as a single
    /// immediate transaction so concurrent recomputes of a date serialise.
    pub async fn recompute_daily_stats<F>(
        &self,
        stat_date: NaiveDate,
        accumulate: F,
    ) -> Result<StatsWriteSummary>
    where
        F: FnOnce(Vec<CountryRiskRow>) -> Vec<(String, RiskCounts)> + Send + 'static,
    {
        let date = stat_date.to_string();
        let summary = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let rows = {
                    let mut stmt =
                        tx.prepare("SELECT country, risk_level FROM records WHERE deleted = 0")?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<std::result::Result<Vec<CountryRiskRow>, _>>()?;
                    rows
                };

                let mut summary = StatsWriteSummary::default();
                for (country, counts) in accumulate(rows) {
                    summary.processed += 1;
                    match upsert_stats_row(&tx, &date, &country, &counts) {
                        Ok(true) => summary.created += 1,
                        Ok(false) => summary.updated += 1,
                        Err(e) => {
                            tracing::warn!("Failed to upsert stats for {} on {}: {}", country, date, e);
                            summary.failed += 1;
                        }
                    }
                }

                tx.commit()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    /// Rows for one date, highest high-risk count first.
    pub async fn stats_for_date(&self, stat_date: NaiveDate) -> Result<Vec<DailyCountryRiskStats>> {
        let date = stat_date.to_string();
        let stats = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {STATS_COLUMNS} FROM daily_country_risk_stats
                       WHERE stat_date = ?1 AND deleted = 0
                       ORDER BY high_risk_count DESC, country"#
                ))?;
                let stats = stmt
                    .query_map(params![date], stats_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }

    /// Rows with `start <= stat_date <= end`, ordered by date.
    pub async fn stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCountryRiskStats>> {
        self.query_stats_range(start, end, None).await
    }

    pub async fn country_stats_between(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCountryRiskStats>> {
        self.query_stats_range(start, end, Some(country.to_string())).await
    }

    async fn query_stats_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        country: Option<String>,
    ) -> Result<Vec<DailyCountryRiskStats>> {
        let (start, end) = (start.to_string(), end.to_string());
        let stats = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {STATS_COLUMNS} FROM daily_country_risk_stats
                       WHERE stat_date BETWEEN ?1 AND ?2
                         AND deleted = 0
                         AND (?3 IS NULL OR country = ?3)
                       ORDER BY stat_date, high_risk_count DESC, country"#
                ))?;
                let stats = stmt
                    .query_map(params![start, end, country], stats_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}

/// Returns `true` when a new row was created. An existing row keeps its
/// `updated_at` unless a count actually changed.
fn upsert_stats_row(
    tx: &rusqlite::Transaction<'_>,
    date: &str,
    country: &str,
    counts: &RiskCounts,
) -> rusqlite::Result<bool> {
    let existed: i64 = tx.query_row(
        "SELECT COUNT(*) FROM daily_country_risk_stats WHERE stat_date = ?1 AND country = ?2",
        params![date, country],
        |row| row.get(0),
    )?;

    tx.execute(
        r#"INSERT INTO daily_country_risk_stats
               (stat_date, country, high_risk_count, medium_risk_count, low_risk_count,
                no_risk_count, total_count)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(stat_date, country) DO UPDATE SET
               high_risk_count = excluded.high_risk_count,
               medium_risk_count = excluded.medium_risk_count,
               low_risk_count = excluded.low_risk_count,
               no_risk_count = excluded.no_risk_count,
               total_count = excluded.total_count,
               deleted = 0,
               updated_at = CASE
                   WHEN high_risk_count = excluded.high_risk_count
                    AND medium_risk_count = excluded.medium_risk_count
                    AND low_risk_count = excluded.low_risk_count
                    AND no_risk_count = excluded.no_risk_count
                    AND total_count = excluded.total_count
                    AND deleted = 0
                   THEN updated_at
                   ELSE datetime('now')
               END"#,
        params![
            date,
            country,
            counts.high as i64,
            counts.medium as i64,
            counts.low as i64,
            counts.none as i64,
            counts.total as i64,
        ],
    )?;

    Ok(existed == 0)
}

fn stats_from_row(row: &Row) -> rusqlite::Result<DailyCountryRiskStats> {
    let date: String = row.get(1)?;
    let stat_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DailyCountryRiskStats {
        id: row.get(0)?,
        stat_date,
        country: row.get(2)?,
        counts: RiskCounts {
            high: row.get::<_, i64>(3)? as u64,
            medium: row.get::<_, i64>(4)? as u64,
            low: row.get::<_, i64>(5)? as u64,
            none: row.get::<_, i64>(6)? as u64,
            total: row.get::<_, i64>(7)? as u64,
        },
        deleted: row.get(8)?,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
    })
}
