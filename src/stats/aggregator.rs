use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use super::trend::{country_trends, snapshot_trend, summarize_series, CountryTrend, SeriesSummary, SnapshotTrend};
use crate::db::{CountryRiskRow, Repository};
use crate::error::Result;
use crate::models::{
    DailyCountryRiskStats, RiskCounts, RiskLevel, OTHER_COUNTRY, PREDEFINED_COUNTRIES,
    UNKNOWN_COUNTRY,
};

/// Maps a raw country string onto a predefined label.
pub fn normalize_country(raw: Option<&str>) -> &str {
    match raw.map(str::trim) {
        None | Some("") => UNKNOWN_COUNTRY,
        Some(country) => PREDEFINED_COUNTRIES
            .iter()
            .copied()
            .find(|label| *label == country)
            .unwrap_or(OTHER_COUNTRY),
    }
}

/// Buckets records per predefined country, in predefined order. Every
/// predefined country is present even when all its counts are zero.
pub fn accumulate(rows: Vec<CountryRiskRow>) -> Vec<(String, RiskCounts)> {
    let mut buckets: Vec<(String, RiskCounts)> = PREDEFINED_COUNTRIES
        .iter()
        .map(|c| (c.to_string(), RiskCounts::default()))
        .collect();

    for (country, risk_level) in rows {
        let label = normalize_country(country.as_deref());
        let level = RiskLevel::from_db(risk_level.as_deref());
        if let Some((_, counts)) = buckets.iter_mut().find(|(c, _)| c == label) {
            counts.record(level);
        }
    }
    buckets
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationOutcome {
    pub success: bool,
    pub message: String,
    pub stat_date: NaiveDate,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayOverDay {
    pub stat_date: NaiveDate,
    pub previous_date: NaiveDate,
    pub overall: SnapshotTrend,
    pub countries: Vec<CountryTrend>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountrySeries {
    pub country: String,
    pub points: Vec<(NaiveDate, RiskCounts)>,
    pub high_risk_summary: Option<SeriesSummary>,
}

/// Recomputes and reads daily per-country risk statistics.
pub struct CountryRiskAggregator {
    repo: Repository,
}

impl CountryRiskAggregator {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Full recompute for `stat_date` from the current record set.
    pub async fn recompute(&self, stat_date: NaiveDate) -> Result<AggregationOutcome> {
        tracing::info!("Recomputing country risk stats for {}", stat_date);
        let summary = self.repo.recompute_daily_stats(stat_date, accumulate).await?;

        let outcome = AggregationOutcome {
            success: summary.failed == 0,
            message: format!(
                "{} countries: {} created, {} updated, {} failed",
                summary.processed, summary.created, summary.updated, summary.failed
            ),
            stat_date,
            processed: summary.processed,
            created: summary.created,
            updated: summary.updated,
            failed: summary.failed,
        };
        tracing::info!("Country risk stats for {}: {}", stat_date, outcome.message);
        Ok(outcome)
    }

    /// Recomputes each of the `days` dates ending at `end`, oldest first.
    /// A failing date is logged and the rest still run.
    pub async fn backfill(&self, end: NaiveDate, days: u64) -> Vec<AggregationOutcome> {
        let mut outcomes = Vec::new();
        for offset in (0..days).rev() {
            let Some(date) = end.checked_sub_days(Days::new(offset)) else {
                continue;
            };
            match self.recompute(date).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!("Failed to recompute stats for {}: {}", date, e),
            }
        }
        outcomes
    }

    pub async fn stats_for_date(&self, stat_date: NaiveDate) -> Result<Vec<DailyCountryRiskStats>> {
        self.repo.stats_for_date(stat_date).await
    }

    pub async fn stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCountryRiskStats>> {
        self.repo.stats_between(start, end).await
    }

    /// Trend of `stat_date` against the previous day, overall and per country.
    pub async fn day_over_day(&self, stat_date: NaiveDate) -> Result<DayOverDay> {
        let previous_date = stat_date.pred_opt().unwrap_or(stat_date);
        let current = by_country(self.repo.stats_for_date(stat_date).await?);
        let previous = by_country(self.repo.stats_for_date(previous_date).await?);

        Ok(DayOverDay {
            stat_date,
            previous_date,
            overall: snapshot_trend(&sum_counts(&current), &sum_counts(&previous)),
            countries: country_trends(&current, &previous),
        })
    }

    pub async fn country_series(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CountrySeries> {
        let points: Vec<(NaiveDate, RiskCounts)> = self
            .repo
            .country_stats_between(country, start, end)
            .await?
            .into_iter()
            .map(|row| (row.stat_date, row.counts))
            .collect();
        let highs: Vec<u64> = points.iter().map(|(_, c)| c.high).collect();

        Ok(CountrySeries {
            country: country.to_string(),
            high_risk_summary: summarize_series(&highs),
            points,
        })
    }
}

fn by_country(rows: Vec<DailyCountryRiskStats>) -> BTreeMap<String, RiskCounts> {
    rows.into_iter().map(|row| (row.country, row.counts)).collect()
}

fn sum_counts(map: &BTreeMap<String, RiskCounts>) -> RiskCounts {
    let mut total = RiskCounts::default();
    for counts in map.values() {
        total.add(counts);
    }
    total
}
