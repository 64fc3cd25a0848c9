use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::RiskCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetric {
    pub current: u64,
    pub previous: u64,
    pub change: i64,
    /// Percentage rounded to two decimals; zero when there is no baseline.
    pub change_percent: f64,
    pub direction: TrendDirection,
}

pub fn trend_metric(current: u64, previous: u64) -> TrendMetric {
    let change = current as i64 - previous as i64;
    let change_percent = if previous > 0 {
        round2(change as f64 / previous as f64 * 100.0)
    } else {
        0.0
    };
    let direction = match change {
        c if c > 0 => TrendDirection::Up,
        c if c < 0 => TrendDirection::Down,
        _ => TrendDirection::Stable,
    };

    TrendMetric {
        current,
        previous,
        change,
        change_percent,
        direction,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTrend {
    pub high: TrendMetric,
    pub medium: TrendMetric,
    pub low: TrendMetric,
    pub none: TrendMetric,
    pub total: TrendMetric,
}

pub fn snapshot_trend(current: &RiskCounts, previous: &RiskCounts) -> SnapshotTrend {
    SnapshotTrend {
        high: trend_metric(current.high, previous.high),
        medium: trend_metric(current.medium, previous.medium),
        low: trend_metric(current.low, previous.low),
        none: trend_metric(current.none, previous.none),
        total: trend_metric(current.total, previous.total),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryTrend {
    pub country: String,
    pub trend: SnapshotTrend,
}

/// Per-country trend over the union of both snapshots' countries. A
/// country missing on one side counts as zero there.
pub fn country_trends(
    current: &BTreeMap<String, RiskCounts>,
    previous: &BTreeMap<String, RiskCounts>,
) -> Vec<CountryTrend> {
    let empty = RiskCounts::default();
    let mut countries: Vec<&String> = current.keys().chain(previous.keys()).collect();
    countries.sort();
    countries.dedup();

    countries
        .into_iter()
        .map(|country| CountryTrend {
            country: country.clone(),
            trend: snapshot_trend(
                current.get(country).unwrap_or(&empty),
                previous.get(country).unwrap_or(&empty),
            ),
        })
        .collect()
}

/// Summary of a daily series, oldest value first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub total_change: i64,
    pub change_rate: f64,
    pub max: u64,
    pub min: u64,
    pub average: f64,
}

pub fn summarize_series(values: &[u64]) -> Option<SeriesSummary> {
    let (first, last) = (*values.first()?, *values.last()?);
    let total_change = last as i64 - first as i64;
    let change_rate = if first > 0 {
        round2(total_change as f64 / first as f64 * 100.0)
    } else {
        0.0
    };
    let sum: u64 = values.iter().sum();

    Some(SeriesSummary {
        total_change,
        change_rate,
        max: values.iter().copied().max().unwrap_or(0),
        min: values.iter().copied().min().unwrap_or(0),
        average: round2(sum as f64 / values.len() as f64),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_reports_change_and_direction() {
        let up = trend_metric(15, 12);
        assert_eq!(up.change, 3);
        assert_eq!(up.change_percent, 25.0);
        assert_eq!(up.direction, TrendDirection::Up);

        let down = trend_metric(2, 3);
        assert_eq!(down.change, -1);
        assert_eq!(down.change_percent, -33.33);
        assert_eq!(down.direction, TrendDirection::Down);

        assert_eq!(trend_metric(4, 4).direction, TrendDirection::Stable);
    }

    #[test]
    fn zero_baseline_has_zero_percent() {
        let metric = trend_metric(7, 0);
        assert_eq!(metric.change, 7);
        assert_eq!(metric.change_percent, 0.0);
        assert_eq!(metric.direction, TrendDirection::Up);
    }

    #[test]
    fn country_trends_cover_both_sides() {
        let mut current = BTreeMap::new();
        current.insert("美国".to_string(), RiskCounts { high: 3, total: 3, ..Default::default() });
        let mut previous = BTreeMap::new();
        previous.insert("欧盟".to_string(), RiskCounts { high: 2, total: 2, ..Default::default() });

        let trends = country_trends(&current, &previous);
        assert_eq!(trends.len(), 2);
        let eu = trends.iter().find(|t| t.country == "欧盟").unwrap();
        assert_eq!(eu.trend.high.change, -2);
        let us = trends.iter().find(|t| t.country == "美国").unwrap();
        assert_eq!(us.trend.high.direction, TrendDirection::Up);
    }

    #[test]
    fn series_summary() {
        assert!(summarize_series(&[]).is_none());
        let summary = summarize_series(&[4, 10, 2, 6]).unwrap();
        assert_eq!(summary.total_change, 2);
        assert_eq!(summary.change_rate, 50.0);
        assert_eq!(summary.max, 10);
        assert_eq!(summary.min, 2);
        assert_eq!(summary.average, 5.5);
    }
}
