mod aggregator;
mod trend;

pub use aggregator::{
    accumulate, normalize_country, AggregationOutcome, CountryRiskAggregator, CountrySeries,
    DayOverDay,
};
pub use trend::{
    country_trends, snapshot_trend, summarize_series, trend_metric, CountryTrend, SeriesSummary,
    SnapshotTrend, TrendDirection, TrendMetric,
};
