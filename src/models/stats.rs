use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::RiskLevel;

pub const UNKNOWN_COUNTRY: &str = "未确定";
pub const OTHER_COUNTRY: &str = "其它国家";

/// Fixed labels every daily aggregation produces a row for.
pub const PREDEFINED_COUNTRIES: [&str; 19] = [
    "美国",
    "欧盟",
    "中国",
    "韩国",
    "日本",
    "阿联酋",
    "印度",
    "泰国",
    "新加坡",
    "台湾",
    "澳大利亚",
    "智利",
    "马来西亚",
    "秘鲁",
    "南非",
    "以色列",
    "印尼",
    OTHER_COUNTRY,
    UNKNOWN_COUNTRY,
];

/// Per-bucket record counts for one country (or overall).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub none: u64,
    pub total: u64,
}

impl RiskCounts {
    pub fn record(&mut self, level: RiskLevel) {
        self.total += 1;
        match level {
            RiskLevel::High => self.high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Low => self.low += 1,
            RiskLevel::None => self.none += 1,
        }
    }

    pub fn add(&mut self, other: &RiskCounts) {
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
        self.none += other.none;
        self.total += other.total;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCountryRiskStats {
    pub id: i64,
    pub stat_date: NaiveDate,
    pub country: String,
    pub counts: RiskCounts,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
